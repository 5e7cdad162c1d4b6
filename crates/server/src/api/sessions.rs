//! Session API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use streamax_core::{
    OrchestratorError, SessionFilter, SessionStatus, StatusReport, StreamSession, VideoSource,
};

use crate::state::AppState;

/// Maximum allowed limit for session queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for session queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a session
#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    /// Owning user id
    pub user_id: String,
    /// RTMP destination URL
    pub rtmp_url: String,
    /// Video source descriptor
    pub source: VideoSource,
}

/// Query parameters for listing sessions
#[derive(Debug, Deserialize)]
pub struct ListSessionsParams {
    /// Filter by owning user
    pub user_id: Option<String>,
    /// Filter by status
    pub status: Option<String>,
    /// Maximum number of sessions to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Response for session operations
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub user_id: String,
    pub rtmp_url: String,
    pub source: VideoSource,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<String>,
}

impl From<StreamSession> for SessionResponse {
    fn from(session: StreamSession) -> Self {
        Self {
            id: session.id,
            user_id: session.user_id,
            rtmp_url: session.rtmp_url,
            source: session.source,
            status: session.status,
            unit_id: session.unit_id,
            error: session.error,
            created_at: session.created_at.to_rfc3339(),
            started_at: session.started_at.map(|t| t.to_rfc3339()),
            stopped_at: session.stopped_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Response for the status query: persisted record plus live unit state
#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session: SessionResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_status: Option<&'static str>,
    pub healthy: bool,
}

impl From<StatusReport> for SessionStatusResponse {
    fn from(report: StatusReport) -> Self {
        Self {
            session: SessionResponse::from(report.session),
            unit_status: report.unit_status.map(|s| s.as_str()),
            healthy: report.healthy,
        }
    }
}

/// Response for listing sessions
#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Response for a stop request
#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub stopped: bool,
}

/// Error response with a reason code the front end can render specifically
#[derive(Debug, Serialize)]
pub struct SessionErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// Map orchestrator errors onto status codes and reason codes.
///
/// Quota and validation rejections are user-facing outcomes, not faults;
/// only store errors are reported as internal.
pub fn error_response(err: OrchestratorError) -> (StatusCode, Json<SessionErrorResponse>) {
    let (status, code) = match &err {
        OrchestratorError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
        OrchestratorError::QuotaExceeded => (StatusCode::TOO_MANY_REQUESTS, "quota_exceeded"),
        OrchestratorError::SourceResolution(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "source_resolution_failed")
        }
        OrchestratorError::Launch(_) => (StatusCode::BAD_GATEWAY, "launch_failed"),
        OrchestratorError::Runtime(_) => (StatusCode::BAD_GATEWAY, "runtime_error"),
        OrchestratorError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        OrchestratorError::InvalidState { .. } => (StatusCode::CONFLICT, "invalid_state"),
        OrchestratorError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };

    (
        status,
        Json(SessionErrorResponse {
            error: err.to_string(),
            code,
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new session
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSessionBody>,
) -> Result<(StatusCode, Json<SessionResponse>), impl IntoResponse> {
    match state
        .orchestrator()
        .create_session(&body.user_id, body.source, &body.rtmp_url)
        .await
    {
        Ok(session) => Ok((StatusCode::CREATED, Json(SessionResponse::from(session)))),
        Err(e) => Err(error_response(e)),
    }
}

/// Stop a session (idempotent)
pub async fn stop_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StopSessionResponse>, impl IntoResponse> {
    match state.orchestrator().stop_session(&id).await {
        Ok(()) => Ok(Json(StopSessionResponse { stopped: true })),
        Err(e) => Err(error_response(e)),
    }
}

/// Get a session with its live unit status
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatusResponse>, impl IntoResponse> {
    match state.orchestrator().session_status(&id).await {
        Ok(report) => Ok(Json(SessionStatusResponse::from(report))),
        Err(e) => Err(error_response(e)),
    }
}

/// List sessions
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListSessionsParams>,
) -> Result<Json<ListSessionsResponse>, (StatusCode, Json<SessionErrorResponse>)> {
    let mut filter = SessionFilter::new()
        .with_limit(params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT))
        .with_offset(params.offset.unwrap_or(0).max(0));

    if let Some(user_id) = params.user_id {
        filter = filter.with_user(user_id);
    }

    if let Some(ref status) = params.status {
        match SessionStatus::parse(status) {
            Some(status) => filter = filter.with_status(status),
            None => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(SessionErrorResponse {
                        error: format!("unknown status: {}", status),
                        code: "validation",
                    }),
                ));
            }
        }
    }

    let sessions = state
        .store()
        .list(&filter)
        .map_err(|e| error_response(e.into()))?;
    let total = state
        .store()
        .count(&filter)
        .map_err(|e| error_response(e.into()))?;

    Ok(Json(ListSessionsResponse {
        sessions: sessions.into_iter().map(SessionResponse::from).collect(),
        total,
        limit: filter.limit,
        offset: filter.offset,
    }))
}
