//! Per-user quota API handlers.
//!
//! The PUT endpoint is the hook the package-activation workflow drives:
//! activating a subscription tier persists the new ceiling and updates the
//! live ledger in one call.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

/// Request body for setting a user's stream ceiling
#[derive(Debug, Deserialize)]
pub struct SetQuotaBody {
    pub allowed: u32,
}

/// Response for quota queries
#[derive(Debug, Serialize)]
pub struct QuotaResponse {
    pub user_id: String,
    pub allowed: u32,
    pub active: u32,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct QuotaErrorResponse {
    pub error: String,
}

/// Get a user's quota usage
pub async fn get_quota(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<QuotaResponse> {
    let usage = state.quota().usage(&user_id);
    Json(QuotaResponse {
        user_id,
        allowed: usage.allowed,
        active: usage.active,
    })
}

/// Set a user's stream ceiling (persisted + live)
pub async fn set_quota(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<SetQuotaBody>,
) -> Result<Json<QuotaResponse>, (StatusCode, Json<QuotaErrorResponse>)> {
    if let Err(e) = state.store().set_user_quota(&user_id, body.allowed) {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(QuotaErrorResponse {
                error: e.to_string(),
            }),
        ));
    }

    state.quota().set_allowed(&user_id, body.allowed);

    let usage = state.quota().usage(&user_id);
    Ok(Json(QuotaResponse {
        user_id,
        allowed: usage.allowed,
        active: usage.active,
    }))
}
