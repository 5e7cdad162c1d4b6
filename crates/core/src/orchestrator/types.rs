//! Types for the session orchestrator.

use serde::Serialize;
use thiserror::Error;

use crate::command::{CommandError, ResolveError};
use crate::runtime::{RuntimeError, UnitStatus};
use crate::session::{SessionStatus, StoreError, StreamSession};

/// Errors surfaced by orchestrator operations.
///
/// The first three variants are user-facing rejections, not system faults;
/// the HTTP layer maps each variant onto its own status code so the front
/// end can render a specific message.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The user is at their concurrent-stream ceiling. Expected rejection,
    /// no retry.
    #[error("concurrent stream limit reached")]
    QuotaExceeded,

    /// Request rejected before any resource was reserved or launched.
    #[error("invalid request: {0}")]
    Validation(#[from] CommandError),

    /// A web-page source could not be resolved to a media URL.
    #[error("{0}")]
    SourceResolution(#[from] ResolveError),

    /// The execution backend failed to create the unit.
    #[error("launch failed: {0}")]
    Launch(#[from] RuntimeError),

    /// The execution backend failed to answer a query.
    #[error("runtime error: {0}")]
    Runtime(RuntimeError),

    /// Session not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Operation requested against a session in an incompatible state.
    #[error("cannot {operation} session {session_id}: current state is {current}")]
    InvalidState {
        session_id: String,
        current: SessionStatus,
        operation: String,
    },

    /// Session store error.
    #[error("session store error: {0}")]
    Store(#[from] StoreError),
}

/// Read-only cross-reference of persisted status and live unit state.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// The persisted session record.
    pub session: StreamSession,
    /// Live execution backend status, when a unit id is recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_status: Option<UnitStatus>,
    /// Whether persisted and observed state agree on "running".
    pub healthy: bool,
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestratorStatus {
    /// Whether the sweeper loop is running.
    pub sweeper_running: bool,
    /// Sessions currently in `starting`.
    pub starting_count: usize,
    /// Sessions currently in `running`.
    pub running_count: usize,
    /// Sessions currently in `stopping`.
    pub stopping_count: usize,
}
