//! Session storage trait and request types.

use thiserror::Error;

use crate::command::VideoSource;

use super::types::{SessionStatus, StreamSession, TransitionOutcome, TransitionUpdate};

/// Error type for session storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Session not found.
    #[error("session not found: {0}")]
    NotFound(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

/// Request to persist a new session.
///
/// Sessions are always inserted in `starting`; everything after that goes
/// through [`SessionStore::transition`].
#[derive(Debug, Clone)]
pub struct NewSession {
    /// Owning user.
    pub user_id: String,
    /// RTMP destination URL.
    pub rtmp_url: String,
    /// Video source descriptor.
    pub source: VideoSource,
}

/// Filter for querying sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    /// Filter by owning user.
    pub user_id: Option<String>,
    /// Filter by status.
    pub status: Option<SessionStatus>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl SessionFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            user_id: None,
            status: None,
            limit: 100,
            offset: 0,
        }
    }

    /// Filter by owning user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Filter by status.
    pub fn with_status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for session storage backends.
///
/// `transition` is the only mutation path after insert: it applies its
/// update atomically, guarded on the session's current status. Every
/// state-machine guarantee (terminal states never change, quota released
/// exactly once, stop and sweep racing safely) rests on that compare-and-set
/// being atomic per record.
pub trait SessionStore: Send + Sync {
    /// Persist a new session in `starting`.
    fn insert(&self, request: NewSession) -> Result<StreamSession, StoreError>;

    /// Get a session by id.
    fn get(&self, id: &str) -> Result<Option<StreamSession>, StoreError>;

    /// List sessions matching the filter, newest first.
    fn list(&self, filter: &SessionFilter) -> Result<Vec<StreamSession>, StoreError>;

    /// Count sessions matching the filter.
    fn count(&self, filter: &SessionFilter) -> Result<i64, StoreError>;

    /// Atomically apply `update` iff the session's current status is in
    /// `from`. Returns `Superseded` (with the current status) when the
    /// guard fails, `NotFound` error when the id is unknown.
    fn transition(
        &self,
        id: &str,
        from: &[SessionStatus],
        update: TransitionUpdate,
    ) -> Result<TransitionOutcome, StoreError>;

    /// Persisted per-user stream ceiling, if one has been set.
    fn get_user_quota(&self, user_id: &str) -> Result<Option<u32>, StoreError>;

    /// Persist a per-user stream ceiling.
    fn set_user_quota(&self, user_id: &str, allowed: u32) -> Result<(), StoreError>;

    /// All persisted ceilings, for seeding the ledger at startup.
    fn list_user_quotas(&self) -> Result<Vec<(String, u32)>, StoreError>;
}
