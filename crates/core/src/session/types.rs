//! Core session data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::VideoSource;

/// Current status of a stream session.
///
/// State machine flow:
/// ```text
/// starting -> running -> stopping -> stopped
///     |          |           |
///     +----------+-----------+--> error
/// ```
/// `stopped` and `error` are terminal; a terminal session never changes
/// status again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepted and quota-reserved; launch in flight.
    Starting,
    /// Execution unit confirmed running.
    Running,
    /// Stop requested; teardown in flight.
    Stopping,
    /// Cleanly stopped (terminal).
    Stopped,
    /// Launch failed or the unit died (terminal).
    Error,
}

impl SessionStatus {
    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Stopped | SessionStatus::Error)
    }

    /// Returns true while the session holds a quota reservation.
    pub fn counts_against_quota(&self) -> bool {
        matches!(
            self,
            SessionStatus::Starting | SessionStatus::Running | SessionStatus::Stopping
        )
    }

    /// String form used in the database and API filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Starting => "starting",
            SessionStatus::Running => "running",
            SessionStatus::Stopping => "stopping",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Error => "error",
        }
    }

    /// Parse the database/API string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "starting" => Some(SessionStatus::Starting),
            "running" => Some(SessionStatus::Running),
            "stopping" => Some(SessionStatus::Stopping),
            "stopped" => Some(SessionStatus::Stopped),
            "error" => Some(SessionStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user's continuous video-to-RTMP streaming request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamSession {
    /// Unique identifier (UUID).
    pub id: String,

    /// Owning user (immutable).
    pub user_id: String,

    /// RTMP destination (immutable).
    pub rtmp_url: String,

    /// Video source descriptor (immutable once accepted).
    pub source: VideoSource,

    /// Execution unit id, set once the unit is created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,

    /// Execution unit name under the orchestrator's naming convention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_name: Option<String>,

    /// Current status.
    pub status: SessionStatus,

    /// Failure reason, recorded on the transition into `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Set on the transition into `running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Set on the transition into a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,
}

/// Fields applied together with a status change.
///
/// Unset fields keep their stored value, so a transition never clobbers
/// data written by an earlier one.
#[derive(Debug, Clone, Default)]
pub struct TransitionUpdate {
    pub to: Option<SessionStatus>,
    pub unit_id: Option<String>,
    pub unit_name: Option<String>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl TransitionUpdate {
    /// Start building a transition into `status`.
    pub fn to(status: SessionStatus) -> Self {
        Self {
            to: Some(status),
            ..Default::default()
        }
    }

    /// Record the launched unit's id and name.
    pub fn with_unit(mut self, unit_id: impl Into<String>, unit_name: impl Into<String>) -> Self {
        self.unit_id = Some(unit_id.into());
        self.unit_name = Some(unit_name.into());
        self
    }

    /// Record a failure reason.
    pub fn with_error(mut self, reason: impl Into<String>) -> Self {
        self.error = Some(reason.into());
        self
    }

    /// Stamp started_at.
    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    /// Stamp stopped_at.
    pub fn with_stopped_at(mut self, at: DateTime<Utc>) -> Self {
        self.stopped_at = Some(at);
        self
    }

    /// Target status, panicking if the update was built without one.
    pub fn target(&self) -> SessionStatus {
        self.to.expect("TransitionUpdate built without target status")
    }
}

/// Result of a compare-and-set transition.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The session was in an allowed state and the update was applied.
    Applied(StreamSession),
    /// Another path moved the session first; nothing was written.
    Superseded { current: SessionStatus },
}

impl TransitionOutcome {
    /// Returns true if the update was applied.
    pub fn applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}
