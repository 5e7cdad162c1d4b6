//! Types for execution backend operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during execution backend operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Unit not found (already gone, or never existed).
    #[error("unit not found: {0}")]
    UnitNotFound(String),

    /// The runtime refused to create the unit.
    #[error("launch failed: {0}")]
    LaunchFailed(String),

    /// The runtime binary is not installed or not executable.
    #[error("runtime binary not found: {0}")]
    BinaryNotFound(String),

    /// A runtime invocation failed for another reason.
    #[error("runtime command failed: {0}")]
    CommandFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle state of an execution unit.
///
/// `NotFound` is a status, not an error: the unit having disappeared is an
/// expected observation for the reconciliation sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Created but not yet running.
    Created,
    /// Process is running.
    Running,
    /// Process exited.
    Exited,
    /// Runtime reports the unit as dead.
    Dead,
    /// No unit with this id exists.
    NotFound,
}

impl UnitStatus {
    /// Returns true if the unit can no longer be streaming.
    pub fn is_defunct(&self) -> bool {
        matches!(
            self,
            UnitStatus::Exited | UnitStatus::Dead | UnitStatus::NotFound
        )
    }

    /// String form used in API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Created => "created",
            UnitStatus::Running => "running",
            UnitStatus::Exited => "exited",
            UnitStatus::Dead => "dead",
            UnitStatus::NotFound => "not_found",
        }
    }
}

/// Fixed resource policy applied to every unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Memory ceiling, runtime syntax (e.g. "1g").
    pub memory: String,
    /// CPU share (e.g. "1.0").
    pub cpus: String,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory: "1g".to_string(),
            cpus: "1.0".to_string(),
        }
    }
}

/// A read-only bind mount into the unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mount {
    /// Host directory.
    pub host_dir: String,
    /// Mount point inside the unit.
    pub mount_point: String,
}

/// Everything needed to create one isolated execution unit.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Unit name under the orchestrator's naming convention.
    pub name: String,
    /// Full argv executed inside the unit.
    pub command: Vec<String>,
    /// Resource limits.
    pub limits: ResourceLimits,
    /// Shared isolation network the unit joins.
    pub network: String,
    /// Read-only mounts (video files for local sources).
    pub mounts: Vec<Mount>,
}

/// Summary row from a prefix listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSummary {
    /// Runtime unit id.
    pub id: String,
    /// Unit name.
    pub name: String,
    /// Raw status text as reported by the runtime.
    pub status: String,
}

/// Trait for execution backends.
///
/// The isolation boundary of the system: every session gets its own unit so
/// one user's transcode cannot observe or disrupt another's, and the
/// resource limits bound the blast radius of a misbehaving input.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Create and start an isolated unit. Ensures the shared isolation
    /// network exists first (create-if-absent, idempotent). Returns the
    /// runtime's unit id.
    async fn launch(&self, spec: &LaunchSpec) -> Result<String, RuntimeError>;

    /// Request graceful termination, then force removal. Both steps are
    /// attempted even if the first fails; [`RuntimeError::UnitNotFound`]
    /// means the unit was already gone.
    async fn stop(&self, unit_id: &str) -> Result<(), RuntimeError>;

    /// Current lifecycle state. A missing unit yields
    /// [`UnitStatus::NotFound`], never an error.
    async fn status(&self, unit_id: &str) -> Result<UnitStatus, RuntimeError>;

    /// Enumerate units whose name starts with `prefix`.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<UnitSummary>, RuntimeError>;
}
