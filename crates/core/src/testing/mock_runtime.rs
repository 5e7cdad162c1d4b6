//! Mock execution backend for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::runtime::{
    ContainerRuntime, LaunchSpec, RuntimeError, UnitStatus, UnitSummary,
};

/// A recorded launch for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedLaunch {
    /// The spec that was launched.
    pub spec: LaunchSpec,
    /// The unit id that was returned.
    pub unit_id: String,
    /// When the launch happened.
    pub timestamp: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct MockUnit {
    name: String,
    status: UnitStatus,
}

/// Mock implementation of the ContainerRuntime trait.
///
/// Provides controllable behavior for testing:
/// - Track launched units for assertions
/// - Control unit lifecycle states
/// - Simulate failures
///
/// # Example
///
/// ```rust,ignore
/// let runtime = MockContainerRuntime::new();
///
/// let unit_id = runtime.launch(&spec).await?;
/// assert_eq!(runtime.launch_count().await, 1);
///
/// // Simulate the process dying silently
/// runtime.set_unit_status(&unit_id, UnitStatus::Exited).await;
/// assert_eq!(runtime.status(&unit_id).await?, UnitStatus::Exited);
/// ```
#[derive(Debug)]
pub struct MockContainerRuntime {
    /// Recorded launch calls.
    launched: Arc<RwLock<Vec<RecordedLaunch>>>,
    /// Recorded stop calls (unit ids).
    stopped: Arc<RwLock<Vec<String>>>,
    /// Current unit states by id.
    units: Arc<RwLock<HashMap<String, MockUnit>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<RuntimeError>>>,
    /// Counter for generating unique unit ids.
    id_counter: AtomicU32,
}

impl Default for MockContainerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockContainerRuntime {
    /// Create a new mock runtime.
    pub fn new() -> Self {
        Self {
            launched: Arc::new(RwLock::new(Vec::new())),
            stopped: Arc::new(RwLock::new(Vec::new())),
            units: Arc::new(RwLock::new(HashMap::new())),
            next_error: Arc::new(RwLock::new(None)),
            id_counter: AtomicU32::new(0),
        }
    }

    /// Get all recorded launches.
    pub async fn launches(&self) -> Vec<RecordedLaunch> {
        self.launched.read().await.clone()
    }

    /// Number of launch calls made.
    pub async fn launch_count(&self) -> usize {
        self.launched.read().await.len()
    }

    /// Number of stop calls made.
    pub async fn stop_count(&self) -> usize {
        self.stopped.read().await.len()
    }

    /// Set the lifecycle state of a unit directly.
    pub async fn set_unit_status(&self, unit_id: &str, status: UnitStatus) {
        let mut units = self.units.write().await;
        if let Some(unit) = units.get_mut(unit_id) {
            unit.status = status;
        }
    }

    /// Remove a unit entirely, as if it was deleted behind our back.
    pub async fn remove_unit(&self, unit_id: &str) {
        self.units.write().await.remove(unit_id);
    }

    /// Pre-populate a unit (for testing status/list without a launch).
    pub async fn add_unit(&self, unit_id: &str, name: &str, status: UnitStatus) {
        self.units.write().await.insert(
            unit_id.to_string(),
            MockUnit {
                name: name.to_string(),
                status,
            },
        );
    }

    /// Check if a unit exists.
    pub async fn has_unit(&self, unit_id: &str) -> bool {
        self.units.read().await.contains_key(unit_id)
    }

    /// Number of live units.
    pub async fn unit_count(&self) -> usize {
        self.units.read().await.len()
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: RuntimeError) {
        *self.next_error.write().await = Some(error);
    }

    /// Take the next error if set.
    async fn take_error(&self) -> Option<RuntimeError> {
        self.next_error.write().await.take()
    }

    fn generate_id(&self) -> String {
        let n = self.id_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("mockunit{:08x}", n)
    }
}

#[async_trait]
impl ContainerRuntime for MockContainerRuntime {
    fn name(&self) -> &str {
        "mock"
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<String, RuntimeError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        let unit_id = self.generate_id();

        self.units.write().await.insert(
            unit_id.clone(),
            MockUnit {
                name: spec.name.clone(),
                status: UnitStatus::Running,
            },
        );

        self.launched.write().await.push(RecordedLaunch {
            spec: spec.clone(),
            unit_id: unit_id.clone(),
            timestamp: Utc::now(),
        });

        Ok(unit_id)
    }

    async fn stop(&self, unit_id: &str) -> Result<(), RuntimeError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        self.stopped.write().await.push(unit_id.to_string());

        if self.units.write().await.remove(unit_id).is_some() {
            Ok(())
        } else {
            Err(RuntimeError::UnitNotFound(unit_id.to_string()))
        }
    }

    async fn status(&self, unit_id: &str) -> Result<UnitStatus, RuntimeError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        Ok(self
            .units
            .read()
            .await
            .get(unit_id)
            .map(|u| u.status)
            .unwrap_or(UnitStatus::NotFound))
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<UnitSummary>, RuntimeError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        let units = self.units.read().await;
        let mut result: Vec<UnitSummary> = units
            .iter()
            .filter(|(_, unit)| unit.name.starts_with(prefix))
            .map(|(id, unit)| UnitSummary {
                id: id.clone(),
                name: unit.name.clone(),
                status: unit.status.as_str().to_string(),
            })
            .collect();

        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }
}
