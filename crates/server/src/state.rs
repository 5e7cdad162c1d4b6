use std::sync::Arc;

use streamax_core::{
    Config, QuotaLedger, SanitizedConfig, SessionOrchestrator, SessionStore, UploadConfig,
};

/// Shared application state
pub struct AppState {
    config: Config,
    store: Arc<dyn SessionStore>,
    quota: Arc<QuotaLedger>,
    orchestrator: Arc<SessionOrchestrator>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn SessionStore>,
        quota: Arc<QuotaLedger>,
        orchestrator: Arc<SessionOrchestrator>,
    ) -> Self {
        Self {
            config,
            store,
            quota,
            orchestrator,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    pub fn quota(&self) -> &QuotaLedger {
        &self.quota
    }

    pub fn orchestrator(&self) -> &SessionOrchestrator {
        &self.orchestrator
    }

    pub fn uploads(&self) -> &UploadConfig {
        &self.config.uploads
    }

    /// Host directory uploaded videos land in; the same directory the
    /// orchestrator mounts into execution units.
    pub fn videos_dir(&self) -> &str {
        &self.config.orchestrator.videos_host_dir
    }
}
