pub mod command;
pub mod config;
pub mod orchestrator;
pub mod quota;
pub mod runtime;
pub mod session;
pub mod testing;

pub use command::{
    build_stream_args, validate_request, CommandError, ResolveError, ResolverConfig,
    SourceResolver, VideoSource, YtDlpResolver,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    UploadConfig,
};
pub use orchestrator::{
    OrchestratorConfig, OrchestratorError, OrchestratorStatus, SessionOrchestrator, StatusReport,
};
pub use quota::{QuotaLedger, QuotaUsage};
pub use runtime::{
    ContainerRuntime, DockerRuntime, LaunchSpec, Mount, ResourceLimits, RuntimeConfig,
    RuntimeError, UnitStatus, UnitSummary,
};
pub use session::{
    NewSession, SessionFilter, SessionStatus, SessionStore, SqliteSessionStore, StoreError,
    StreamSession, TransitionOutcome, TransitionUpdate,
};
