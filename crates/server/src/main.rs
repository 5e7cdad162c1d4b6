use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamax_core::{
    validate_config, Config, ContainerRuntime, DockerRuntime, QuotaLedger, SessionOrchestrator,
    SessionStore, SourceResolver, SqliteSessionStore, YtDlpResolver,
};

use streamax_server::{create_router, AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("STREAMAX_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration; a missing default file means "run with defaults"
    let config = if config_path.exists() {
        info!("Loading configuration from {:?}", config_path);
        streamax_core::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        info!("No config file at {:?}, using defaults", config_path);
        Config::default()
    };

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Runtime image: {}", config.runtime.image);

    // Create session store
    let store: Arc<dyn SessionStore> = Arc::new(
        SqliteSessionStore::new(&config.database.path)
            .context("Failed to create session store")?,
    );
    info!("Session store initialized");

    // Create quota ledger, seeded from persisted ceilings
    let quota = Arc::new(QuotaLedger::new(config.quota.default_streams_allowed));
    let persisted_quotas = store
        .list_user_quotas()
        .context("Failed to load persisted quotas")?;
    for (user_id, allowed) in &persisted_quotas {
        quota.set_allowed(user_id, *allowed);
    }
    info!("Quota ledger seeded ({} users)", persisted_quotas.len());

    // Create execution backend and source resolver
    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(DockerRuntime::new(config.runtime.clone()));
    let resolver: Arc<dyn SourceResolver> =
        Arc::new(YtDlpResolver::new(config.resolver.clone()));

    // Create and start the orchestrator. start() recovers quota
    // reservations from persisted sessions and spawns the sweeper.
    let orchestrator = Arc::new(SessionOrchestrator::new(
        config.orchestrator.clone(),
        Arc::clone(&store),
        Arc::clone(&quota),
        runtime,
        resolver,
    ));
    orchestrator.start().await;
    info!("Session orchestrator started");

    // Create app state
    let app_state = Arc::new(AppState::new(
        config.clone(),
        store,
        quota,
        Arc::clone(&orchestrator),
    ));

    // Create router
    let app = create_router(app_state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop orchestrator; running sessions are left to the recovery pass on
    // the next start.
    info!("Server shutting down...");
    orchestrator.stop().await;
    info!("Session orchestrator stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
