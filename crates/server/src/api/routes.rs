use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{handlers, quotas, sessions, uploads};
use crate::state::AppState;

/// Slack on top of the upload ceiling for multipart framing overhead.
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_body_limit =
        (state.uploads().max_size_bytes + MULTIPART_OVERHEAD_BYTES) as usize;

    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/orchestrator/status", get(handlers::orchestrator_status))
        // Sessions
        .route("/sessions", post(sessions::create_session))
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/{id}", get(sessions::get_session))
        .route("/sessions/{id}/stop", post(sessions::stop_session))
        // Quotas (package activation hook)
        .route("/users/{id}/quota", get(quotas::get_quota))
        .route("/users/{id}/quota", put(quotas::set_quota))
        // Uploads
        .route(
            "/uploads",
            post(uploads::upload_video).layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
