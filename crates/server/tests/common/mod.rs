//! Shared test harness: an in-process router wired to mock collaborators.

// Each test binary compiles this module; not all of them use every helper.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use streamax_core::testing::{MockContainerRuntime, MockResolver};
use streamax_core::{
    Config, ContainerRuntime, QuotaLedger, SessionOrchestrator, SessionStore, SourceResolver,
    SqliteSessionStore,
};
use streamax_server::{create_router, AppState};

pub struct TestApp {
    pub router: Router,
    pub store: Arc<SqliteSessionStore>,
    pub quota: Arc<QuotaLedger>,
    pub runtime: Arc<MockContainerRuntime>,
    pub resolver: Arc<MockResolver>,
    pub videos_dir: tempfile::TempDir,
}

/// Build an app over an in-memory store, mock runtime/resolver, and a
/// temporary videos directory. The sweeper is not started; tests drive
/// everything through the HTTP surface.
pub fn test_app() -> TestApp {
    let videos_dir = tempfile::TempDir::new().expect("temp videos dir");

    let mut config = Config::default();
    config.orchestrator.videos_host_dir = videos_dir.path().display().to_string();
    config.uploads.max_size_bytes = 1024 * 1024; // keep test bodies small

    let store = Arc::new(SqliteSessionStore::in_memory().expect("in-memory store"));
    let quota = Arc::new(QuotaLedger::new(config.quota.default_streams_allowed));
    let runtime = Arc::new(MockContainerRuntime::new());
    let resolver = Arc::new(MockResolver::new());

    let orchestrator = Arc::new(SessionOrchestrator::new(
        config.orchestrator.clone(),
        Arc::clone(&store) as Arc<dyn SessionStore>,
        Arc::clone(&quota),
        Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
        Arc::clone(&resolver) as Arc<dyn SourceResolver>,
    ));

    let state = Arc::new(AppState::new(
        config,
        Arc::clone(&store) as Arc<dyn SessionStore>,
        Arc::clone(&quota),
        orchestrator,
    ));

    TestApp {
        router: create_router(state),
        store,
        quota,
        runtime,
        resolver,
        videos_dir,
    }
}

impl TestApp {
    /// Send a request and return status + parsed JSON body.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };

        (status, json)
    }

    /// Send a multipart upload with the given content type and payload.
    pub async fn upload(
        &self,
        user_id: &str,
        filename: &str,
        content_type: &str,
        payload: &[u8],
    ) -> (StatusCode, serde_json::Value) {
        let boundary = "streamax-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"user_id\"\r\n\r\n{user_id}\r\n",
                b = boundary
            )
            .as_bytes(),
        );
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n",
                b = boundary
            )
            .as_bytes(),
        );
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{b}--\r\n", b = boundary).as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/uploads")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("response");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };

        (status, json)
    }
}

/// A well-formed create-session body for a local file source.
pub fn create_session_body(user_id: &str) -> serde_json::Value {
    serde_json::json!({
        "user_id": user_id,
        "rtmp_url": "rtmp://live.example.com/app/streamkey",
        "source": { "kind": "local_file", "path": "clip.mp4" },
    })
}
