//! Session lifecycle integration tests.
//!
//! These tests drive the orchestrator against an in-memory store and mock
//! collaborators, verifying the state machine discipline end to end:
//! quota admission, fail-fast validation, launch failure handling,
//! idempotent stop, and sweeper-detected crashes.

use std::sync::Arc;

use streamax_core::testing::{MockContainerRuntime, MockResolver};
use streamax_core::{
    OrchestratorConfig, OrchestratorError, QuotaLedger, SessionFilter, SessionOrchestrator,
    SessionStatus, SessionStore, SqliteSessionStore, UnitStatus, VideoSource,
};

const RTMP: &str = "rtmp://live.example.com/app/streamkey";

/// Test helper wiring an orchestrator with controllable collaborators.
struct TestHarness {
    store: Arc<SqliteSessionStore>,
    quota: Arc<QuotaLedger>,
    runtime: Arc<MockContainerRuntime>,
    resolver: Arc<MockResolver>,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            store: Arc::new(SqliteSessionStore::in_memory().expect("in-memory store")),
            quota: Arc::new(QuotaLedger::new(1)),
            runtime: Arc::new(MockContainerRuntime::new()),
            resolver: Arc::new(MockResolver::new()),
        }
    }

    fn orchestrator(&self) -> SessionOrchestrator {
        self.orchestrator_with_launch_timeout(3600)
    }

    fn orchestrator_with_launch_timeout(&self, launch_timeout_secs: u64) -> SessionOrchestrator {
        let config = OrchestratorConfig {
            launch_timeout_secs,
            ..Default::default()
        };

        SessionOrchestrator::new(
            config,
            Arc::clone(&self.store) as Arc<dyn SessionStore>,
            Arc::clone(&self.quota),
            Arc::clone(&self.runtime) as Arc<dyn streamax_core::ContainerRuntime>,
            Arc::clone(&self.resolver) as Arc<dyn streamax_core::SourceResolver>,
        )
    }

    fn session_status(&self, id: &str) -> SessionStatus {
        self.store.get(id).unwrap().unwrap().status
    }

    fn active(&self, user: &str) -> u32 {
        self.quota.usage(user).active
    }
}

// =============================================================================
// Creation
// =============================================================================

#[tokio::test]
async fn test_create_local_file_session_runs() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let session = orchestrator
        .create_session("user-1", VideoSource::local_file("clip.mp4"), RTMP)
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Running);
    assert!(session.unit_id.is_some());
    assert!(session.started_at.is_some());
    assert_eq!(harness.active("user-1"), 1);

    // The launched spec follows the naming convention and mounts the
    // videos directory read-only.
    let launches = harness.runtime.launches().await;
    assert_eq!(launches.len(), 1);
    let spec = &launches[0].spec;
    assert!(spec.name.starts_with("streamax-user-1-"));
    assert_eq!(spec.network, "streamax_net");
    assert_eq!(spec.mounts.len(), 1);
    assert_eq!(spec.mounts[0].mount_point, "/videos");
    assert!(spec.command.contains(&"/videos/clip.mp4".to_string()));
    assert_eq!(spec.command.last().map(String::as_str), Some(RTMP));
}

#[tokio::test]
async fn test_create_hosted_url_session_has_no_mounts() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    orchestrator
        .create_session(
            "user-1",
            VideoSource::hosted_url("https://cdn.example/video.mp4"),
            RTMP,
        )
        .await
        .unwrap();

    let launches = harness.runtime.launches().await;
    let spec = &launches[0].spec;
    assert!(spec.mounts.is_empty());
    assert!(spec.command.contains(&"https://cdn.example/video.mp4".to_string()));
    assert_eq!(harness.resolver.call_count().await, 0);
}

#[tokio::test]
async fn test_create_web_page_session_resolves_first() {
    let harness = TestHarness::new();
    harness
        .resolver
        .set_resolution("https://videos.example/watch?v=1", "https://cdn.example/direct.m3u8")
        .await;
    let orchestrator = harness.orchestrator();

    let session = orchestrator
        .create_session(
            "user-1",
            VideoSource::web_page("https://videos.example/watch?v=1"),
            RTMP,
        )
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Running);
    assert_eq!(
        harness.resolver.calls().await,
        vec!["https://videos.example/watch?v=1".to_string()]
    );

    // The command reads the resolved media URL, not the page URL.
    let launches = harness.runtime.launches().await;
    let spec = &launches[0].spec;
    assert!(spec.command.contains(&"https://cdn.example/direct.m3u8".to_string()));
    assert!(!spec.command.contains(&"https://videos.example/watch?v=1".to_string()));
}

// =============================================================================
// Quota admission (scenarios A + B)
// =============================================================================

#[tokio::test]
async fn test_second_session_rejected_at_quota() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let first = orchestrator
        .create_session("user-1", VideoSource::local_file("clip.mp4"), RTMP)
        .await
        .unwrap();
    assert_eq!(first.status, SessionStatus::Running);
    assert_eq!(harness.active("user-1"), 1);

    let err = orchestrator
        .create_session("user-1", VideoSource::local_file("clip.mp4"), RTMP)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::QuotaExceeded));
    assert_eq!(harness.active("user-1"), 1);
    // No second unit was ever launched.
    assert_eq!(harness.runtime.launch_count().await, 1);
}

#[tokio::test]
async fn test_quota_slot_reusable_after_stop() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let session = orchestrator
        .create_session("user-1", VideoSource::local_file("clip.mp4"), RTMP)
        .await
        .unwrap();

    orchestrator.stop_session(&session.id).await.unwrap();
    assert_eq!(harness.active("user-1"), 0);

    let second = orchestrator
        .create_session("user-1", VideoSource::local_file("clip.mp4"), RTMP)
        .await
        .unwrap();
    assert_eq!(second.status, SessionStatus::Running);
}

// =============================================================================
// Fail-fast validation
// =============================================================================

#[tokio::test]
async fn test_validation_failure_touches_nothing() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let err = orchestrator
        .create_session(
            "user-1",
            VideoSource::local_file("clip.mp4"),
            "http://live.example.com/app/key",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));

    let err = orchestrator
        .create_session("user-1", VideoSource::hosted_url(""), RTMP)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));

    // No quota reserved, no unit launched, no session persisted.
    assert_eq!(harness.active("user-1"), 0);
    assert_eq!(harness.runtime.launch_count().await, 0);
    assert_eq!(harness.store.count(&SessionFilter::new()).unwrap(), 0);
}

// =============================================================================
// Resolution failure (scenario C)
// =============================================================================

#[tokio::test]
async fn test_resolution_failure_fails_session_and_releases_quota() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    harness.resolver.set_failure("not-a-video-page").await;

    let err = orchestrator
        .create_session("user-1", VideoSource::web_page("not-a-video-page"), RTMP)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::SourceResolution(_)));
    assert_eq!(harness.active("user-1"), 0);
    assert_eq!(harness.runtime.launch_count().await, 0);

    // The session exists, terminal, with the resolution reason recorded.
    let sessions = harness.store.list(&SessionFilter::new()).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, SessionStatus::Error);
    assert!(sessions[0]
        .error
        .as_deref()
        .unwrap()
        .contains("source resolution failed"));
    assert!(sessions[0].stopped_at.is_some());
    assert!(sessions[0].started_at.is_none());
}

// =============================================================================
// Launch failure (scenario D)
// =============================================================================

#[tokio::test]
async fn test_launch_failure_moves_starting_to_error() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    harness
        .runtime
        .set_next_error(streamax_core::RuntimeError::LaunchFailed(
            "image pull failed".into(),
        ))
        .await;

    let err = orchestrator
        .create_session("user-1", VideoSource::local_file("clip.mp4"), RTMP)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Launch(_)));
    assert_eq!(harness.active("user-1"), 0);

    let sessions = harness.store.list(&SessionFilter::new()).unwrap();
    assert_eq!(sessions.len(), 1);
    let session = &sessions[0];
    // Never reached running, no unit retained from the failed attempt.
    assert_eq!(session.status, SessionStatus::Error);
    assert!(session.unit_id.is_none());
    assert!(session.started_at.is_none());
    assert!(session.error.as_deref().unwrap().contains("launch failed"));
}

// =============================================================================
// Stop (idempotency, missing units)
// =============================================================================

#[tokio::test]
async fn test_stop_is_idempotent() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let session = orchestrator
        .create_session("user-1", VideoSource::local_file("clip.mp4"), RTMP)
        .await
        .unwrap();

    orchestrator.stop_session(&session.id).await.unwrap();
    assert_eq!(harness.session_status(&session.id), SessionStatus::Stopped);
    assert_eq!(harness.active("user-1"), 0);

    // Second stop is a no-op success with no second teardown.
    let stops_before = harness.runtime.stop_count().await;
    orchestrator.stop_session(&session.id).await.unwrap();
    assert_eq!(harness.runtime.stop_count().await, stops_before);
    assert_eq!(harness.session_status(&session.id), SessionStatus::Stopped);
}

#[tokio::test]
async fn test_stop_with_unit_already_gone_still_completes() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let session = orchestrator
        .create_session("user-1", VideoSource::local_file("clip.mp4"), RTMP)
        .await
        .unwrap();

    // The unit disappears behind our back.
    harness
        .runtime
        .remove_unit(session.unit_id.as_deref().unwrap())
        .await;

    orchestrator.stop_session(&session.id).await.unwrap();
    let stopped = harness.store.get(&session.id).unwrap().unwrap();
    assert_eq!(stopped.status, SessionStatus::Stopped);
    assert!(stopped.stopped_at.is_some());
    assert_eq!(harness.active("user-1"), 0);
}

#[tokio::test]
async fn test_stop_unknown_session_is_not_found() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let err = orchestrator.stop_session("no-such-id").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::SessionNotFound(_)));
}

#[tokio::test]
async fn test_stop_requested_before_launch_resolves() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    // A session parked in `starting` with no unit id models a launch still
    // in flight in another task.
    assert!(harness.quota.try_reserve("user-1"));
    let session = harness
        .store
        .insert(streamax_core::NewSession {
            user_id: "user-1".to_string(),
            rtmp_url: RTMP.to_string(),
            source: VideoSource::local_file("clip.mp4"),
        })
        .unwrap();

    orchestrator.stop_session(&session.id).await.unwrap();

    // No unit exists yet, so nothing was stopped; the persisted `stopping`
    // status is the flag the launch path will observe.
    assert_eq!(harness.runtime.stop_count().await, 0);
    assert_eq!(harness.session_status(&session.id), SessionStatus::Stopping);
    // Quota stays held until the session actually terminates.
    assert_eq!(harness.active("user-1"), 1);
}

// =============================================================================
// Sweeper (scenario E + launch timeout + orphans)
// =============================================================================

#[tokio::test]
async fn test_sweeper_detects_silent_crash() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let session = orchestrator
        .create_session("user-1", VideoSource::local_file("clip.mp4"), RTMP)
        .await
        .unwrap();
    let unit_id = session.unit_id.clone().unwrap();

    // The transcode process dies without anyone being told.
    harness.runtime.remove_unit(&unit_id).await;

    orchestrator.sweep_now().await.unwrap();

    let swept = harness.store.get(&session.id).unwrap().unwrap();
    assert_eq!(swept.status, SessionStatus::Error);
    assert!(swept.stopped_at.is_some());
    assert!(swept.error.as_deref().unwrap().contains("not_found"));
    assert_eq!(harness.active("user-1"), 0);
}

#[tokio::test]
async fn test_stop_after_sweep_does_not_release_twice() {
    let harness = TestHarness::new();
    harness.quota.set_allowed("user-1", 2);
    let orchestrator = harness.orchestrator();

    let dying = orchestrator
        .create_session("user-1", VideoSource::local_file("a.mp4"), RTMP)
        .await
        .unwrap();
    let _healthy = orchestrator
        .create_session("user-1", VideoSource::local_file("b.mp4"), RTMP)
        .await
        .unwrap();
    assert_eq!(harness.active("user-1"), 2);

    harness
        .runtime
        .remove_unit(dying.unit_id.as_deref().unwrap())
        .await;
    orchestrator.sweep_now().await.unwrap();
    assert_eq!(harness.session_status(&dying.id), SessionStatus::Error);
    assert_eq!(harness.active("user-1"), 1);

    // An explicit stop of the already-swept session succeeds as a no-op
    // and must not release the healthy session's reservation.
    orchestrator.stop_session(&dying.id).await.unwrap();
    assert_eq!(harness.active("user-1"), 1);
    assert_eq!(harness.session_status(&dying.id), SessionStatus::Error);
}

#[tokio::test]
async fn test_sweeper_leaves_healthy_sessions_alone() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let session = orchestrator
        .create_session("user-1", VideoSource::local_file("clip.mp4"), RTMP)
        .await
        .unwrap();

    orchestrator.sweep_now().await.unwrap();

    assert_eq!(harness.session_status(&session.id), SessionStatus::Running);
    assert_eq!(harness.active("user-1"), 1);
    assert!(harness
        .runtime
        .has_unit(session.unit_id.as_deref().unwrap())
        .await);
}

#[tokio::test]
async fn test_sweeper_times_out_lost_launches() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator_with_launch_timeout(0);

    assert!(harness.quota.try_reserve("user-1"));
    let session = harness
        .store
        .insert(streamax_core::NewSession {
            user_id: "user-1".to_string(),
            rtmp_url: RTMP.to_string(),
            source: VideoSource::local_file("clip.mp4"),
        })
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    orchestrator.sweep_now().await.unwrap();

    let swept = harness.store.get(&session.id).unwrap().unwrap();
    assert_eq!(swept.status, SessionStatus::Error);
    assert!(swept.error.as_deref().unwrap().contains("timed out"));
    assert_eq!(harness.active("user-1"), 0);
}

#[tokio::test]
async fn test_sweeper_stops_orphaned_units() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    // A unit matching the naming convention with no live session behind it.
    harness
        .runtime
        .add_unit("orphan-unit", "streamax-deadbeef-cafe0000", UnitStatus::Running)
        .await;

    // And a healthy referenced one.
    let session = orchestrator
        .create_session("user-1", VideoSource::local_file("clip.mp4"), RTMP)
        .await
        .unwrap();

    orchestrator.sweep_now().await.unwrap();

    assert!(!harness.runtime.has_unit("orphan-unit").await);
    assert!(harness
        .runtime
        .has_unit(session.unit_id.as_deref().unwrap())
        .await);
    assert_eq!(harness.session_status(&session.id), SessionStatus::Running);
}

// =============================================================================
// Status reporting
// =============================================================================

#[tokio::test]
async fn test_status_report_cross_references_unit() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let session = orchestrator
        .create_session("user-1", VideoSource::local_file("clip.mp4"), RTMP)
        .await
        .unwrap();

    let report = orchestrator.session_status(&session.id).await.unwrap();
    assert!(report.healthy);
    assert_eq!(report.unit_status, Some(UnitStatus::Running));

    // The unit dies: the report shows the divergence without mutating.
    harness
        .runtime
        .set_unit_status(session.unit_id.as_deref().unwrap(), UnitStatus::Exited)
        .await;

    let report = orchestrator.session_status(&session.id).await.unwrap();
    assert!(!report.healthy);
    assert_eq!(report.unit_status, Some(UnitStatus::Exited));
    assert_eq!(report.session.status, SessionStatus::Running);
    // Persisted state untouched by the read.
    assert_eq!(harness.session_status(&session.id), SessionStatus::Running);
}

#[tokio::test]
async fn test_status_unknown_session_is_not_found() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();

    let err = orchestrator.session_status("ghost").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::SessionNotFound(_)));
}

// =============================================================================
// Recovery
// =============================================================================

#[tokio::test]
async fn test_start_recovers_active_reservations() {
    let harness = TestHarness::new();
    harness.quota.set_allowed("user-1", 2);
    let orchestrator = harness.orchestrator();

    orchestrator
        .create_session("user-1", VideoSource::local_file("a.mp4"), RTMP)
        .await
        .unwrap();
    orchestrator
        .create_session("user-1", VideoSource::local_file("b.mp4"), RTMP)
        .await
        .unwrap();

    // A fresh ledger (as after a restart) knows nothing about the two
    // persisted running sessions.
    let fresh_quota = Arc::new(QuotaLedger::new(2));
    let restarted = SessionOrchestrator::new(
        OrchestratorConfig {
            enabled: false,
            ..Default::default()
        },
        Arc::clone(&harness.store) as Arc<dyn SessionStore>,
        Arc::clone(&fresh_quota),
        Arc::clone(&harness.runtime) as Arc<dyn streamax_core::ContainerRuntime>,
        Arc::clone(&harness.resolver) as Arc<dyn streamax_core::SourceResolver>,
    );

    restarted.start().await;
    assert_eq!(fresh_quota.usage("user-1").active, 2);

    // The recovered count gates admission.
    let err = restarted
        .create_session("user-1", VideoSource::local_file("c.mp4"), RTMP)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::QuotaExceeded));

    restarted.stop().await;
}
