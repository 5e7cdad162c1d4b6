//! Session orchestrator implementation.
//!
//! All state transitions go through the store's compare-and-set, guarded on
//! the session's current status. A terminal CAS can apply at most once per
//! session, and the quota reservation is released only by the path whose
//! terminal CAS applied — that is the exactly-once release discipline every
//! code path below leans on.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::command::{self, SourceResolver, VideoSource};
use crate::quota::QuotaLedger;
use crate::runtime::{ContainerRuntime, LaunchSpec, Mount, RuntimeError, UnitStatus};
use crate::session::{
    NewSession, SessionFilter, SessionStatus, SessionStore, StreamSession, TransitionOutcome,
    TransitionUpdate,
};

use super::config::OrchestratorConfig;
use super::types::{OrchestratorError, OrchestratorStatus, StatusReport};

/// Upper bound on sessions examined per sweep pass.
const SWEEP_LIST_LIMIT: i64 = 1000;

/// The session orchestrator - turns streaming requests into monitored
/// execution units and tears them down again.
pub struct SessionOrchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn SessionStore>,
    quota: Arc<QuotaLedger>,
    runtime: Arc<dyn ContainerRuntime>,
    resolver: Arc<dyn SourceResolver>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SessionOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn SessionStore>,
        quota: Arc<QuotaLedger>,
        runtime: Arc<dyn ContainerRuntime>,
        resolver: Arc<dyn SourceResolver>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            store,
            quota,
            runtime,
            resolver,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the orchestrator (recovers quota reservations, spawns the
    /// reconciliation sweeper).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }

        info!("Starting session orchestrator");

        self.recover_active_reservations();
        self.spawn_sweeper_loop();

        info!("Session orchestrator started");
    }

    /// Stop the orchestrator gracefully. Running sessions are left alone;
    /// they are re-adopted by the recovery pass on the next start.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping session orchestrator");
        let _ = self.shutdown_tx.send(());
    }

    /// Get current orchestrator status.
    pub fn status(&self) -> OrchestratorStatus {
        let count = |status: SessionStatus| {
            self.store
                .count(&SessionFilter::new().with_status(status))
                .unwrap_or(0) as usize
        };

        OrchestratorStatus {
            sweeper_running: self.running.load(Ordering::Relaxed),
            starting_count: count(SessionStatus::Starting),
            running_count: count(SessionStatus::Running),
            stopping_count: count(SessionStatus::Stopping),
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Create a session: validate, reserve quota, persist, launch.
    ///
    /// On any failure after the reservation the session is driven to a
    /// terminal state and the reservation is released before the error is
    /// returned - the caller never sees a failure that silently left a
    /// session running.
    pub async fn create_session(
        &self,
        user_id: &str,
        source: VideoSource,
        rtmp_url: &str,
    ) -> Result<StreamSession, OrchestratorError> {
        // Fail fast: nothing is persisted or reserved for a request that
        // never becomes a session.
        command::validate_request(&source, rtmp_url)?;

        if !self.quota.try_reserve(user_id) {
            debug!(user_id, "session rejected: quota exhausted");
            return Err(OrchestratorError::QuotaExceeded);
        }

        let session = match self.store.insert(NewSession {
            user_id: user_id.to_string(),
            rtmp_url: rtmp_url.to_string(),
            source,
        }) {
            Ok(session) => session,
            Err(e) => {
                self.quota.release(user_id);
                return Err(e.into());
            }
        };

        info!(session_id = %session.id, user_id, "session created, launching");
        self.launch_session(session).await
    }

    /// Resolve the input, build the command, launch the unit, and promote
    /// the session to `running`.
    async fn launch_session(
        &self,
        session: StreamSession,
    ) -> Result<StreamSession, OrchestratorError> {
        let input = match &session.source {
            VideoSource::LocalFile { path } => {
                command::container_input(path, &self.config.videos_mount_point)
            }
            VideoSource::HostedUrl { url } => url.clone(),
            VideoSource::WebPage { url } => match self.resolver.resolve(url).await {
                Ok(media_url) => {
                    debug!(session_id = %session.id, "resolved web page source");
                    media_url
                }
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "source resolution failed");
                    self.fail_session(&session, format!("source resolution failed: {}", e));
                    return Err(e.into());
                }
            },
        };

        let unit_name = unit_name(&self.config.unit_prefix, &session.user_id, &session.id);
        let mounts = match &session.source {
            VideoSource::LocalFile { .. } => vec![Mount {
                host_dir: self.config.videos_host_dir.clone(),
                mount_point: self.config.videos_mount_point.clone(),
            }],
            _ => vec![],
        };

        let spec = LaunchSpec {
            name: unit_name.clone(),
            command: command::build_stream_args(&input, &session.rtmp_url),
            limits: self.config.limits.clone(),
            network: self.config.network.clone(),
            mounts,
        };

        let unit_id = match self.runtime.launch(&spec).await {
            Ok(unit_id) => unit_id,
            Err(e) => {
                error!(session_id = %session.id, unit = %unit_name, error = %e, "launch failed");
                self.fail_session(&session, format!("launch failed: {}", e));
                return Err(e.into());
            }
        };

        let outcome = self.store.transition(
            &session.id,
            &[SessionStatus::Starting],
            TransitionUpdate::to(SessionStatus::Running)
                .with_unit(&unit_id, &unit_name)
                .with_started_at(Utc::now()),
        )?;

        match outcome {
            TransitionOutcome::Applied(session) => {
                info!(session_id = %session.id, unit_id = %unit_id, "session running");
                Ok(session)
            }
            TransitionOutcome::Superseded { current } => {
                // A stop request or the sweeper's launch timeout won the
                // race while the launch was in flight. The unit we just
                // created must not outlive that decision.
                warn!(
                    session_id = %session.id,
                    %current,
                    "launch resolved after session moved on, tearing unit down"
                );
                if let Err(e) = self.runtime.stop(&unit_id).await {
                    if !matches!(e, RuntimeError::UnitNotFound(_)) {
                        warn!(unit_id = %unit_id, error = %e, "failed to stop superseded unit");
                    }
                }

                let outcome = self.store.transition(
                    &session.id,
                    &[SessionStatus::Stopping],
                    TransitionUpdate::to(SessionStatus::Stopped)
                        .with_unit(&unit_id, &unit_name)
                        .with_stopped_at(Utc::now()),
                )?;
                if outcome.applied() {
                    self.quota.release(&session.user_id);
                }

                match self.store.get(&session.id)? {
                    Some(session) => Ok(session),
                    None => Err(OrchestratorError::SessionNotFound(session.id.clone())),
                }
            }
        }
    }

    /// Stop a session. Idempotent: stopping an already-terminal session is
    /// a no-op success so duplicate stop requests are harmless.
    pub async fn stop_session(&self, session_id: &str) -> Result<(), OrchestratorError> {
        let session = self
            .store
            .get(session_id)?
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;

        if session.status.is_terminal() {
            debug!(session_id, "stop on terminal session is a no-op");
            return Ok(());
        }

        let outcome = self.store.transition(
            session_id,
            &[SessionStatus::Starting, SessionStatus::Running],
            TransitionUpdate::to(SessionStatus::Stopping),
        )?;

        let session = match outcome {
            TransitionOutcome::Applied(session) => session,
            TransitionOutcome::Superseded { current }
                if current == SessionStatus::Stopping || current.is_terminal() =>
            {
                // Another stop (or a terminal transition) got there first.
                return Ok(());
            }
            TransitionOutcome::Superseded { current } => {
                return Err(OrchestratorError::InvalidState {
                    session_id: session_id.to_string(),
                    current,
                    operation: "stop".to_string(),
                });
            }
        };

        let Some(unit_id) = session.unit_id.clone() else {
            // Launch still in flight. The persisted `stopping` status is the
            // stop-request flag the launch path checks once it resolves; it
            // will tear down the unit and finish this transition.
            info!(session_id, "stop requested while launch in flight");
            return Ok(());
        };

        match self.runtime.stop(&unit_id).await {
            Ok(()) => {}
            Err(RuntimeError::UnitNotFound(_)) => {
                // Already gone counts as already stopped.
                debug!(session_id, unit_id = %unit_id, "unit already gone");
            }
            Err(e) => {
                warn!(session_id, unit_id = %unit_id, error = %e, "unit stop failed, continuing teardown");
            }
        }

        let outcome = self.store.transition(
            session_id,
            &[SessionStatus::Stopping],
            TransitionUpdate::to(SessionStatus::Stopped).with_stopped_at(Utc::now()),
        )?;
        if outcome.applied() {
            self.quota.release(&session.user_id);
            info!(session_id, "session stopped");
        }

        Ok(())
    }

    /// Read-only status: persisted record cross-referenced with the live
    /// unit state. Never mutates (drift correction is the sweeper's job),
    /// so it is safe to call as often as a dashboard likes.
    pub async fn session_status(
        &self,
        session_id: &str,
    ) -> Result<StatusReport, OrchestratorError> {
        let session = self
            .store
            .get(session_id)?
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;

        let unit_status = match &session.unit_id {
            Some(unit_id) => Some(
                self.runtime
                    .status(unit_id)
                    .await
                    .map_err(OrchestratorError::Runtime)?,
            ),
            None => None,
        };

        let healthy =
            session.status == SessionStatus::Running && unit_status == Some(UnitStatus::Running);

        Ok(StatusReport {
            session,
            unit_status,
            healthy,
        })
    }

    /// Run one reconciliation pass immediately, outside the timer loop.
    pub async fn sweep_now(&self) -> Result<(), OrchestratorError> {
        Self::sweep_once(&self.store, &self.quota, &self.runtime, &self.config).await
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    /// Drive a non-terminal session to `error`, releasing its quota
    /// reservation iff this call won the terminal transition.
    fn fail_session(&self, session: &StreamSession, reason: String) {
        let outcome = self.store.transition(
            &session.id,
            &[
                SessionStatus::Starting,
                SessionStatus::Running,
                SessionStatus::Stopping,
            ],
            TransitionUpdate::to(SessionStatus::Error)
                .with_error(reason)
                .with_stopped_at(Utc::now()),
        );

        match outcome {
            Ok(outcome) if outcome.applied() => {
                self.quota.release(&session.user_id);
            }
            Ok(TransitionOutcome::Superseded { current }) => {
                debug!(session_id = %session.id, %current, "session already terminal");
            }
            Ok(_) => {}
            Err(e) => {
                error!(session_id = %session.id, error = %e, "failed to persist error state");
            }
        }
    }

    /// Rebuild the quota ledger's active counts from persisted sessions.
    fn recover_active_reservations(&self) {
        let mut per_user: HashMap<String, u32> = HashMap::new();

        for status in [
            SessionStatus::Starting,
            SessionStatus::Running,
            SessionStatus::Stopping,
        ] {
            let filter = SessionFilter::new()
                .with_status(status)
                .with_limit(SWEEP_LIST_LIMIT);
            match self.store.list(&filter) {
                Ok(sessions) => {
                    for session in sessions {
                        *per_user.entry(session.user_id).or_default() += 1;
                    }
                }
                Err(e) => {
                    error!(%status, error = %e, "failed to recover sessions");
                }
            }
        }

        for (user_id, active) in per_user {
            info!(user_id = %user_id, active, "recovered quota reservations");
            self.quota.restore_active(&user_id, active);
        }
    }

    /// Spawn the reconciliation sweeper task.
    fn spawn_sweeper_loop(&self) {
        if !self.config.enabled {
            info!("Reconciliation sweeper disabled in config");
            return;
        }

        let running = Arc::clone(&self.running);
        let store = Arc::clone(&self.store);
        let quota = Arc::clone(&self.quota);
        let runtime = Arc::clone(&self.runtime);
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Reconciliation sweeper started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Reconciliation sweeper received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(config.sweep_interval_ms)) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = Self::sweep_once(&store, &quota, &runtime, &config).await {
                            warn!("Sweep error: {}", e);
                        }
                    }
                }
            }
            info!("Reconciliation sweeper stopped");
        });
    }

    /// One reconciliation pass: crashed units, lost launches, orphans.
    pub(crate) async fn sweep_once(
        store: &Arc<dyn SessionStore>,
        quota: &Arc<QuotaLedger>,
        runtime: &Arc<dyn ContainerRuntime>,
        config: &OrchestratorConfig,
    ) -> Result<(), OrchestratorError> {
        // Snapshot the unit listing BEFORE the session lists: a unit
        // launched after this point is missing from the stale listing and
        // can never be misjudged as an orphan.
        let listed_units = runtime.list_by_prefix(&config.unit_prefix).await;

        let starting = store.list(
            &SessionFilter::new()
                .with_status(SessionStatus::Starting)
                .with_limit(SWEEP_LIST_LIMIT),
        )?;
        let running = store.list(
            &SessionFilter::new()
                .with_status(SessionStatus::Running)
                .with_limit(SWEEP_LIST_LIMIT),
        )?;
        let stopping = store.list(
            &SessionFilter::new()
                .with_status(SessionStatus::Stopping)
                .with_limit(SWEEP_LIST_LIMIT),
        )?;

        Self::sweep_running_sessions(store, quota, runtime, &running).await;
        Self::sweep_stuck_launches(store, quota, config, &starting, &stopping);

        match listed_units {
            Ok(units) => {
                Self::sweep_orphan_units(runtime, config, units, &starting, &running, &stopping)
                    .await;
            }
            Err(e) => {
                warn!(error = %e, "unit listing failed, skipping orphan sweep");
            }
        }

        Ok(())
    }

    /// Cross-check every `running` session against the live unit state.
    async fn sweep_running_sessions(
        store: &Arc<dyn SessionStore>,
        quota: &Arc<QuotaLedger>,
        runtime: &Arc<dyn ContainerRuntime>,
        running: &[StreamSession],
    ) {
        // Poll all units concurrently; each poll is independent and
        // long-latency, and no locks are held across the awaits.
        let checks = running.iter().filter_map(|session| {
            let unit_id = session.unit_id.clone()?;
            let runtime = Arc::clone(runtime);
            Some(async move {
                let status = runtime.status(&unit_id).await;
                (session, status)
            })
        });

        for (session, status) in futures::future::join_all(checks).await {
            let status = match status {
                Ok(status) => status,
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "unit status check failed");
                    continue;
                }
            };

            if !status.is_defunct() {
                continue;
            }

            warn!(
                session_id = %session.id,
                unit_status = status.as_str(),
                "unit died silently, marking session failed"
            );

            let outcome = store.transition(
                &session.id,
                &[SessionStatus::Running],
                TransitionUpdate::to(SessionStatus::Error)
                    .with_error(format!("execution unit {}", status.as_str()))
                    .with_stopped_at(Utc::now()),
            );

            match outcome {
                Ok(outcome) if outcome.applied() => {
                    quota.release(&session.user_id);
                }
                Ok(TransitionOutcome::Superseded { current }) => {
                    // An explicit stop raced this sweep and won; it owns the
                    // quota release.
                    debug!(session_id = %session.id, %current, "crash sweep superseded");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(session_id = %session.id, error = %e, "failed to persist crash");
                }
            }
        }
    }

    /// Time out sessions whose launch call was lost.
    fn sweep_stuck_launches(
        store: &Arc<dyn SessionStore>,
        quota: &Arc<QuotaLedger>,
        config: &OrchestratorConfig,
        starting: &[StreamSession],
        stopping: &[StreamSession],
    ) {
        let deadline = Utc::now() - chrono::Duration::seconds(config.launch_timeout_secs as i64);

        for session in starting {
            if session.unit_id.is_some() || session.created_at > deadline {
                continue;
            }

            warn!(session_id = %session.id, "launch timed out, marking session failed");

            let outcome = store.transition(
                &session.id,
                &[SessionStatus::Starting],
                TransitionUpdate::to(SessionStatus::Error)
                    .with_error("launch timed out".to_string())
                    .with_stopped_at(Utc::now()),
            );
            match outcome {
                Ok(outcome) if outcome.applied() => quota.release(&session.user_id),
                Ok(_) => {}
                Err(e) => error!(session_id = %session.id, error = %e, "failed to persist timeout"),
            }
        }

        // A stop that arrived while a (now lost) launch was in flight leaves
        // the session parked in `stopping` with no unit; age those out too
        // so the reservation cannot leak.
        for session in stopping {
            if session.unit_id.is_some() || session.updated_at > deadline {
                continue;
            }

            let outcome = store.transition(
                &session.id,
                &[SessionStatus::Stopping],
                TransitionUpdate::to(SessionStatus::Stopped).with_stopped_at(Utc::now()),
            );
            match outcome {
                Ok(outcome) if outcome.applied() => quota.release(&session.user_id),
                Ok(_) => {}
                Err(e) => error!(session_id = %session.id, error = %e, "failed to persist stop"),
            }
        }
    }

    /// Stop units matching the naming convention that no live session
    /// references (e.g. left behind by a crash between launch and persist).
    async fn sweep_orphan_units(
        runtime: &Arc<dyn ContainerRuntime>,
        config: &OrchestratorConfig,
        units: Vec<crate::runtime::UnitSummary>,
        starting: &[StreamSession],
        running: &[StreamSession],
        stopping: &[StreamSession],
    ) {
        // Expected names are derivable even for sessions whose launch has
        // not landed yet, so an in-flight unit is never mistaken for an
        // orphan.
        let referenced: HashSet<String> = starting
            .iter()
            .chain(running)
            .chain(stopping)
            .map(|s| unit_name(&config.unit_prefix, &s.user_id, &s.id))
            .collect();

        for unit in units {
            if referenced.contains(&unit.name) {
                continue;
            }

            warn!(unit = %unit.name, id = %unit.id, "stopping orphaned unit");
            match runtime.stop(&unit.id).await {
                Ok(()) | Err(RuntimeError::UnitNotFound(_)) => {}
                Err(e) => warn!(unit = %unit.name, error = %e, "failed to stop orphan"),
            }
        }
    }
}

/// Unit name under the orchestrator's naming convention:
/// `<prefix><user id[..8]>-<session id[..8]>`.
pub(crate) fn unit_name(prefix: &str, user_id: &str, session_id: &str) -> String {
    format!("{}{}-{}", prefix, short(user_id), short(session_id))
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
