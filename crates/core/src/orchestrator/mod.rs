//! Stream session orchestrator.
//!
//! Drives sessions through the state machine:
//! - **Create**: validate -> reserve quota -> persist -> resolve/launch
//! - **Stop**: idempotent teardown, tolerant of already-gone units
//! - **Sweep**: periodic reconciliation of persisted state against the
//!   execution backend (the backend has no push notification of process
//!   death, so polling is the only way to catch silent failures)

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::SessionOrchestrator;
pub use types::{OrchestratorError, OrchestratorStatus, StatusReport};
