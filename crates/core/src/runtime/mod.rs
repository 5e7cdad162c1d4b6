//! Execution backend abstraction.
//!
//! This module provides a [`ContainerRuntime`] trait for managing isolated
//! execution units across backends (Docker CLI today; anything with
//! launch/stop/status/list semantics fits).

mod docker;
mod types;

pub use docker::{DockerRuntime, RuntimeConfig};
pub use types::*;
