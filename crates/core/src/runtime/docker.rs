//! Docker CLI execution backend.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::types::{
    ContainerRuntime, LaunchSpec, RuntimeError, UnitStatus, UnitSummary,
};

/// Configuration for the Docker backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Runtime binary to invoke.
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Image every unit runs.
    #[serde(default = "default_image")]
    pub image: String,
}

fn default_binary() -> String {
    "docker".to_string()
}

fn default_image() -> String {
    "jrottenberg/ffmpeg:4.4-alpine".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            image: default_image(),
        }
    }
}

/// Execution backend driving the `docker` CLI with structured argv.
pub struct DockerRuntime {
    config: RuntimeConfig,
    network_ready: AtomicBool,
}

impl DockerRuntime {
    /// Create a new Docker backend.
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            network_ready: AtomicBool::new(false),
        }
    }

    /// Run the docker binary with `args`, capturing output.
    async fn run(&self, args: &[&str]) -> Result<std::process::Output, RuntimeError> {
        debug!(binary = %self.config.binary, ?args, "invoking runtime");

        Command::new(&self.config.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RuntimeError::BinaryNotFound(self.config.binary.clone())
                } else {
                    RuntimeError::Io(e)
                }
            })
    }

    /// Create the shared isolation network if it does not exist yet.
    ///
    /// Units on the network can reach the outside but not each other by
    /// default; lifecycle is create-once, reuse-forever.
    async fn ensure_network(&self, network: &str) -> Result<(), RuntimeError> {
        if self.network_ready.load(Ordering::Relaxed) {
            return Ok(());
        }

        let inspect = self.run(&["network", "inspect", network]).await?;
        if !inspect.status.success() {
            info!(network, "creating isolation network");
            let create = self.run(&["network", "create", network]).await?;
            if !create.status.success() {
                let stderr = String::from_utf8_lossy(&create.stderr);
                // A concurrent launch may have created it in between.
                if !stderr.contains("already exists") {
                    return Err(RuntimeError::CommandFailed(format!(
                        "network create failed: {}",
                        stderr.trim()
                    )));
                }
            }
        }

        self.network_ready.store(true, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<String, RuntimeError> {
        self.ensure_network(&spec.network).await?;

        let memory = format!("--memory={}", spec.limits.memory);
        let cpus = format!("--cpus={}", spec.limits.cpus);

        let mut args: Vec<String> = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            spec.name.clone(),
            "--rm".to_string(),
            memory,
            cpus,
            "--network".to_string(),
            spec.network.clone(),
        ];

        for mount in &spec.mounts {
            args.push("-v".to_string());
            args.push(format!("{}:{}:ro", mount.host_dir, mount.mount_point));
        }

        args.push(self.config.image.clone());
        args.extend(spec.command.iter().cloned());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run(&arg_refs).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::LaunchFailed(stderr.trim().to_string()));
        }

        let unit_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if unit_id.is_empty() {
            return Err(RuntimeError::LaunchFailed(
                "runtime returned no unit id".to_string(),
            ));
        }

        info!(unit = %spec.name, id = %unit_id, "launched execution unit");
        Ok(unit_id)
    }

    async fn stop(&self, unit_id: &str) -> Result<(), RuntimeError> {
        // Graceful stop first; removal is forced regardless so a unit that
        // ignores the stop signal still goes away.
        let stop = self.run(&["stop", unit_id]).await?;
        let stop_stderr = String::from_utf8_lossy(&stop.stderr).to_string();
        if !stop.status.success() {
            warn!(unit_id, error = %stop_stderr.trim(), "stop reported failure, forcing removal");
        }

        let rm = self.run(&["rm", "-f", unit_id]).await?;
        let rm_stderr = String::from_utf8_lossy(&rm.stderr).to_string();

        if stop.status.success() || rm.status.success() {
            debug!(unit_id, "stopped and removed execution unit");
            return Ok(());
        }

        if is_missing_unit(&stop_stderr) || is_missing_unit(&rm_stderr) {
            return Err(RuntimeError::UnitNotFound(unit_id.to_string()));
        }

        Err(RuntimeError::CommandFailed(format!(
            "stop failed: {}",
            rm_stderr.trim()
        )))
    }

    async fn status(&self, unit_id: &str) -> Result<UnitStatus, RuntimeError> {
        let output = self
            .run(&["inspect", "--format", "{{.State.Status}}", unit_id])
            .await?;

        if !output.status.success() {
            // Inspect failing is how the runtime says "no such unit".
            return Ok(UnitStatus::NotFound);
        }

        let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(parse_unit_status(&raw))
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<UnitSummary>, RuntimeError> {
        let filter = format!("name={}", prefix);
        let output = self
            .run(&[
                "ps",
                "-a",
                "--filter",
                &filter,
                "--format",
                "{{.ID}}\t{{.Names}}\t{{.Status}}",
            ])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::CommandFailed(format!(
                "list failed: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_unit_listing(&stdout))
    }
}

/// Map the runtime's status text onto the unit lifecycle.
fn parse_unit_status(raw: &str) -> UnitStatus {
    match raw {
        "created" => UnitStatus::Created,
        "running" | "restarting" | "paused" => UnitStatus::Running,
        "exited" | "removing" => UnitStatus::Exited,
        "dead" => UnitStatus::Dead,
        other => {
            debug!(status = other, "unrecognized unit status");
            UnitStatus::Created
        }
    }
}

/// Parse `docker ps` tab-separated listing output.
fn parse_unit_listing(stdout: &str) -> Vec<UnitSummary> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            Some(UnitSummary {
                id: parts.next()?.to_string(),
                name: parts.next()?.to_string(),
                status: parts.next().unwrap_or("").to_string(),
            })
        })
        .collect()
}

fn is_missing_unit(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such container") || lower.contains("not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unit_status_mapping() {
        assert_eq!(parse_unit_status("created"), UnitStatus::Created);
        assert_eq!(parse_unit_status("running"), UnitStatus::Running);
        assert_eq!(parse_unit_status("restarting"), UnitStatus::Running);
        assert_eq!(parse_unit_status("exited"), UnitStatus::Exited);
        assert_eq!(parse_unit_status("dead"), UnitStatus::Dead);
        assert_eq!(parse_unit_status("whatever"), UnitStatus::Created);
    }

    #[test]
    fn test_parse_unit_listing() {
        let stdout = "abc123\tstreamax-u1-s1\tUp 2 hours\ndef456\tstreamax-u2-s2\tExited (1) 5 minutes ago\n";
        let units = parse_unit_listing(stdout);

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].id, "abc123");
        assert_eq!(units[0].name, "streamax-u1-s1");
        assert_eq!(units[0].status, "Up 2 hours");
        assert_eq!(units[1].name, "streamax-u2-s2");
    }

    #[test]
    fn test_parse_unit_listing_empty() {
        assert!(parse_unit_listing("").is_empty());
        assert!(parse_unit_listing("\n\n").is_empty());
    }

    #[test]
    fn test_missing_unit_detection() {
        assert!(is_missing_unit("Error: No such container: abc123"));
        assert!(is_missing_unit("error response: not found"));
        assert!(!is_missing_unit("permission denied"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_distinct_error() {
        let runtime = DockerRuntime::new(RuntimeConfig {
            binary: "/nonexistent/docker-test-binary".to_string(),
            ..Default::default()
        });

        let err = runtime.status("abc").await.unwrap_err();
        assert!(matches!(err, RuntimeError::BinaryNotFound(_)));
    }
}
