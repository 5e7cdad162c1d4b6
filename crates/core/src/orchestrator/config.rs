//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

use crate::runtime::ResourceLimits;

/// Configuration for the session orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Enable/disable the reconciliation sweeper.
    /// Create/stop/status keep working when disabled; drift is just never
    /// corrected automatically.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// How often the sweeper cross-checks persisted sessions against the
    /// execution backend (milliseconds).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,

    /// How long a session may sit in `starting` before the sweeper declares
    /// the launch lost (seconds).
    #[serde(default = "default_launch_timeout")]
    pub launch_timeout_secs: u64,

    /// Name prefix for execution units; also the sweeper's listing filter.
    #[serde(default = "default_unit_prefix")]
    pub unit_prefix: String,

    /// Shared isolation network every unit joins.
    #[serde(default = "default_network")]
    pub network: String,

    /// Host directory holding uploaded video files.
    #[serde(default = "default_videos_host_dir")]
    pub videos_host_dir: String,

    /// Where the videos directory is mounted inside a unit.
    #[serde(default = "default_videos_mount_point")]
    pub videos_mount_point: String,

    /// Resource limits applied to every unit.
    #[serde(default)]
    pub limits: ResourceLimits,
}

fn default_enabled() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    15_000
}

fn default_launch_timeout() -> u64 {
    60
}

fn default_unit_prefix() -> String {
    "streamax-".to_string()
}

fn default_network() -> String {
    "streamax_net".to_string()
}

fn default_videos_host_dir() -> String {
    "/tmp/streamax/videos".to_string()
}

fn default_videos_mount_point() -> String {
    "/videos".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            sweep_interval_ms: default_sweep_interval(),
            launch_timeout_secs: default_launch_timeout(),
            unit_prefix: default_unit_prefix(),
            network: default_network(),
            videos_host_dir: default_videos_host_dir(),
            videos_mount_point: default_videos_mount_point(),
            limits: ResourceLimits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert!(config.enabled);
        assert_eq!(config.sweep_interval_ms, 15_000);
        assert_eq!(config.launch_timeout_secs, 60);
        assert_eq!(config.unit_prefix, "streamax-");
        assert_eq!(config.network, "streamax_net");
        assert_eq!(config.limits.memory, "1g");
    }

    #[test]
    fn test_deserialize_minimal() {
        let toml = r#"
            enabled = false
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.sweep_interval_ms, 15_000);
        assert_eq!(config.videos_mount_point, "/videos");
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            enabled = true
            sweep_interval_ms = 5000
            launch_timeout_secs = 120
            unit_prefix = "sx-"
            network = "sx_net"
            videos_host_dir = "/srv/videos"
            videos_mount_point = "/media"

            [limits]
            memory = "2g"
            cpus = "0.5"
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.sweep_interval_ms, 5000);
        assert_eq!(config.launch_timeout_secs, 120);
        assert_eq!(config.unit_prefix, "sx-");
        assert_eq!(config.limits.memory, "2g");
        assert_eq!(config.limits.cpus, "0.5");
    }
}
