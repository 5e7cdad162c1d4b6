use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::command::ResolverConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::runtime::RuntimeConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("streamax.db")
}

/// Quota configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuotaConfig {
    /// Ceiling for users with no persisted quota (i.e. no activated
    /// package yet).
    #[serde(default = "default_streams_allowed")]
    pub default_streams_allowed: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_streams_allowed: default_streams_allowed(),
        }
    }
}

fn default_streams_allowed() -> u32 {
    1
}

/// Upload handling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_size_bytes: u64,

    /// Accepted content types.
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_upload_bytes(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_max_upload_bytes() -> u64 {
    2 * 1024 * 1024 * 1024 // 2 GiB
}

fn default_allowed_types() -> Vec<String> {
    [
        "video/mp4",
        "video/avi",
        "video/mov",
        "video/mkv",
        "video/webm",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Sanitized config for API responses
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub runtime_image: String,
    pub network: String,
    pub sweep_interval_ms: u64,
    pub launch_timeout_secs: u64,
    pub default_streams_allowed: u32,
    pub upload_max_size_bytes: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            runtime_image: config.runtime.image.clone(),
            network: config.orchestrator.network.clone(),
            sweep_interval_ms: config.orchestrator.sweep_interval_ms,
            launch_timeout_secs: config.orchestrator.launch_timeout_secs,
            default_streams_allowed: config.quota.default_streams_allowed,
            upload_max_size_bytes: config.uploads.max_size_bytes,
        }
    }
}
