//! Web-page source resolution.
//!
//! Web-page sources carry a watch-page URL, not a media URL. A resolver
//! turns the page into something ffmpeg can open directly, bounded to a
//! maximum height so transcoding cost stays predictable.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Resolution failures, surfaced to users distinctly from launch/encode
/// failures.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The resolver binary is not installed or not executable.
    #[error("resolver binary not found: {0}")]
    BinaryNotFound(String),

    /// The resolver ran but could not produce a media URL.
    #[error("source resolution failed: {0}")]
    Failed(String),

    /// The resolver did not finish within the configured timeout.
    #[error("source resolution timed out after {0}s")]
    Timeout(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves a video page URL into a direct media URL.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Resolve `page_url` to a directly-readable media URL.
    async fn resolve(&self, page_url: &str) -> Result<String, ResolveError>;
}

/// Configuration for the yt-dlp resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Resolver binary to invoke.
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Maximum video height selected from the page's available formats.
    #[serde(default = "default_max_height")]
    pub max_height: u32,

    /// Resolution timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_binary() -> String {
    "yt-dlp".to_string()
}

fn default_max_height() -> u32 {
    720
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            max_height: default_max_height(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// yt-dlp-backed resolver: `yt-dlp -f "best[height<=N]" -g <url>` prints the
/// direct media URL on stdout.
pub struct YtDlpResolver {
    config: ResolverConfig,
}

impl YtDlpResolver {
    /// Create a resolver with the given configuration.
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    fn format_selector(&self) -> String {
        format!("best[height<={}]", self.config.max_height)
    }
}

#[async_trait]
impl SourceResolver for YtDlpResolver {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn resolve(&self, page_url: &str) -> Result<String, ResolveError> {
        debug!(url = page_url, "resolving web page source");

        let selector = self.format_selector();
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(["-f", selector.as_str(), "-g", page_url])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = timeout(Duration::from_secs(self.config.timeout_secs), cmd.output())
            .await
            .map_err(|_| ResolveError::Timeout(self.config.timeout_secs))?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ResolveError::BinaryNotFound(self.config.binary.clone())
                } else {
                    ResolveError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::Failed(
                stderr.lines().last().unwrap_or("unknown error").to_string(),
            ));
        }

        // yt-dlp may print one URL per stream; the first line is the muxed
        // best-format URL under our selector.
        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.lines().next().map(str::trim).filter(|l| !l.is_empty()) {
            Some(url) => Ok(url.to_string()),
            None => Err(ResolveError::Failed("resolver produced no URL".to_string())),
        }
    }
}
