//! Validation and ffmpeg argument assembly.
//!
//! The encode profile is fixed policy: every session re-encodes to the same
//! bitrate-capped H.264/AAC flv stream so that resource usage per concurrent
//! unit stays predictable. None of the numbers here are user input.

use std::path::Path;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use thiserror::Error;

use super::source::VideoSource;

/// Video bitrate ceiling passed to `-maxrate`.
pub const VIDEO_MAXRATE: &str = "3000k";
/// Rate-control buffer passed to `-bufsize` (2x maxrate).
pub const VIDEO_BUFSIZE: &str = "6000k";
/// Keyframe interval passed to `-g`.
pub const GOP_SIZE: &str = "50";
/// Audio bitrate passed to `-b:a`.
pub const AUDIO_BITRATE: &str = "160k";
/// Audio channel count passed to `-ac`.
pub const AUDIO_CHANNELS: &str = "2";
/// Audio sample rate passed to `-ar`.
pub const AUDIO_SAMPLE_RATE: &str = "44100";

/// RTMP destination URLs must carry an rtmp/rtmps scheme and a host.
static RTMP_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^rtmps?://[^\s/]+/\S+$").expect("rtmp url regex is valid"));

/// HTTP(S) URLs for hosted and web-page sources.
static HTTP_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/]+\S*$").expect("http url regex is valid"));

/// Errors detected before any resource is reserved or launched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// RTMP URL is missing, malformed, or not rtmp/rtmps.
    #[error("invalid rtmp url: {0}")]
    InvalidRtmpUrl(String),

    /// The source carries an empty path/URL.
    #[error("empty video source")]
    EmptySource,

    /// Hosted sources must be http(s) URLs.
    #[error("invalid source url: {0}")]
    InvalidSourceUrl(String),

    /// Local paths must not escape the videos directory.
    #[error("invalid source path: {0}")]
    InvalidSourcePath(String),
}

/// Validate a session request before anything is persisted or reserved.
///
/// Purely syntactic: no filesystem or network access, so it is safe to call
/// on every inbound request.
pub fn validate_request(source: &VideoSource, rtmp_url: &str) -> Result<(), CommandError> {
    if !RTMP_URL_RE.is_match(rtmp_url) {
        return Err(CommandError::InvalidRtmpUrl(rtmp_url.to_string()));
    }

    if source.value().trim().is_empty() {
        return Err(CommandError::EmptySource);
    }

    match source {
        VideoSource::LocalFile { path } => {
            // The file name is remapped under the container mount point;
            // reject traversal components outright.
            if path.split(['/', '\\']).any(|part| part == "..") {
                return Err(CommandError::InvalidSourcePath(path.clone()));
            }
            if Path::new(path).file_name().is_none() {
                return Err(CommandError::InvalidSourcePath(path.clone()));
            }
        }
        VideoSource::HostedUrl { url } => {
            // ffmpeg reads hosted sources directly; only http(s) is served.
            if !HTTP_URL_RE.is_match(url) {
                return Err(CommandError::InvalidSourceUrl(url.clone()));
            }
        }
        // Web pages are judged by the resolver: an unresolvable page
        // surfaces as a resolution failure, not a validation error.
        VideoSource::WebPage { .. } => {}
    }

    Ok(())
}

/// Map a local-file source onto its container-side path.
///
/// Only the file name is kept; the host directory is mounted read-only at
/// `mount_point`, so host path layout never leaks into the unit.
pub fn container_input(path: &str, mount_point: &str) -> String {
    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    format!("{}/{}", mount_point.trim_end_matches('/'), file_name)
}

/// Build the ffmpeg argv for one session.
///
/// `input` is a resolved, directly-readable path or URL: local sources must
/// already be remapped with [`container_input`], web pages must already be
/// resolved to a media URL. The input loops indefinitely so a short clip
/// becomes a continuous stream.
pub fn build_stream_args(input: &str, rtmp_url: &str) -> Vec<String> {
    let args = [
        "ffmpeg",
        "-re",
        "-stream_loop",
        "-1",
        "-i",
        input,
        "-c:v",
        "libx264",
        "-preset",
        "veryfast",
        "-maxrate",
        VIDEO_MAXRATE,
        "-bufsize",
        VIDEO_BUFSIZE,
        "-pix_fmt",
        "yuv420p",
        "-g",
        GOP_SIZE,
        "-c:a",
        "aac",
        "-b:a",
        AUDIO_BITRATE,
        "-ac",
        AUDIO_CHANNELS,
        "-ar",
        AUDIO_SAMPLE_RATE,
        "-f",
        "flv",
        rtmp_url,
    ];
    args.iter().map(|s| s.to_string()).collect()
}
