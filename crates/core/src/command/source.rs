//! Video source descriptors.

use serde::{Deserialize, Serialize};

/// Where the video data for a session comes from.
///
/// Immutable once a session is accepted; the kind decides how the launch
/// command addresses the input and whether a resolution step runs first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VideoSource {
    /// An uploaded file on the host, mounted read-only into the unit.
    LocalFile { path: String },

    /// A direct media URL ffmpeg can read as-is.
    HostedUrl { url: String },

    /// A video page URL that must be resolved to a direct media URL
    /// before the encode pipeline can consume it.
    WebPage { url: String },
}

impl VideoSource {
    /// Create a local-file source.
    pub fn local_file(path: impl Into<String>) -> Self {
        Self::LocalFile { path: path.into() }
    }

    /// Create a hosted-URL source.
    pub fn hosted_url(url: impl Into<String>) -> Self {
        Self::HostedUrl { url: url.into() }
    }

    /// Create a web-page source.
    pub fn web_page(url: impl Into<String>) -> Self {
        Self::WebPage { url: url.into() }
    }

    /// The kind tag as stored/serialized.
    pub fn kind(&self) -> &'static str {
        match self {
            VideoSource::LocalFile { .. } => "local_file",
            VideoSource::HostedUrl { .. } => "hosted_url",
            VideoSource::WebPage { .. } => "web_page",
        }
    }

    /// The raw path or URL carried by this source.
    pub fn value(&self) -> &str {
        match self {
            VideoSource::LocalFile { path } => path,
            VideoSource::HostedUrl { url } => url,
            VideoSource::WebPage { url } => url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings() {
        assert_eq!(VideoSource::local_file("/tmp/a.mp4").kind(), "local_file");
        assert_eq!(
            VideoSource::hosted_url("https://cdn.example/a.mp4").kind(),
            "hosted_url"
        );
        assert_eq!(
            VideoSource::web_page("https://videos.example/watch?v=1").kind(),
            "web_page"
        );
    }

    #[test]
    fn test_serialization_round_trip() {
        let source = VideoSource::local_file("clip.mp4");
        let json = serde_json::to_string(&source).unwrap();
        assert_eq!(json, r#"{"kind":"local_file","path":"clip.mp4"}"#);

        let parsed: VideoSource = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, source);
    }

    #[test]
    fn test_value_extraction() {
        let source = VideoSource::web_page("https://videos.example/watch?v=1");
        assert_eq!(source.value(), "https://videos.example/watch?v=1");
    }
}
