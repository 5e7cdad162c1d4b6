//! Mock source resolver for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::command::{ResolveError, SourceResolver};

/// Mock implementation of the SourceResolver trait.
///
/// Unmapped pages resolve to a default media URL; individual pages can be
/// mapped to a specific URL or to a failure.
#[derive(Debug)]
pub struct MockResolver {
    /// Per-page outcome: Some(url) resolves, None fails.
    outcomes: Arc<RwLock<HashMap<String, Option<String>>>>,
    /// Recorded resolve calls.
    calls: Arc<RwLock<Vec<String>>>,
    /// Media URL returned for unmapped pages.
    default_media_url: String,
}

impl Default for MockResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockResolver {
    /// Create a new mock resolver.
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            default_media_url: "https://media.example/resolved.mp4".to_string(),
        }
    }

    /// Map `page_url` to a specific media URL.
    pub async fn set_resolution(&self, page_url: &str, media_url: &str) {
        self.outcomes
            .write()
            .await
            .insert(page_url.to_string(), Some(media_url.to_string()));
    }

    /// Make resolution of `page_url` fail.
    pub async fn set_failure(&self, page_url: &str) {
        self.outcomes
            .write()
            .await
            .insert(page_url.to_string(), None);
    }

    /// Pages that were resolved, in call order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }

    /// Number of resolve calls made.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }
}

#[async_trait]
impl SourceResolver for MockResolver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn resolve(&self, page_url: &str) -> Result<String, ResolveError> {
        self.calls.write().await.push(page_url.to_string());

        match self.outcomes.read().await.get(page_url) {
            Some(Some(media_url)) => Ok(media_url.clone()),
            Some(None) => Err(ResolveError::Failed(format!(
                "no playable format found for {}",
                page_url
            ))),
            None => Ok(self.default_media_url.clone()),
        }
    }
}
