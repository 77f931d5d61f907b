use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use super::{ContentSource, RetrievalError, RetrievalResult};

/// In-memory content source.
///
/// Clones share the same files and request log, so a test can keep a handle
/// after passing the source to a loader.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: Arc<RwLock<FxHashMap<String, String>>>,
    latency: Arc<RwLock<FxHashMap<String, Duration>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_file(self, location: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(location, source);
        self
    }

    pub fn insert(&self, location: impl Into<String>, source: impl Into<String>) {
        self.files.write().insert(location.into(), source.into());
    }

    pub fn remove(&self, location: &str) {
        self.files.write().remove(location);
    }

    /// Delay every retrieval of `location` by `delay`.
    pub fn set_latency(&self, location: impl Into<String>, delay: Duration) {
        self.latency.write().insert(location.into(), delay);
    }

    /// Every location retrieved so far, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// How many times `location` was requested.
    pub fn request_count(&self, location: &str) -> usize {
        self.requests.lock().iter().filter(|r| *r == location).count()
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    async fn retrieve(&self, location: &str) -> RetrievalResult<String> {
        self.requests.lock().push(location.to_string());

        let delay = self.latency.read().get(location).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.files
            .read()
            .get(location)
            .cloned()
            .ok_or(RetrievalError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_source_roundtrip() {
        let source = MemorySource::new().with_file("/a.ts", "export const a = 1;");

        assert_eq!(source.retrieve("/a.ts").await.unwrap(), "export const a = 1;");
        assert_eq!(source.retrieve("/b.ts").await, Err(RetrievalError::NotFound));
        assert_eq!(source.requests(), vec!["/a.ts", "/b.ts"]);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let source = MemorySource::new();
        let handle = source.clone();

        handle.insert("/late.ts", "1");
        assert!(source.retrieve("/late.ts").await.is_ok());
        assert_eq!(handle.request_count("/late.ts"), 1);
    }
}
