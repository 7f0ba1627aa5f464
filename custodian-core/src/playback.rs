//! Playback lock registry and its paired deferred-operation queue. Both structures are guarded
//! by a single reader-writer lock, matching the `Arc<RwLock<HashMap<...>>>` shape the ingest
//! pipeline's debounce/watch machinery already uses elsewhere in this crate.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

fn normalize(path: &str) -> String {
    path.trim().to_string()
}

#[derive(Debug, Clone)]
pub struct PlaybackInfo {
    pub user: String,
    pub device: String,
    pub client: String,
    pub item_id: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredOpKind {
    Move,
    Copy,
}

#[derive(Debug, Clone)]
pub struct DeferredOperation {
    pub kind: DeferredOpKind,
    pub source: String,
    pub target: String,
    pub reason: String,
    pub deferred_at: DateTime<Utc>,
    pub retry_count: u32,
}

#[derive(Default)]
struct Inner {
    locks: HashMap<String, PlaybackInfo>,
    queue: HashMap<String, VecDeque<DeferredOperation>>,
}

/// Tracks which paths are currently being streamed and holds deferred ingest operations against
/// locked paths until they are released.
#[derive(Clone)]
pub struct PlaybackRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl Default for PlaybackRegistry {
    fn default() -> Self {
        PlaybackRegistry { inner: Arc::new(RwLock::new(Inner::default())) }
    }
}

impl PlaybackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, path: &str, info: PlaybackInfo) {
        let path = normalize(path);
        if path.is_empty() {
            return;
        }
        self.inner.write().await.locks.insert(path, info);
    }

    pub async fn unlock(&self, path: &str) {
        let path = normalize(path);
        self.inner.write().await.locks.remove(&path);
    }

    pub async fn is_locked(&self, path: &str) -> Option<PlaybackInfo> {
        let path = normalize(path);
        self.inner.read().await.locks.get(&path).cloned()
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.locks.len()
    }

    pub async fn snapshot(&self) -> HashMap<String, PlaybackInfo> {
        self.inner.read().await.locks.clone()
    }

    /// Enqueue a deferred operation against a locked path, preserving FIFO order per path.
    pub async fn defer(&self, path: &str, op: DeferredOperation) {
        let path = normalize(path);
        self.inner.write().await.queue.entry(path).or_default().push_back(op);
    }

    /// Drain and return every deferred operation queued for a path, in FIFO order.
    pub async fn take_deferred(&self, path: &str) -> Vec<DeferredOperation> {
        let path = normalize(path);
        self.inner
            .write()
            .await
            .queue
            .remove(&path)
            .map(|q| q.into_iter().collect())
            .unwrap_or_default()
    }

    pub async fn deferred_count(&self) -> usize {
        self.inner.read().await.queue.values().map(|q| q.len()).sum()
    }
}

impl PlaybackInfo {
    pub fn now(user: String, device: String, client: String, item_id: String) -> Self {
        PlaybackInfo { user, device, client, item_id, started_at: Utc::now() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_and_unlock_round_trips() {
        let registry = PlaybackRegistry::new();
        registry
            .lock("/media/show.mkv", PlaybackInfo::now("u".into(), "d".into(), "c".into(), "1".into()))
            .await;
        assert!(registry.is_locked("/media/show.mkv").await.is_some());
        assert_eq!(registry.count().await, 1);

        registry.unlock("/media/show.mkv").await;
        assert!(registry.is_locked("/media/show.mkv").await.is_none());
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn deferred_ops_preserve_fifo_order() {
        let registry = PlaybackRegistry::new();
        for i in 0..3 {
            registry
                .defer(
                    "/media/show.mkv",
                    DeferredOperation {
                        kind: DeferredOpKind::Move,
                        source: format!("/downloads/{i}.mkv"),
                        target: "/media/show.mkv".into(),
                        reason: "locked".into(),
                        deferred_at: Utc::now(),
                        retry_count: 0,
                    },
                )
                .await;
        }

        let drained = registry.take_deferred("/media/show.mkv").await;
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].source, "/downloads/0.mkv");
        assert_eq!(drained[2].source, "/downloads/2.mkv");
        assert!(registry.take_deferred("/media/show.mkv").await.is_empty());
    }

    #[tokio::test]
    async fn empty_path_is_ignored() {
        let registry = PlaybackRegistry::new();
        registry.lock("   ", PlaybackInfo::now("u".into(), "d".into(), "c".into(), "1".into())).await;
        assert_eq!(registry.count().await, 0);
    }
}
