//! Per-path timer coalescing. Downloaders write files in many small chunks; processing a path
//! the instant its first event arrives would pick up a partial file. Each new event for a path
//! resets that path's timer rather than scheduling a second one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(10);

/// Coalesces repeated filesystem events for the same path into a single trigger, fired once the
/// path has been quiet for `debounce_window`.
pub struct DebounceCoordinator<F> {
    pending: Arc<Mutex<HashMap<PathBuf, JoinHandle<()>>>>,
    debounce_window: Duration,
    on_fire: Arc<F>,
}

impl<F> DebounceCoordinator<F>
where
    F: Fn(PathBuf) -> futures::future::BoxFuture<'static, ()> + Send + Sync + 'static,
{
    pub fn new(on_fire: F) -> Self {
        DebounceCoordinator {
            pending: Arc::new(Mutex::new(HashMap::new())),
            debounce_window: DEFAULT_DEBOUNCE,
            on_fire: Arc::new(on_fire),
        }
    }

    pub fn with_window(on_fire: F, debounce_window: Duration) -> Self {
        DebounceCoordinator { pending: Arc::new(Mutex::new(HashMap::new())), debounce_window, on_fire }
    }

    /// Register a filesystem event for `path`, cancelling and replacing any existing timer.
    pub async fn notify(&self, path: PathBuf) {
        let mut pending = self.pending.lock().await;
        if let Some(existing) = pending.remove(&path) {
            existing.abort();
        }

        let fire_path = path.clone();
        let window = self.debounce_window;
        let pending_handle = self.pending.clone();
        let on_fire = self.on_fire.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            pending_handle.lock().await.remove(&fire_path);
            debug!(path = %fire_path.display(), "debounce window elapsed, firing");
            (on_fire)(fire_path).await;
        });

        pending.insert(path, handle);
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Cancel every pending timer without waiting for in-flight fires to complete.
    pub async fn shutdown(&self) {
        let mut pending = self.pending.lock().await;
        for (_, handle) in pending.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn coalesces_rapid_events_into_one_fire() {
        let fire_count = Arc::new(AtomicUsize::new(0));
        let counted = fire_count.clone();
        let coordinator = DebounceCoordinator::with_window(
            move |_path| {
                let counted = counted.clone();
                Box::pin(async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                })
            },
            Duration::from_millis(30),
        );

        let path = PathBuf::from("/downloads/show.mkv");
        for _ in 0..5 {
            coordinator.notify(path.clone()).await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fire_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn at_most_one_pending_timer_per_path() {
        let coordinator = DebounceCoordinator::with_window(
            |_path| Box::pin(async {}),
            Duration::from_millis(50),
        );
        let path = PathBuf::from("/downloads/a.mkv");
        coordinator.notify(path.clone()).await;
        coordinator.notify(path.clone()).await;
        assert_eq!(coordinator.pending_count().await, 1);
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_timers() {
        let fire_count = Arc::new(AtomicUsize::new(0));
        let counted = fire_count.clone();
        let coordinator = DebounceCoordinator::with_window(
            move |_path| {
                let counted = counted.clone();
                Box::pin(async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                })
            },
            Duration::from_millis(30),
        );
        coordinator.notify(PathBuf::from("/downloads/a.mkv")).await;
        coordinator.shutdown().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fire_count.load(Ordering::SeqCst), 0);
    }
}
