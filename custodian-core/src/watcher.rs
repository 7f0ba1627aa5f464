//! Filesystem watcher: subscribes to create/write/rename/delete events beneath a set of roots
//! and surfaces a normalized event stream. Ported from the notify-based watch loop used
//! elsewhere in this codebase for library scanning, trimmed to the create/modify/rename/delete
//! normalization this daemon needs (no debounce here — that is `debounce::DebounceCoordinator`'s
//! job, layered on top of this stream by the orchestrator wiring).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Create,
    Write,
    Rename,
    Delete,
}

#[derive(Debug, Clone)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

fn classify_event(kind: &EventKind) -> Option<FsEventKind> {
    match kind {
        EventKind::Create(_) => Some(FsEventKind::Create),
        EventKind::Modify(notify::event::ModifyKind::Data(_)) => Some(FsEventKind::Write),
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => Some(FsEventKind::Rename),
        EventKind::Remove(_) => Some(FsEventKind::Delete),
        _ => None,
    }
}

fn extract_paths(event: &Event) -> Vec<PathBuf> {
    event.paths.clone()
}

/// Holds one live `RecommendedWatcher` per configured root. Dropping the watcher stops the
/// underlying OS-level subscription.
pub struct FsWatcherHandle {
    _watchers: Vec<RecommendedWatcher>,
    pub events: mpsc::Receiver<FsEvent>,
}

/// Subscribe to every root in `roots`, recursively. Event delivery failures for one subtree are
/// logged and do not prevent other subtrees from being watched.
pub fn watch_roots(roots: &[PathBuf]) -> Result<FsWatcherHandle, notify::Error> {
    let (tx, rx) = mpsc::channel(1024);
    let mut watchers = Vec::with_capacity(roots.len());

    for root in roots {
        match spawn_watcher(root, tx.clone()) {
            Ok(watcher) => watchers.push(watcher),
            Err(err) => warn!(root = %root.display(), error = %err, "failed to watch root"),
        }
    }

    if watchers.is_empty() && !roots.is_empty() {
        return Err(notify::Error::generic("no watch root could be subscribed to"));
    }

    Ok(FsWatcherHandle { _watchers: watchers, events: rx })
}

fn spawn_watcher(root: &Path, tx: mpsc::Sender<FsEvent>) -> Result<RecommendedWatcher, notify::Error> {
    let root = root.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let Some(kind) = classify_event(&event.kind) else { return };
            for path in extract_paths(&event) {
                let _ = tx.blocking_send(FsEvent { kind, path });
            }
        }
        Err(err) => warn!(error = %err, "filesystem watch error"),
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

/// Longest-prefix match of `path` against the configured watch roots, returning the root.
pub fn locate_root<'a>(path: &Path, roots: &'a [PathBuf]) -> Option<&'a PathBuf> {
    roots
        .iter()
        .filter(|root| path.starts_with(root))
        .max_by_key(|root| root.as_os_str().len())
}

pub async fn run_forever(mut handle: FsWatcherHandle, on_event: Arc<dyn Fn(FsEvent) + Send + Sync>) {
    while let Some(event) = handle.events.recv().await {
        if event.kind == FsEventKind::Delete {
            continue;
        }
        on_event(event);
    }
}
