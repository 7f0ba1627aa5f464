//! Façade traits for the peer services this daemon collaborates with but does not implement:
//! the library inventory store, the TV/movie managers that own metadata, and the streaming
//! server whose webhook drives the playback registry. Production deployments inject real
//! implementations; the defaults here keep the daemon fully functional standalone.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::classifier::MediaKind;

/// Best-effort notification that a file was placed at `target_path`. Errors are logged and
/// never propagate back into the transfer outcome.
#[async_trait]
pub trait PeerNotifier: Send + Sync {
    async fn notify_import(&self, media_kind: MediaKind, target_path: &str);
}

#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl PeerNotifier for LoggingNotifier {
    async fn notify_import(&self, media_kind: MediaKind, target_path: &str) {
        info!(?media_kind, target_path, "would notify peer services of import");
    }
}

/// Resolves which configured library root a classified episode should land under. May consult
/// a peer TV-manager service; the default implementation always returns the first candidate.
#[async_trait]
pub trait LibrarySelector: Send + Sync {
    async fn select_tv(&self, title: &str, year: Option<u32>, candidates: &[String]) -> Option<String>;
    async fn select_movie(&self, title: &str, year: Option<u32>, candidates: &[String]) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct FirstLibrarySelector;

#[async_trait]
impl LibrarySelector for FirstLibrarySelector {
    async fn select_tv(&self, _title: &str, _year: Option<u32>, candidates: &[String]) -> Option<String> {
        candidates.first().cloned()
    }

    async fn select_movie(&self, _title: &str, _year: Option<u32>, candidates: &[String]) -> Option<String> {
        candidates.first().cloned()
    }
}

/// Append-only façade over the relational inventory database. The core never reads this back;
/// it is a write sink consumed by collaborators out of this crate's scope.
#[async_trait]
pub trait InventoryFacade: Send + Sync {
    async fn record_file(&self, media_kind: MediaKind, title: &str, target_path: &str);
    async fn log_operation(&self, action: &str, detail: &str);
}

#[derive(Debug, Default)]
pub struct NullInventory;

#[async_trait]
impl InventoryFacade for NullInventory {
    async fn record_file(&self, _media_kind: MediaKind, _title: &str, _target_path: &str) {}

    async fn log_operation(&self, action: &str, detail: &str) {
        warn!(action, detail, "inventory facade is not configured; dropping record");
    }
}
