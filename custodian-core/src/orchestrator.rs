//! The ingest pipeline itself: consumes a single filesystem path, classifies it, resolves a
//! library destination, gates and transfers it, and fans out post-commit notifications. Every
//! other component in this crate exists to be composed here. Grounded on the per-item isolation
//! pattern in the teacher's folder monitor (`ferrex-core/src/scanner/folder_monitor.rs`), which
//! logs and continues past a single item's failure rather than aborting a whole scan cycle.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::activity::{ActivityEntry, ActivityLog, MediaKindLabel};
use crate::classifier::{self, ClassifiedFile, MediaKind, ParseMethod, QualityDescriptor, SourceHint};
use crate::health::HealthGate;
use crate::peers::{InventoryFacade, LibrarySelector, PeerNotifier};
use crate::playback::{DeferredOpKind, DeferredOperation, PlaybackRegistry};
use crate::stats::Stats;
use crate::transfer::{TransferEngine, TransferOperation, TransferOptions};

/// Static routing and transfer policy the orchestrator was constructed with. Distinct from
/// [`TransferOptions`], which governs a single attempt; this is the daemon-wide configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub watch_tv: Vec<PathBuf>,
    pub watch_movies: Vec<PathBuf>,
    pub libraries_tv: Vec<PathBuf>,
    pub libraries_movies: Vec<PathBuf>,
    pub dry_run: bool,
    pub keep_source: bool,
    pub force_overwrite: bool,
    pub health_timeout: Duration,
    pub transfer: TransferOptions,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            watch_tv: Vec::new(),
            watch_movies: Vec::new(),
            libraries_tv: Vec::new(),
            libraries_movies: Vec::new(),
            dry_run: false,
            keep_source: false,
            force_overwrite: false,
            health_timeout: Duration::from_secs(5),
            transfer: TransferOptions::default(),
        }
    }
}

/// The terminal state `process` reached for a path, returned mainly for tests and the sweeper's
/// bookkeeping; production callers care about the side effects (activity log, notifications).
#[derive(Debug)]
pub enum ProcessOutcome {
    DryRun,
    Rejected(String),
    LockedSource,
    Deferred,
    NoLibraryConfigured,
    HealthGateFailed(String),
    QualitySkipped(String),
    Transferred { bytes_copied: u64 },
    TransferFailed(String),
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    health_gate: HealthGate,
    playback: PlaybackRegistry,
    transfer_engine: TransferEngine,
    activity: ActivityLog,
    stats: Arc<Stats>,
    notifier: Arc<dyn PeerNotifier>,
    tv_selector: Arc<dyn LibrarySelector>,
    inventory: Arc<dyn InventoryFacade>,
    healthy: AtomicBool,
    in_flight: AtomicUsize,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        health_gate: HealthGate,
        playback: PlaybackRegistry,
        transfer_engine: TransferEngine,
        activity: ActivityLog,
        stats: Arc<Stats>,
        notifier: Arc<dyn PeerNotifier>,
        tv_selector: Arc<dyn LibrarySelector>,
        inventory: Arc<dyn InventoryFacade>,
    ) -> Self {
        Orchestrator {
            config,
            health_gate,
            playback,
            transfer_engine,
            activity,
            stats,
            notifier,
            tv_selector,
            inventory,
            healthy: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Number of `process` calls currently in flight. Used by shutdown to give in-flight
    /// transfers a bounded grace period before the process is forced to exit.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Polls [`Orchestrator::in_flight_count`] until it reaches zero or `grace_period` elapses,
    /// whichever comes first. Matches the spec's "bounded grace period before forced exit" —
    /// in-flight transfers are not interrupted mid-stream, but shutdown does not wait forever.
    pub async fn drain(&self, grace_period: Duration) {
        let deadline = Instant::now() + grace_period;
        while self.in_flight_count() > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if self.in_flight_count() > 0 {
            warn!(remaining = self.in_flight_count(), "shutdown grace period elapsed with transfers still in flight");
        }
    }

    pub async fn process(&self, path: PathBuf) -> ProcessOutcome {
        let _guard = InFlightGuard::new(&self.in_flight);
        let t0 = Instant::now();
        info!(path = %path.display(), "processing ingest candidate");

        if self.config.dry_run {
            info!(path = %path.display(), "dry-run: would process");
            return ProcessOutcome::DryRun;
        }

        let hint = self.source_hint(&path);

        let classified = match classifier::classify(&path, hint) {
            Ok(file) => file,
            Err(rejection) => {
                info!(path = %path.display(), reason = %rejection.reason, "classification rejected path");
                return ProcessOutcome::Rejected(rejection.reason);
            }
        };

        let path_str = path.to_string_lossy().to_string();
        if self.playback.is_locked(&path_str).await.is_some() {
            info!(path = %path.display(), "source is locked for playback, deferring");
            self.defer(&path_str, &classified, "source streaming".to_string()).await;
            return ProcessOutcome::LockedSource;
        }

        let Some(library_root) = self.select_library(&classified).await else {
            warn!(path = %path.display(), "no library configured for this media kind");
            return ProcessOutcome::NoLibraryConfigured;
        };

        let required_bytes = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
        let source_dir = path.parent().unwrap_or(Path::new("/"));
        if let Err(err) = self
            .health_gate
            .check_for_transfer(source_dir, &library_root, required_bytes, Some(self.config.health_timeout))
            .await
        {
            warn!(path = %path.display(), error = %err, "health gate rejected destination");
            return ProcessOutcome::HealthGateFailed(err.to_string());
        }

        let target_path = self.compute_target_path(&library_root, &classified).await;
        let target_str = target_path.to_string_lossy().to_string();

        if self.playback.is_locked(&target_str).await.is_some() {
            info!(target = %target_path.display(), "destination is locked for playback, deferring");
            self.defer(&target_str, &classified, "destination streaming".to_string()).await;
            return ProcessOutcome::LockedSource;
        }

        if let Some(existing) = find_existing_media(&target_path, &classified).await {
            let source_quality = QualityDescriptor::from_filename(
                &path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
            );
            let existing_name = existing.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let existing_quality = QualityDescriptor::from_filename(&existing_name);

            if !source_quality.is_better_than(&existing_quality) && !self.config.force_overwrite {
                let reason = format!(
                    "existing file has equal or better quality ({existing_quality} vs {source_quality})"
                );
                info!(path = %path.display(), %reason, "skipping transfer");
                self.record(&classified, &path, &target_path, false, 0, t0.elapsed(), Some(reason.clone()), false)
                    .await;
                return ProcessOutcome::QualitySkipped(reason);
            }

            if existing != target_path {
                let _ = tokio::fs::remove_file(&existing).await;
            }
        }

        let operation = if self.config.keep_source { TransferOperation::Copy } else { TransferOperation::Move };
        let opts = TransferOptions { operation, ..self.config.transfer.clone() };

        match self.transfer_engine.execute(&path, &target_path, &opts).await {
            Ok(result) => {
                info!(
                    source = %path.display(),
                    target = %target_path.display(),
                    bytes = result.bytes_copied,
                    "ingest transfer succeeded"
                );
                match classified.kind {
                    MediaKind::Movie => self.stats.record_movie(result.bytes_copied),
                    MediaKind::Episode => self.stats.record_tv(result.bytes_copied),
                }
                self.notify(&classified, &target_str).await;
                self.record(&classified, &path, &target_path, true, result.bytes_copied, t0.elapsed(), None, true)
                    .await;
                ProcessOutcome::Transferred { bytes_copied: result.bytes_copied }
            }
            Err(err) => {
                self.stats.record_error();
                warn!(source = %path.display(), error = %err, "ingest transfer failed");
                self.record(
                    &classified,
                    &path,
                    &target_path,
                    false,
                    0,
                    t0.elapsed(),
                    Some(err.to_string()),
                    false,
                )
                .await;
                ProcessOutcome::TransferFailed(err.to_string())
            }
        }
    }

    fn source_hint(&self, path: &Path) -> SourceHint {
        if crate::watcher::locate_root(path, &self.config.watch_tv).is_some() {
            SourceHint::Tv
        } else if crate::watcher::locate_root(path, &self.config.watch_movies).is_some() {
            SourceHint::Movie
        } else {
            SourceHint::Unknown
        }
    }

    async fn select_library(&self, file: &ClassifiedFile) -> Option<PathBuf> {
        match file.kind {
            MediaKind::Movie => self.config.libraries_movies.first().cloned(),
            MediaKind::Episode => {
                let candidates: Vec<String> =
                    self.config.libraries_tv.iter().map(|p| p.to_string_lossy().to_string()).collect();
                if candidates.is_empty() {
                    return None;
                }
                let chosen = self.tv_selector.select_tv(&file.title, file.year, &candidates).await;
                chosen.map(PathBuf::from).or_else(|| self.config.libraries_tv.first().cloned())
            }
        }
    }

    /// Builds `<library>/<title> (<year>)/Season SS/<title> (<year>) SxxExx.ext` for episodes and
    /// `<library>/<title> (<year>)/<title> (<year>).ext` for movies, reusing an existing
    /// case-insensitive show directory when one already exists under the chosen library.
    async fn compute_target_path(&self, library_root: &Path, file: &ClassifiedFile) -> PathBuf {
        let title = classifier::naming::sanitize_path_segment(&file.title);
        let show_dir_name = match file.year {
            Some(year) => format!("{title} ({year})"),
            None => title.clone(),
        };

        let show_dir = find_existing_show_dir(library_root, &title, file.year)
            .await
            .unwrap_or_else(|| library_root.join(&show_dir_name));

        match &file.episode {
            Some(episode) if episode.is_daily => {
                let date_tag = match (file.year, episode.air_month, episode.air_day) {
                    (Some(y), Some(m), Some(d)) => format!("{y:04}-{m:02}-{d:02}"),
                    _ => "unknown-date".to_string(),
                };
                let file_name = format!("{show_dir_name} {date_tag}.{}", file.extension);
                show_dir.join(file_name)
            }
            Some(episode) => {
                let season_dir = format!("Season {:02}", episode.season);
                let mut episode_tag = format!("S{:02}E{:02}", episode.season, episode.episode);
                if let Some(end) = episode.end_episode {
                    episode_tag.push_str(&format!("-E{end:02}"));
                }
                let file_name = format!("{show_dir_name} {episode_tag}.{}", file.extension);
                show_dir.join(season_dir).join(file_name)
            }
            None => {
                let file_name = format!("{show_dir_name}.{}", file.extension);
                show_dir.join(file_name)
            }
        }
    }

    /// `lock_key` is whichever path is actually locked for playback (source for a source-lock,
    /// the computed destination for a destination-lock) — the queue is keyed by that path so
    /// `PlaybackRegistry::unlock` finds and replays it once the matching `PlaybackStop` arrives.
    async fn defer(&self, lock_key: &str, file: &ClassifiedFile, reason: String) {
        let source = file.source_path.to_string_lossy().to_string();
        self.playback
            .defer(
                lock_key,
                DeferredOperation {
                    kind: if self.config.keep_source { DeferredOpKind::Copy } else { DeferredOpKind::Move },
                    source: source.clone(),
                    target: String::new(),
                    reason,
                    deferred_at: chrono::Utc::now(),
                    retry_count: 0,
                },
            )
            .await;
    }

    async fn notify(&self, file: &ClassifiedFile, target_path: &str) {
        self.notifier.notify_import(file.kind, target_path).await;
        self.inventory.record_file(file.kind, &file.title, target_path).await;
        self.inventory.log_operation("import", target_path).await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        file: &ClassifiedFile,
        source: &Path,
        target: &Path,
        success: bool,
        bytes_copied: u64,
        duration: Duration,
        error: Option<String>,
        notified: bool,
    ) {
        let action = if success {
            "transfer"
        } else if error.as_deref().map(|e| e.contains("quality")).unwrap_or(false) {
            "skip_quality"
        } else {
            "transfer_failed"
        };

        self.activity
            .record(ActivityEntry {
                timestamp: chrono::Utc::now(),
                action: action.to_string(),
                source: source.to_string_lossy().to_string(),
                target: target.to_string_lossy().to_string(),
                media_kind: Some(MediaKindLabel::from(file.kind)),
                parse_method: Some(parse_method_label(file.parse_method).to_string()),
                parsed_title: Some(file.title.clone()),
                parsed_year: file.year,
                confidence: Some(format!("{:?}", file.confidence).to_ascii_lowercase()),
                success,
                bytes_copied,
                duration_ms: duration.as_millis() as u64,
                error,
                notified,
            })
            .await;
    }
}

/// RAII increment/decrement of the orchestrator's in-flight counter, released on every `process`
/// return path including early returns, so [`Orchestrator::drain`] sees an accurate count.
struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlightGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        InFlightGuard { counter }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

fn parse_method_label(method: ParseMethod) -> &'static str {
    match method {
        ParseMethod::Regex => "regex",
        ParseMethod::FolderName => "folder-name",
        ParseMethod::ExternalHint => "external-hint",
    }
}

/// Case-insensitive (ASCII-only) reuse of an already-existing show directory, with or without
/// the `(Year)` suffix, per the spec's directory-reuse rule.
async fn find_existing_show_dir(library_root: &Path, title: &str, year: Option<u32>) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(library_root).await.ok()?;
    let bare = title.to_ascii_lowercase();
    let with_year = year.map(|y| format!("{bare} ({y})"));

    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(file_type) = entry.file_type().await else { continue };
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if name == bare || with_year.as_deref() == Some(name.as_str()) {
            return Some(entry.path());
        }
    }
    None
}

/// Looks for a pre-existing media file at the computed destination: the exact target file for
/// episodes (name is deterministic), or any video file already sitting in the target show
/// directory for movies (container extension may differ from the incoming file's).
async fn find_existing_media(target_path: &Path, file: &ClassifiedFile) -> Option<PathBuf> {
    if file.episode.is_some() {
        return if target_path.exists() { Some(target_path.to_path_buf()) } else { None };
    }

    let dir = target_path.parent()?;
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if classifier::has_video_extension(&path) {
            return Some(path);
        }
    }
    None
}
