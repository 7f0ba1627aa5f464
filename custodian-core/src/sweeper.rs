//! Periodic directory walk that recovers files the filesystem watcher missed — a dropped event,
//! or files that landed while the daemon was down. Grounded on the teacher's folder monitor
//! (`ferrex-core/src/scanner/folder_monitor.rs`): an `interval` ticker with
//! `MissedTickBehavior::Skip`, a shutdown flag checked each tick, and per-item error isolation so
//! one bad file never aborts the walk.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;
use walkdir::WalkDir;

use crate::classifier;
use crate::orchestrator::Orchestrator;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct SweeperHealth {
    pub last_run_unix: i64,
    pub last_run_count: u64,
    pub degraded: bool,
}

/// Walks every watch root on a fixed interval and feeds each eligible file through the
/// orchestrator's `process` entry point, exactly as the watcher's debounce timer would.
pub struct PeriodicSweeper {
    roots: Vec<PathBuf>,
    interval: Duration,
    orchestrator: Arc<Orchestrator>,
    last_run_unix: Arc<AtomicI64>,
    last_run_count: Arc<std::sync::atomic::AtomicU64>,
    shutdown: Arc<RwLock<bool>>,
    running: Arc<AtomicBool>,
}

impl PeriodicSweeper {
    pub fn new(roots: Vec<PathBuf>, interval: Duration, orchestrator: Arc<Orchestrator>) -> Self {
        PeriodicSweeper {
            roots,
            interval: if interval.is_zero() { DEFAULT_INTERVAL } else { interval },
            orchestrator,
            last_run_unix: Arc::new(AtomicI64::new(0)),
            last_run_count: Arc::new(std::sync::atomic::AtomicU64::new(0)),
            shutdown: Arc::new(RwLock::new(false)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns the sweep loop as an independent task. Returns its join handle so the caller can
    /// await it during a graceful shutdown drain.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::Relaxed);
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if *self.shutdown.read().await {
                    info!("periodic sweeper shutting down");
                    break;
                }
                self.run_once().await;
            }
        })
    }

    pub async fn shutdown(&self) {
        *self.shutdown.write().await = true;
    }

    async fn run_once(&self) {
        let mut processed = 0u64;
        for root in &self.roots {
            for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path().to_path_buf();
                if !classifier::has_video_extension(&path) {
                    continue;
                }
                processed += 1;
                self.orchestrator.process(path).await;
            }
        }

        self.last_run_unix.store(now_unix(), Ordering::Relaxed);
        self.last_run_count.store(processed, Ordering::Relaxed);
        if processed > 0 {
            info!(count = processed, "periodic sweep completed");
        }
    }

    /// `degraded` is true once the configured interval has been exceeded by 2x without a run,
    /// signaling the sweep loop itself may be stuck or never started.
    pub fn health(&self) -> SweeperHealth {
        let last_run_unix = self.last_run_unix.load(Ordering::Relaxed);
        let elapsed = now_unix() - last_run_unix;
        let degraded = last_run_unix == 0 || elapsed as u64 > self.interval.as_secs().saturating_mul(2);
        SweeperHealth {
            last_run_unix,
            last_run_count: self.last_run_count.load(Ordering::Relaxed),
            degraded,
        }
    }
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityLog;
    use crate::health::HealthGate;
    use crate::orchestrator::OrchestratorConfig;
    use crate::peers::{FirstLibrarySelector, LoggingNotifier, NullInventory};
    use crate::playback::PlaybackRegistry;
    use crate::stats::Stats;
    use crate::transfer::{build_engine, BackendKind};
    use tempfile::tempdir;

    #[tokio::test]
    async fn sweep_picks_up_preexisting_files() {
        let watch = tempdir().unwrap();
        let library = tempdir().unwrap();
        tokio::fs::write(watch.path().join("Movie.2021.mkv"), vec![0u8; 256]).await.unwrap();

        let (activity, _handle) = ActivityLog::spawn(std::env::temp_dir().join("custodian-test-sweep"));
        let config = OrchestratorConfig {
            watch_movies: vec![watch.path().to_path_buf()],
            libraries_movies: vec![library.path().to_path_buf()],
            ..Default::default()
        };
        let orchestrator = Arc::new(Orchestrator::new(
            config,
            HealthGate::default(),
            PlaybackRegistry::new(),
            build_engine(BackendKind::Native),
            activity,
            Arc::new(Stats::default()),
            Arc::new(LoggingNotifier),
            Arc::new(FirstLibrarySelector),
            Arc::new(NullInventory),
        ));

        let sweeper = Arc::new(PeriodicSweeper::new(
            vec![watch.path().to_path_buf()],
            Duration::from_millis(20),
            orchestrator,
        ));
        sweeper.run_once().await;

        assert!(library.path().join("Movie (2021)/Movie (2021).mkv").exists());
        assert_eq!(sweeper.health().last_run_count, 1);
    }

    #[tokio::test]
    async fn health_reports_degraded_before_first_run() {
        let orchestrator_config = OrchestratorConfig::default();
        let (activity, _handle) = ActivityLog::spawn(std::env::temp_dir().join("custodian-test-sweep-2"));
        let orchestrator = Arc::new(Orchestrator::new(
            orchestrator_config,
            HealthGate::default(),
            PlaybackRegistry::new(),
            build_engine(BackendKind::Native),
            activity,
            Arc::new(Stats::default()),
            Arc::new(LoggingNotifier),
            Arc::new(FirstLibrarySelector),
            Arc::new(NullInventory),
        ));
        let sweeper = PeriodicSweeper::new(vec![], Duration::from_secs(300), orchestrator);
        assert!(sweeper.health().degraded);
    }
}
