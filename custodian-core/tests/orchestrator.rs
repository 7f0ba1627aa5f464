//! Integration coverage for the orchestrator wired up exactly as `custodiand::main` wires it:
//! real `tempdir`-backed filesystems, a real [`ActivityLog`] writer task, and a real
//! [`PlaybackRegistry`] shared between the caller (standing in for the webhook handler) and the
//! orchestrator. Colocated unit tests in `orchestrator.rs` cover the classify/select/transfer
//! decision tree in isolation; these exercise the cross-module paths that only show up when the
//! pieces are assembled, in particular the deferred-operation replay a webhook's `PlaybackStop`
//! handler triggers.

use std::sync::Arc;

use custodian_core::activity::ActivityLog;
use custodian_core::health::HealthGate;
use custodian_core::orchestrator::{Orchestrator, OrchestratorConfig, ProcessOutcome};
use custodian_core::peers::{FirstLibrarySelector, LoggingNotifier, NullInventory};
use custodian_core::playback::{PlaybackInfo, PlaybackRegistry};
use custodian_core::stats::Stats;
use custodian_core::transfer::{build_engine, BackendKind};
use tempfile::tempdir;

fn build(config: OrchestratorConfig, playback: PlaybackRegistry) -> (Orchestrator, tokio::task::JoinHandle<()>) {
    let (activity, handle) = ActivityLog::spawn(std::env::temp_dir().join("custodian-core-orchestrator-test-activity"));
    let orchestrator = Orchestrator::new(
        config,
        HealthGate::default(),
        playback,
        build_engine(BackendKind::Native),
        activity,
        Arc::new(Stats::default()),
        Arc::new(LoggingNotifier),
        Arc::new(FirstLibrarySelector),
        Arc::new(NullInventory),
    );
    (orchestrator, handle)
}

#[tokio::test]
async fn playback_unlock_replays_deferred_transfer() {
    let watch = tempdir().unwrap();
    let library = tempdir().unwrap();
    let source = watch.path().join("Movie.Night.2021.1080p.mkv");
    tokio::fs::write(&source, vec![0u8; 2048]).await.unwrap();

    let config = OrchestratorConfig {
        watch_movies: vec![watch.path().to_path_buf()],
        libraries_movies: vec![library.path().to_path_buf()],
        ..Default::default()
    };

    // Held by the test the way `AppState.playback` is held by the webhook handler: a clone
    // independent of the one passed into the orchestrator, locked before the first attempt.
    let playback = PlaybackRegistry::new();
    let source_key = source.to_string_lossy().to_string();
    playback
        .lock(&source_key, PlaybackInfo::now("alice".into(), "tv".into(), "jellyfin".into(), "item-1".into()))
        .await;

    let (orchestrator, _handle) = build(config, playback.clone());

    let first = orchestrator.process(source.clone()).await;
    assert!(matches!(first, ProcessOutcome::LockedSource));
    assert!(source.exists(), "locked source must not be touched");
    assert_eq!(playback.deferred_count().await, 1);

    // Mirrors `webhook::handle_playback_stop`: unlock, drain the deferred queue, replay.
    playback.unlock(&source_key).await;
    let deferred = playback.take_deferred(&source_key).await;
    assert_eq!(deferred.len(), 1);

    for op in deferred {
        let replayed = orchestrator.process(std::path::PathBuf::from(op.source)).await;
        assert!(matches!(replayed, ProcessOutcome::Transferred { .. }));
    }

    assert!(!source.exists());
    assert!(library.path().join("Movie Night (2021)/Movie Night (2021).mkv").exists());
}

#[tokio::test]
async fn destination_lock_defers_keyed_by_target_and_replays_on_target_unlock() {
    let watch = tempdir().unwrap();
    let library = tempdir().unwrap();
    let source = watch.path().join("Inception.2010.1080p.BluRay.mkv");
    tokio::fs::write(&source, vec![0u8; 2048]).await.unwrap();

    let config = OrchestratorConfig {
        watch_movies: vec![watch.path().to_path_buf()],
        libraries_movies: vec![library.path().to_path_buf()],
        ..Default::default()
    };

    let target = library.path().join("Inception (2010)/Inception (2010).mkv");
    let target_key = target.to_string_lossy().to_string();

    // A peer is streaming the already-imported file at the *destination* path — distinct from
    // the source streaming case, the lock here is discovered only after classify/select/compute.
    let playback = PlaybackRegistry::new();
    playback
        .lock(&target_key, PlaybackInfo::now("bob".into(), "phone".into(), "jellyfin".into(), "item-2".into()))
        .await;

    let (orchestrator, _handle) = build(config, playback.clone());

    let first = orchestrator.process(source.clone()).await;
    assert!(matches!(first, ProcessOutcome::LockedSource));
    assert!(source.exists(), "locked destination must not be touched");

    // The op must be queued under the locked target path, not the source path: draining by
    // source would find nothing and the transfer would never replay.
    assert!(playback.take_deferred(&source.to_string_lossy()).await.is_empty());
    assert_eq!(playback.deferred_count().await, 1);

    playback.unlock(&target_key).await;
    let deferred = playback.take_deferred(&target_key).await;
    assert_eq!(deferred.len(), 1);

    for op in deferred {
        let replayed = orchestrator.process(std::path::PathBuf::from(op.source)).await;
        assert!(matches!(replayed, ProcessOutcome::Transferred { .. }));
    }

    assert!(!source.exists());
    assert!(target.exists());
}

#[tokio::test]
async fn successful_transfer_is_recorded_in_the_activity_log_and_stats() {
    let watch = tempdir().unwrap();
    let library = tempdir().unwrap();
    let source = watch.path().join("Arrival.2016.1080p.BluRay.mkv");
    tokio::fs::write(&source, vec![0u8; 8192]).await.unwrap();

    let config = OrchestratorConfig {
        watch_movies: vec![watch.path().to_path_buf()],
        libraries_movies: vec![library.path().to_path_buf()],
        ..Default::default()
    };

    let (activity, activity_handle) =
        ActivityLog::spawn(std::env::temp_dir().join("custodian-core-orchestrator-test-activity-stats"));
    let stats = Arc::new(Stats::default());
    let orchestrator = Orchestrator::new(
        config,
        HealthGate::default(),
        PlaybackRegistry::new(),
        build_engine(BackendKind::Native),
        activity,
        stats.clone(),
        Arc::new(LoggingNotifier),
        Arc::new(FirstLibrarySelector),
        Arc::new(NullInventory),
    );

    let outcome = orchestrator.process(source.clone()).await;
    assert!(matches!(outcome, ProcessOutcome::Transferred { bytes_copied: 8192 }));

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.movies_processed, 1);
    assert_eq!(snapshot.bytes_transferred, 8192);

    drop(orchestrator);
    activity_handle.await.unwrap();
}

#[tokio::test]
async fn missing_library_root_is_reported_and_source_is_untouched() {
    let watch = tempdir().unwrap();
    let source = watch.path().join("Orphan.2019.mkv");
    tokio::fs::write(&source, vec![0u8; 512]).await.unwrap();

    let config = OrchestratorConfig { watch_movies: vec![watch.path().to_path_buf()], ..Default::default() };
    let (orchestrator, _handle) = build(config, PlaybackRegistry::new());

    let outcome = orchestrator.process(source.clone()).await;
    assert!(matches!(outcome, ProcessOutcome::NoLibraryConfigured));
    assert!(source.exists());
}
