//! Custodian daemon entry point: loads configuration, wires the ingest pipeline together, and
//! serves the webhook/health/metrics surface until shut down.

mod webhook;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use custodian_config::{Config, LoggingConfig};
use custodian_core::activity::ActivityLog;
use custodian_core::debounce::DebounceCoordinator;
use custodian_core::health::HealthGate;
use custodian_core::orchestrator::{Orchestrator, OrchestratorConfig};
use custodian_core::peers::{FirstLibrarySelector, LoggingNotifier, NullInventory};
use custodian_core::playback::PlaybackRegistry;
use custodian_core::stats::Stats;
use custodian_core::sweeper::PeriodicSweeper;
use custodian_core::transfer::{build_engine, BackendKind, TransferOptions};
use custodian_core::watcher;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "custodiand")]
#[command(about = "Media-library custodian daemon")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "CUSTODIAN_CONFIG", default_value = "/etc/custodian/custodian.toml")]
    config: PathBuf,

    /// Optional .env file to source secrets from before loading the config
    #[arg(long, env = "CUSTODIAN_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// HTTP bind address for the webhook/health/metrics server
    #[arg(long, env = "CUSTODIAN_BIND", default_value = "0.0.0.0:8420")]
    bind: SocketAddr,
}

fn backend_kind(choice: custodian_config::BackendChoice) -> BackendKind {
    match choice {
        custodian_config::BackendChoice::Auto => BackendKind::Auto,
        custodian_config::BackendChoice::Native => BackendKind::Native,
        custodian_config::BackendChoice::Sync => BackendKind::ExternalSync,
        custodian_config::BackendChoice::Streaming => BackendKind::ExternalStreaming,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config: Config = custodian_config::load(&args.config, args.env_file.as_deref())
        .map_err(|err| anyhow::anyhow!("failed to load configuration from {}: {err}", args.config.display()))?;

    // Held for the process lifetime: dropping it stops the non-blocking file writer's flush task.
    let _log_guard = init_logging(&config.logging);

    let permissions = config
        .resolve_permissions()
        .map_err(|err| anyhow::anyhow!("invalid [permissions] configuration: {err}"))?;

    let config_dir = args.config.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let activity_dir = config.ensure_directories(&config_dir)?;
    info!(dir = %activity_dir.display(), "activity log directory ready");

    let transfer_options = TransferOptions {
        target_uid: permissions.uid,
        target_gid: permissions.gid,
        file_mode: permissions.file_mode,
        dir_mode: permissions.dir_mode,
        ..Default::default()
    };

    let orchestrator_config = OrchestratorConfig {
        watch_tv: config.watch.tv.clone(),
        watch_movies: config.watch.movies.clone(),
        libraries_tv: config.libraries.tv.clone(),
        libraries_movies: config.libraries.movies.clone(),
        dry_run: config.options.dry_run,
        keep_source: config.options.keep_source,
        force_overwrite: config.options.force_overwrite,
        health_timeout: std::time::Duration::from_secs(5),
        transfer: transfer_options,
    };

    let (activity, activity_handle) = ActivityLog::spawn(activity_dir);
    let stats = Arc::new(Stats::default());
    let playback = PlaybackRegistry::new();

    let orchestrator = Arc::new(Orchestrator::new(
        orchestrator_config,
        HealthGate::new(std::time::Duration::from_secs(5)),
        playback.clone(),
        build_engine(backend_kind(config.options.backend)),
        activity,
        stats.clone(),
        Arc::new(LoggingNotifier),
        Arc::new(FirstLibrarySelector),
        Arc::new(NullInventory),
    ));

    let all_watch_roots = config.all_watch_roots();
    let shutdown = CancellationToken::new();

    let debounce = {
        let orchestrator = orchestrator.clone();
        Arc::new(DebounceCoordinator::new(move |path| {
            let orchestrator = orchestrator.clone();
            Box::pin(async move {
                orchestrator.process(path).await;
            })
        }))
    };

    let watcher_task = spawn_watch_loop(all_watch_roots.clone(), debounce.clone(), shutdown.clone());

    let sweeper = Arc::new(PeriodicSweeper::new(
        all_watch_roots,
        config.daemon.scan_frequency,
        orchestrator.clone(),
    ));
    let sweeper_task = sweeper.clone().start();

    let webhook_secret = config.jellyfin.webhook_secret.clone().unwrap_or_default();
    if config.jellyfin.enabled && webhook_secret.is_empty() {
        warn!("jellyfin.enabled is set but webhook_secret is empty; all webhook calls will be refused");
    }

    let app_state = webhook::AppState {
        orchestrator: orchestrator.clone(),
        sweeper: sweeper.clone(),
        playback: playback.clone(),
        stats: stats.clone(),
        webhook_secret: Arc::new(webhook_secret),
    };

    let router = webhook::build_router(app_state);
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!(addr = %args.bind, "custodiand listening");

    let server_shutdown = shutdown.clone();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await });

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        result = server => {
            if let Err(err) = result {
                warn!(error = %err, "webhook server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("SIGINT received, shutting down");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received, shutting down");
        }
    }

    shutdown.cancel();
    debounce.shutdown().await;
    sweeper.shutdown().await;
    watcher_task.abort();
    sweeper_task.abort();

    info!("waiting up to 10s for in-flight transfers to finish");
    orchestrator.drain(std::time::Duration::from_secs(10)).await;
    // The activity writer's sender is held by the still-live `orchestrator` Arc (shared with
    // in-flight transfers), so it can't be dropped here to let the task exit on its own; aborting
    // it loses at most the last few pending log lines, never an in-flight transfer.
    activity_handle.abort();

    info!("custodiand shut down cleanly");
    Ok(())
}

/// Bridges the raw notify event stream through the debounce coordinator: every create/write/
/// rename event for a path resets that path's debounce timer rather than firing immediately.
fn spawn_watch_loop(
    roots: Vec<PathBuf>,
    debounce: Arc<DebounceCoordinator<impl Fn(PathBuf) -> futures::future::BoxFuture<'static, ()> + Send + Sync + 'static>>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let handle = match watcher::watch_roots(&roots) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(error = %err, "failed to start filesystem watcher");
                return;
            }
        };

        let (tx, mut rx) = mpsc::channel(1024);
        let forward = tokio::spawn(async move {
            let on_event: Arc<dyn Fn(watcher::FsEvent) + Send + Sync> = {
                let tx = tx.clone();
                Arc::new(move |event: watcher::FsEvent| {
                    let _ = tx.try_send(event);
                })
            };
            watcher::run_forever(handle, on_event).await;
        });

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => {
                    match event {
                        Some(event) => debounce.notify(event.path).await,
                        None => break,
                    }
                }
            }
        }

        forward.abort();
    })
}

/// Builds the `tracing-subscriber` registry from `[logging]`. With `logging.file` unset, logs go
/// to stdout only. With it set, logs additionally roll daily into that directory (one file per
/// day, named after the configured prefix) via a non-blocking writer; `max_backups` old rotated
/// files beyond that count are pruned on startup. The returned guard must be held for the
/// process's lifetime or the non-blocking writer stops flushing.
fn init_logging(logging: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("custodiand={level},custodian_core={level},tower_http=info", level = logging.level).into()
    });

    match &logging.file {
        Some(log_file) => {
            let dir = log_file.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(std::path::Path::new("."));
            let prefix = log_file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "custodiand.log".to_string());

            if let Err(err) = std::fs::create_dir_all(dir) {
                eprintln!("warning: failed to create log directory {}: {err}", dir.display());
            }
            prune_rotated_logs(dir, &prefix, logging.max_backups as usize);

            let appender = tracing_appender::rolling::daily(dir, &prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
                .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    }
}

/// `tracing_appender::rolling::daily` names each day's file `<prefix>.YYYY-MM-DD`; keep only the
/// `keep` most recent and remove the rest so the log directory doesn't grow without bound.
fn prune_rotated_logs(dir: &std::path::Path, prefix: &str, keep: usize) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    let mut rotated: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
        .collect();
    if rotated.len() <= keep {
        return;
    }
    rotated.sort_by_key(|e| e.file_name());
    for stale in &rotated[..rotated.len() - keep] {
        let _ = std::fs::remove_file(stale.path());
    }
}
