//! TOML configuration loading for the custodian daemon. Follows the same layered shape as the
//! teacher's `ferrex-server::infra::config`: a raw `serde`-deserialized file struct, an optional
//! `.env` pass via `dotenvy` for secrets, and a resolved [`Config`] the rest of the daemon
//! consumes. Unlike the teacher's full interactive setup wizard (`ferrex-config`, out of scope
//! here), this is a single TOML-in, struct-out loader with no CLI subcommands of its own.

mod permissions;

pub use permissions::ResolvedPermissions;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: Box<toml::de::Error> },

    #[error("configuration error: {0}")]
    Invalid(String),
}

fn default_backend() -> BackendChoice {
    BackendChoice::Auto
}

fn default_scan_frequency() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_size_mb() -> u64 {
    100
}

fn default_max_backups() -> u32 {
    7
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    Auto,
    Streaming,
    Sync,
    Native,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LibrariesConfig {
    pub tv: Vec<PathBuf>,
    pub movies: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub tv: Vec<PathBuf>,
    pub movies: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    pub user: Option<String>,
    pub group: Option<String>,
    pub file_mode: Option<String>,
    pub dir_mode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    pub dry_run: bool,
    pub backend: BackendChoice,
    pub keep_source: bool,
    pub force_overwrite: bool,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        OptionsConfig {
            dry_run: false,
            backend: default_backend(),
            keep_source: false,
            force_overwrite: false,
        }
    }
}

/// Shared shape for the Jellyfin, TV-manager, and movie-manager peer blocks. Only the Jellyfin
/// block uses `webhook_secret` and `playback_safety`; the others leave them `None`/`false`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub playback_safety: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    #[serde(with = "humantime_serde")]
    pub scan_frequency: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig { scan_frequency: default_scan_frequency() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
    pub max_size_mb: u64,
    pub max_backups: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            file: None,
            max_size_mb: default_max_size_mb(),
            max_backups: default_max_backups(),
        }
    }
}

/// The resolved configuration the daemon runs with. Populated by [`load`] from a TOML file, with
/// `.env`/process environment variables overriding the three peer API keys and the Jellyfin
/// webhook secret (the conventional place to keep credentials out of a checked-in config file).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub libraries: LibrariesConfig,
    pub watch: WatchConfig,
    pub permissions: PermissionsConfig,
    pub options: OptionsConfig,
    pub jellyfin: PeerConfig,
    pub tv_manager: PeerConfig,
    pub movie_manager: PeerConfig,
    pub daemon: DaemonConfig,
    pub logging: LoggingConfig,
}

/// Load configuration from `path`, applying `.env`/environment overrides for secrets. `env_file`
/// is optional; when absent, `dotenvy::dotenv()` is tried against the process's working
/// directory and silently skipped if no `.env` is present.
pub fn load(path: &Path, env_file: Option<&Path>) -> Result<Config, ConfigError> {
    match env_file {
        Some(path) => {
            let _ = dotenvy::from_path(path);
        }
        None => {
            let _ = dotenvy::dotenv();
        }
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    let mut config: Config = toml::from_str(&contents)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source: Box::new(source) })?;

    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(secret) = std::env::var("JELLYFIN_WEBHOOK_SECRET") {
        config.jellyfin.webhook_secret = Some(secret);
    }
    if let Ok(key) = std::env::var("JELLYFIN_API_KEY") {
        config.jellyfin.api_key = Some(key);
    }
    if let Ok(key) = std::env::var("TV_MANAGER_API_KEY") {
        config.tv_manager.api_key = Some(key);
    }
    if let Ok(key) = std::env::var("MOVIE_MANAGER_API_KEY") {
        config.movie_manager.api_key = Some(key);
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.libraries.tv.is_empty() && config.libraries.movies.is_empty() {
        return Err(ConfigError::Invalid("at least one library root must be configured".into()));
    }
    if config.watch.tv.is_empty() && config.watch.movies.is_empty() {
        return Err(ConfigError::Invalid("at least one watch root must be configured".into()));
    }
    if config.jellyfin.enabled && config.jellyfin.webhook_secret.as_deref().unwrap_or("").is_empty() {
        return Err(ConfigError::Invalid(
            "jellyfin.enabled requires a non-empty webhook_secret".into(),
        ));
    }
    Ok(())
}

impl Config {
    /// Every watch and library root the daemon will ever touch, for the startup accessibility
    /// sweep and the health-gate's directory creation.
    pub fn all_watch_roots(&self) -> Vec<PathBuf> {
        self.watch.tv.iter().chain(self.watch.movies.iter()).cloned().collect()
    }

    /// Creates the per-day activity log directory under `config_dir/activity`.
    pub fn ensure_directories(&self, config_dir: &Path) -> std::io::Result<PathBuf> {
        let activity_dir = config_dir.join("activity");
        std::fs::create_dir_all(&activity_dir)?;
        Ok(activity_dir)
    }

    /// Resolves `permissions.user`/`group` (name or numeric id) and the octal mode strings.
    /// Refuses at startup rather than failing per-file later, per the spec's permissions
    /// semantics: chown requires superuser, enforced here instead of deferred to transfer time.
    pub fn resolve_permissions(&self) -> Result<ResolvedPermissions, ConfigError> {
        permissions::resolve(&self.permissions)
    }
}
