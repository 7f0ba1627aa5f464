//! Bounded-timeout accessibility, writability, and free-space probes. Every syscall runs behind
//! a timeout so a hung NFS mount or asleep USB disk degrades to an error instead of blocking the
//! whole ingest pipeline indefinitely.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::timeout;
use uuid::Uuid;

use crate::error::{IngestError, Result};

#[derive(Debug, Clone)]
pub struct DiskHealth {
    pub accessible: bool,
    pub writable: bool,
    pub free_bytes: u64,
    pub total_bytes: u64,
    /// Whether the path's filesystem could be statted at all (distinct from `accessible`, which
    /// is about the directory entry itself) — false when `statvfs` fails even though the path
    /// exists, e.g. a mount that vanished out from under an open directory handle.
    pub mount_ok: bool,
    pub error: Option<String>,
}

impl DiskHealth {
    pub fn healthy(&self) -> bool {
        self.accessible && self.writable && self.mount_ok && self.error.is_none()
    }
}

pub struct HealthGate {
    default_timeout: Duration,
}

impl Default for HealthGate {
    fn default() -> Self {
        HealthGate { default_timeout: Duration::from_secs(5) }
    }
}

impl HealthGate {
    pub fn new(default_timeout: Duration) -> Self {
        HealthGate { default_timeout }
    }

    pub async fn check(&self, path: &Path, probe_timeout: Option<Duration>) -> DiskHealth {
        let probe_timeout = probe_timeout.unwrap_or(self.default_timeout);
        match timeout(probe_timeout, self.check_inner(path)).await {
            Ok(health) => health,
            Err(_) => DiskHealth {
                accessible: false,
                writable: false,
                free_bytes: 0,
                total_bytes: 0,
                mount_ok: false,
                error: Some("I/O hang suspected: probe exceeded timeout".to_string()),
            },
        }
    }

    async fn check_inner(&self, path: &Path) -> DiskHealth {
        let accessible = tokio::fs::metadata(path).await.is_ok();
        if !accessible {
            return DiskHealth {
                accessible: false,
                writable: false,
                free_bytes: 0,
                total_bytes: 0,
                mount_ok: false,
                error: Some(format!("{} is not accessible", path.display())),
            };
        }

        let writable = probe_writable(path).await;
        let space = disk_space(path).await;
        let mount_ok = space.is_some();
        let (free_bytes, total_bytes) = space.unwrap_or((0, 0));

        let error = if !mount_ok {
            Some(format!("{} could not be statted (mount may have gone away)", path.display()))
        } else if !writable {
            Some(format!("{} is not writable", path.display()))
        } else {
            None
        };

        DiskHealth { accessible: true, writable, free_bytes, total_bytes, mount_ok, error }
    }

    /// Compose a source and destination probe and additionally enforce free space on the
    /// destination before a transfer is attempted.
    pub async fn check_for_transfer(
        &self,
        source_dir: &Path,
        destination_dir: &Path,
        required_bytes: u64,
        probe_timeout: Option<Duration>,
    ) -> Result<()> {
        let source_health = self.check(source_dir, probe_timeout).await;
        if !source_health.healthy() {
            return Err(IngestError::HealthGate {
                path: source_dir.to_path_buf(),
                reason: source_health.error.unwrap_or_else(|| "source unhealthy".into()),
            });
        }

        let dest_health = self.check(destination_dir, probe_timeout).await;
        if !dest_health.healthy() {
            return Err(IngestError::HealthGate {
                path: destination_dir.to_path_buf(),
                reason: dest_health.error.unwrap_or_else(|| "destination unhealthy".into()),
            });
        }

        if dest_health.free_bytes < required_bytes {
            return Err(IngestError::HealthGate {
                path: destination_dir.to_path_buf(),
                reason: format!(
                    "insufficient free space: need {required_bytes} bytes, have {}",
                    dest_health.free_bytes
                ),
            });
        }

        Ok(())
    }
}

async fn probe_writable(dir: &Path) -> bool {
    let probe_path: PathBuf = dir.join(format!(".custodian-probe-{}", Uuid::new_v4()));
    let result = tokio::fs::write(&probe_path, b"probe").await;
    let _ = tokio::fs::remove_file(&probe_path).await;
    result.is_ok()
}

#[cfg(unix)]
async fn disk_space(path: &Path) -> Option<(u64, u64)> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || statvfs_space(&path)).await.ok().flatten()
}

#[cfg(unix)]
fn statvfs_space(path: &Path) -> Option<(u64, u64)> {
    let stat = nix::sys::statvfs::statvfs(path).ok()?;
    let free = stat.blocks_available() as u64 * stat.fragment_size() as u64;
    let total = stat.blocks() as u64 * stat.fragment_size() as u64;
    Some((free, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn healthy_directory_passes() {
        let dir = tempdir().unwrap();
        let gate = HealthGate::default();
        let health = gate.check(dir.path(), None).await;
        assert!(health.healthy());
        assert!(health.total_bytes > 0);
    }

    #[tokio::test]
    async fn missing_directory_is_unhealthy() {
        let gate = HealthGate::default();
        let health = gate.check(Path::new("/nonexistent/path/for/custodian/tests"), None).await;
        assert!(!health.healthy());
    }

    #[tokio::test]
    async fn transfer_check_rejects_insufficient_space() {
        let dir = tempdir().unwrap();
        let gate = HealthGate::default();
        let result = gate
            .check_for_transfer(dir.path(), dir.path(), u64::MAX, None)
            .await;
        assert!(result.is_err());
    }
}
