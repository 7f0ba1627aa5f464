//! Pluggable move/copy backend with a no-progress watchdog, bounded retries, optional checksum
//! verification, and ownership/mode application.

mod external;
mod native;

pub use external::{ExternalStreamingBackend, ExternalSyncBackend, ExternalSyncMode};
pub use native::NativeBufferedBackend;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{IngestError, Result};

/// Options that govern a single transfer attempt, independent of which backend runs it.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub operation: TransferOperation,
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub verify_checksum: bool,
    pub delete_partial_on_failure: bool,
    pub target_uid: Option<u32>,
    pub target_gid: Option<u32>,
    pub file_mode: Option<u32>,
    pub dir_mode: Option<u32>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        TransferOptions {
            operation: TransferOperation::Move,
            timeout: Duration::from_secs(30),
            retry_attempts: 2,
            retry_delay: Duration::from_secs(5),
            verify_checksum: false,
            delete_partial_on_failure: true,
            target_uid: None,
            target_gid: None,
            file_mode: None,
            dir_mode: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOperation {
    Move,
    Copy,
}

#[derive(Debug, Clone)]
pub struct TransferResult {
    pub bytes_total: u64,
    pub bytes_copied: u64,
    pub duration: Duration,
    pub attempts: u32,
    pub source_removed: bool,
}

/// A transfer backend capability set. Implementations need not support resume; the engine
/// retries from scratch unless the backend reports otherwise via [`TransferBackend::can_resume`].
#[async_trait]
pub trait TransferBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_resume(&self) -> bool {
        false
    }

    /// Perform a single copy attempt. Must not delete the source; the engine handles move
    /// semantics by copying then removing.
    async fn copy(&self, source: &Path, destination: &Path, opts: &TransferOptions) -> Result<u64>;
}

/// Tries each backend in order until one succeeds, falling through transient failures.
pub struct FallbackBackend {
    backends: Vec<Box<dyn TransferBackend>>,
}

impl FallbackBackend {
    pub fn new(backends: Vec<Box<dyn TransferBackend>>) -> Self {
        FallbackBackend { backends }
    }
}

#[async_trait]
impl TransferBackend for FallbackBackend {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn copy(&self, source: &Path, destination: &Path, opts: &TransferOptions) -> Result<u64> {
        let mut last_err = None;
        for backend in &self.backends {
            match backend.copy(source, destination, opts).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) => {
                    warn!(backend = backend.name(), error = %err, "backend failed, trying next");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| IngestError::Internal("no backends configured".into())))
    }
}

/// Runs pre-flight checks, executes the backend with retry, applies permissions, and for moves,
/// removes the source once the destination is verified.
pub struct TransferEngine {
    backend: Box<dyn TransferBackend>,
}

impl TransferEngine {
    pub fn new(backend: Box<dyn TransferBackend>) -> Self {
        TransferEngine { backend }
    }

    pub async fn execute(
        &self,
        source: &Path,
        destination: &Path,
        opts: &TransferOptions,
    ) -> Result<TransferResult> {
        let started = std::time::Instant::now();
        let bytes_total = stat_size(source).await?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(IngestError::Io)?;
            apply_dir_permissions(parent, opts).await?;
        }

        let mut attempts = 0u32;
        let mut last_err = None;
        while attempts <= opts.retry_attempts {
            attempts += 1;
            match self.backend.copy(source, destination, opts).await {
                Ok(bytes_copied) => {
                    if opts.verify_checksum {
                        verify_checksum(source, destination).await?;
                    }
                    apply_file_permissions(destination, opts).await?;

                    let source_removed = if opts.operation == TransferOperation::Move {
                        remove_source(source).await
                    } else {
                        false
                    };

                    info!(
                        source = %source.display(),
                        destination = %destination.display(),
                        backend = self.backend.name(),
                        attempts,
                        bytes_copied,
                        "transfer succeeded"
                    );

                    return Ok(TransferResult {
                        bytes_total,
                        bytes_copied,
                        duration: started.elapsed(),
                        attempts,
                        source_removed,
                    });
                }
                Err(err) => {
                    warn!(attempt = attempts, error = %err, "transfer attempt failed");
                    last_err = Some(err);
                    if opts.delete_partial_on_failure {
                        let _ = tokio::fs::remove_file(destination).await;
                    }
                    if attempts <= opts.retry_attempts {
                        tokio::time::sleep(opts.retry_delay).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            IngestError::TransferFailed {
                source: source.to_path_buf(),
                destination: destination.to_path_buf(),
                reason: "no attempts were made".into(),
            }
        }))
    }
}

async fn stat_size(path: &Path) -> Result<u64> {
    let metadata = tokio::fs::metadata(path).await.map_err(IngestError::Io)?;
    Ok(metadata.len())
}

async fn remove_source(source: &Path) -> bool {
    match tokio::time::timeout(Duration::from_secs(30), tokio::fs::remove_file(source)).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!(source = %source.display(), error = %err, "failed to remove source after move");
            false
        }
        Err(_) => {
            warn!(source = %source.display(), "source removal timed out; destination is authoritative");
            false
        }
    }
}

async fn verify_checksum(source: &Path, destination: &Path) -> Result<()> {
    let source_hash = hash_file(source).await?;
    let dest_hash = hash_file(destination).await?;
    if source_hash != dest_hash {
        return Err(IngestError::TransferFailed {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            reason: "checksum mismatch after transfer".into(),
        });
    }
    Ok(())
}

async fn hash_file(path: &Path) -> Result<[u8; 32]> {
    use sha2::{Digest, Sha256};
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(path).await.map_err(IngestError::Io)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1 << 20];
    loop {
        let n = file.read(&mut buf).await.map_err(IngestError::Io)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

#[cfg(unix)]
async fn apply_file_permissions(path: &Path, opts: &TransferOptions) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = opts.file_mode {
        let permissions = std::fs::Permissions::from_mode(mode);
        tokio::fs::set_permissions(path, permissions).await.map_err(IngestError::Io)?;
    }
    if opts.target_uid.is_some() || opts.target_gid.is_some() {
        chown(path, opts.target_uid, opts.target_gid)?;
    }
    Ok(())
}

#[cfg(unix)]
async fn apply_dir_permissions(path: &Path, opts: &TransferOptions) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = opts.dir_mode {
        let permissions = std::fs::Permissions::from_mode(mode);
        tokio::fs::set_permissions(path, permissions).await.map_err(IngestError::Io)?;
    }
    Ok(())
}

#[cfg(unix)]
fn chown(path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
    use nix::unistd::{Gid, Uid, chown as nix_chown};

    nix_chown(path, uid.map(Uid::from_raw), gid.map(Gid::from_raw))
        .map_err(|errno| IngestError::Internal(format!("chown failed: {errno}")))
}

/// Transfer backends the daemon can select between, matching the configured `options.backend`
/// key. `Auto` prefers the native buffered backend and falls back to the external-sync backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Auto,
    Native,
    ExternalSync,
    ExternalStreaming,
}

pub fn build_engine(kind: BackendKind) -> TransferEngine {
    let backend: Box<dyn TransferBackend> = match kind {
        BackendKind::Native => Box::new(NativeBufferedBackend::default()),
        BackendKind::ExternalSync => Box::new(ExternalSyncBackend::default()),
        BackendKind::ExternalStreaming => Box::new(ExternalStreamingBackend),
        BackendKind::Auto => Box::new(FallbackBackend::new(vec![
            Box::new(NativeBufferedBackend::default()),
            Box::new(ExternalSyncBackend::default()),
        ])),
    };
    TransferEngine::new(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn native_backend_moves_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source.mkv");
        tokio::fs::write(&source, b"hello world").await.unwrap();
        let destination = dir.path().join("dest/destination.mkv");

        let engine = build_engine(BackendKind::Native);
        let opts = TransferOptions { operation: TransferOperation::Move, ..Default::default() };
        let result = engine.execute(&source, &destination, &opts).await.unwrap();

        assert_eq!(result.bytes_total, 11);
        assert_eq!(result.bytes_copied, 11);
        assert!(!source.exists());
        assert!(destination.exists());
    }

    #[tokio::test]
    async fn copy_preserves_source() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source.mkv");
        tokio::fs::write(&source, b"payload").await.unwrap();
        let destination = dir.path().join("destination.mkv");

        let engine = build_engine(BackendKind::Native);
        let opts = TransferOptions { operation: TransferOperation::Copy, ..Default::default() };
        engine.execute(&source, &destination, &opts).await.unwrap();

        assert!(source.exists());
        assert!(destination.exists());
    }

    #[tokio::test]
    async fn missing_source_fails() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("missing.mkv");
        let destination = dir.path().join("destination.mkv");

        let engine = build_engine(BackendKind::Native);
        let opts = TransferOptions::default();
        let result = engine.execute(&source, &destination, &opts).await;
        assert!(result.is_err());
    }
}
