//! Backends that shell out to an external file-copy utility (e.g. `rsync`) for native resume
//! support and progress reporting through the process's own stderr stream. The child is killed
//! when the shared watchdog fires.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::{IngestError, Result};

use super::{TransferBackend, TransferOptions};

/// `rsync`-compatible sync mode: supports partial-file resume via `--partial --append-verify`
/// and honors a configurable I/O timeout flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalSyncMode {
    Rsync,
}

impl Default for ExternalSyncMode {
    fn default() -> Self {
        ExternalSyncMode::Rsync
    }
}

#[derive(Debug, Default)]
pub struct ExternalSyncBackend {
    mode: ExternalSyncMode,
}

#[async_trait]
impl TransferBackend for ExternalSyncBackend {
    fn name(&self) -> &'static str {
        "external-sync"
    }

    fn can_resume(&self) -> bool {
        true
    }

    async fn copy(&self, source: &Path, destination: &Path, opts: &TransferOptions) -> Result<u64> {
        let timeout_secs = opts.timeout.as_secs().max(10);
        let mut command = match self.mode {
            ExternalSyncMode::Rsync => {
                let mut cmd = Command::new("rsync");
                cmd.arg("--partial")
                    .arg("--append-verify")
                    .arg(format!("--timeout={timeout_secs}"))
                    .arg("--progress")
                    .arg(source)
                    .arg(destination);
                if let Some(mode) = opts.file_mode {
                    cmd.arg(format!("--chmod=F{mode:o}"));
                }
                cmd
            }
        };

        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = command.spawn().map_err(IngestError::Io)?;
        let pid = child.id().map(|id| id as i32);

        let stderr = child.stderr.take();
        let progress_task = stderr.map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(line = %line, "external sync progress");
                }
            })
        });

        let wait_result = tokio::time::timeout(opts.timeout.max(Duration::from_secs(10)), child.wait()).await;

        if let Some(task) = progress_task {
            let _ = task.await;
        }

        let status = match wait_result {
            Ok(status) => status.map_err(IngestError::Io)?,
            Err(_) => {
                if let Some(pid) = pid {
                    let _ = signal::kill(Pid::from_raw(pid), Signal::SIGKILL);
                }
                return Err(IngestError::TransferTimeout(opts.timeout));
            }
        };

        if !status.success() {
            return Err(IngestError::TransferFailed {
                source: source.to_path_buf(),
                destination: destination.to_path_buf(),
                reason: format!("rsync exited with {status}"),
            });
        }

        let metadata = tokio::fs::metadata(destination).await.map_err(IngestError::Io)?;
        Ok(metadata.len())
    }
}

/// Streams through an external pager (e.g. `cp --sparse=never`) with no resume support; progress
/// is inferred from stderr chatter and the child is killed outright when the watchdog fires.
#[derive(Debug, Default)]
pub struct ExternalStreamingBackend;

#[async_trait]
impl TransferBackend for ExternalStreamingBackend {
    fn name(&self) -> &'static str {
        "external-streaming"
    }

    async fn copy(&self, source: &Path, destination: &Path, opts: &TransferOptions) -> Result<u64> {
        let mut command = Command::new("cp");
        command.arg("--preserve=timestamps").arg(source).arg(destination);
        command.stdout(Stdio::null()).stderr(Stdio::piped());

        let mut child = command.spawn().map_err(IngestError::Io)?;
        let pid = child.id().map(|id| id as i32);
        let stderr = child.stderr.take();
        let progress_task = stderr.map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(line = %line, "external streaming progress");
                }
            })
        });

        let wait_result = tokio::time::timeout(opts.timeout.max(Duration::from_secs(10)), child.wait()).await;
        if let Some(task) = progress_task {
            let _ = task.await;
        }

        let status = match wait_result {
            Ok(status) => status.map_err(IngestError::Io)?,
            Err(_) => {
                if let Some(pid) = pid {
                    let _ = signal::kill(Pid::from_raw(pid), Signal::SIGKILL);
                }
                return Err(IngestError::TransferTimeout(opts.timeout));
            }
        };

        if !status.success() {
            return Err(IngestError::TransferFailed {
                source: source.to_path_buf(),
                destination: destination.to_path_buf(),
                reason: format!("copy process exited with {status}"),
            });
        }

        let metadata = tokio::fs::metadata(destination).await.map_err(IngestError::Io)?;
        Ok(metadata.len())
    }
}
