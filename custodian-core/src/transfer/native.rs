//! Native buffered copy backend: reads fixed-size blocks and fsyncs before close. Grounded on the
//! streaming-copy strategy pattern used for cross-volume transfers in media-pipeline codebases.
//!
//! Each blocking read/write is individually raced against the timeout via `tokio::time::timeout`,
//! so a stalled syscall is actually aborted rather than merely logged while the copy loop stays
//! wedged.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{IngestError, Result};

use super::{TransferBackend, TransferOptions};

const BLOCK_SIZE: usize = 32 * 1024 * 1024;
const DEFAULT_CEILING: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Default)]
pub struct NativeBufferedBackend;

#[async_trait]
impl TransferBackend for NativeBufferedBackend {
    fn name(&self) -> &'static str {
        "native-buffered"
    }

    async fn copy(&self, source: &Path, destination: &Path, opts: &TransferOptions) -> Result<u64> {
        let mut src = tokio::fs::File::open(source).await.map_err(IngestError::Io)?;
        let mut dst = tokio::fs::File::create(destination).await.map_err(IngestError::Io)?;

        let watchdog_timeout = if opts.timeout.is_zero() { DEFAULT_CEILING } else { opts.timeout };

        let mut buf = vec![0u8; BLOCK_SIZE];
        let mut total: u64 = 0;
        loop {
            let n = timeout(watchdog_timeout, src.read(&mut buf)).await?.map_err(IngestError::Io)?;
            if n == 0 {
                break;
            }
            timeout(watchdog_timeout, dst.write_all(&buf[..n])).await?.map_err(IngestError::Io)?;
            total += n as u64;
        }
        timeout(watchdog_timeout, dst.flush()).await?.map_err(IngestError::Io)?;
        timeout(watchdog_timeout, dst.sync_all()).await?.map_err(IngestError::Io)?;
        Ok(total)
    }
}

/// Wraps a single block I/O operation with the watchdog deadline; `opts.timeout = 0` already
/// resolved to [`DEFAULT_CEILING`] by the caller, so this always carries a real bound.
async fn timeout<T>(deadline: Duration, fut: impl std::future::Future<Output = T>) -> Result<T> {
    tokio::time::timeout(deadline, fut).await.map_err(|_| IngestError::TransferTimeout(deadline))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{TransferOperation, TransferOptions};
    use tempfile::tempdir;

    #[tokio::test]
    async fn copies_large_block_aligned_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src.mkv");
        let payload = vec![7u8; 1024 * 1024];
        tokio::fs::write(&source, &payload).await.unwrap();
        let destination = dir.path().join("dst.mkv");

        let backend = NativeBufferedBackend;
        let opts = TransferOptions { operation: TransferOperation::Copy, ..Default::default() };
        let bytes = backend.copy(&source, &destination, &opts).await.unwrap();

        assert_eq!(bytes, payload.len() as u64);
        let written = tokio::fs::read(&destination).await.unwrap();
        assert_eq!(written, payload);
    }
}
