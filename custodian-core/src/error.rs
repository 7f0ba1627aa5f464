use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide error type covering every fallible operation in the ingest pipeline.
///
/// Variants line up with the taxonomy the orchestrator uses to decide whether to retry,
/// skip, defer, or merely log-and-continue.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("rejected {path}: {reason}")]
    Classification { path: PathBuf, reason: String },

    #[error("health gate failed for {path}: {reason}")]
    HealthGate { path: PathBuf, reason: String },

    #[error("transfer stalled after {0:?} with no progress")]
    TransferTimeout(std::time::Duration),

    #[error("transfer failed for {source} -> {destination}: {reason}")]
    TransferFailed {
        source: PathBuf,
        destination: PathBuf,
        reason: String,
    },

    #[error("path is locked for playback: {0}")]
    Locked(PathBuf),

    #[error("notification failed: {0}")]
    Notification(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;
