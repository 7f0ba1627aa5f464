//! Process-wide atomic counters surfaced by the daemon's `/metrics` endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct Stats {
    movies_processed: AtomicU64,
    tv_processed: AtomicU64,
    bytes_transferred: AtomicU64,
    errors: AtomicU64,
    started_at: Instant,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            movies_processed: AtomicU64::new(0),
            tv_processed: AtomicU64::new(0),
            bytes_transferred: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }
}

impl Stats {
    pub fn record_movie(&self, bytes: u64) {
        self.movies_processed.fetch_add(1, Ordering::Relaxed);
        self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_tv(&self, bytes: u64) {
        self.tv_processed.fetch_add(1, Ordering::Relaxed);
        self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            movies_processed: self.movies_processed.load(Ordering::Relaxed),
            tv_processed: self.tv_processed.load(Ordering::Relaxed),
            bytes_transferred: self.bytes_transferred.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StatsSnapshot {
    pub movies_processed: u64,
    pub tv_processed: u64,
    pub bytes_transferred: u64,
    pub errors: u64,
    pub uptime_secs: u64,
}
