//! Ingest pipeline for a media-library custodian daemon: watch landing directories for freshly
//! downloaded video files, classify each as a movie or TV episode, compute its canonical
//! Jellyfin-style destination, transfer it with verified semantics, and coordinate post-move
//! side effects (peer notifications, activity logging, playback-aware deferral).

pub mod activity;
pub mod classifier;
pub mod debounce;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod peers;
pub mod playback;
pub mod stats;
pub mod sweeper;
pub mod transfer;
pub mod watcher;

pub use error::{IngestError, Result};
