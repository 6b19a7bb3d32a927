//! Core processing logic.
//!
//! This module contains:
//! - StateStore: crash-safe episode state persistence
//! - CallPolicy: retry/backoff/timeout wrapper for external calls
//! - Downloader: byte-capped streaming download
//! - EpisodePipeline: per-episode stage orchestration

pub mod download;
pub mod pipeline;
pub mod retry;
pub mod state_store;

// Re-export commonly used types
pub use download::{DownloadError, Downloader};
pub use pipeline::{EpisodePipeline, PipelineOptions, ProcessedEpisode, Transcript};
pub use retry::CallPolicy;
pub use state_store::{JsonStateStore, MemoryStore, StateStore};
