//! poddigest - podcast digest pipeline
//!
//! Ingests podcast RSS/Atom feeds, identifies episodes not previously seen,
//! optionally downloads and transcribes their audio, summarizes them, and
//! assembles an HTML digest for delivery.
//!
//! # Architecture
//!
//! The system is built around a merge-only episode state store:
//! - Episode identity (guid) dedups discoveries across runs
//! - Each pipeline stage merges its result into the store as it completes,
//!   so a crash or restart resumes instead of repeating paid work
//! - Snapshot writes are atomic (temp file + fsync + rename)
//!
//! # Modules
//!
//! - `adapters`: External service integrations (OpenAI, SMTP)
//! - `core`: State store, retry adapter, bounded downloader, pipeline
//! - `domain`: Data structures (EpisodeRecord, EpisodePatch, FeedEntry)
//! - `ingest`: Feed fetching and new-episode discovery
//! - `digest`: HTML digest assembly
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Full digest pass
//! poddigest run
//!
//! # Validate control flow without paid calls
//! poddigest run --smoke --dry-run
//!
//! # Inspect stored episodes
//! poddigest episodes
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod digest;
pub mod domain;
pub mod ingest;

// Re-export main types at crate root for convenience
pub use crate::core::{
    CallPolicy, DownloadError, Downloader, EpisodePipeline, JsonStateStore, MemoryStore,
    PipelineOptions, ProcessedEpisode, StateStore, Transcript,
};
pub use crate::domain::{EpisodePatch, EpisodeRecord, FeedEntry};
pub use crate::ingest::{DiscoveryOptions, FeedFetcher, FeedSource};
