//! Domain types for the poddigest pipeline.
//!
//! - EpisodeRecord: the persisted per-episode state, keyed by guid
//! - EpisodePatch: a partial update merged into a record
//! - FeedEntry: a normalized feed entry produced by discovery

pub mod episode;

pub use episode::{EpisodePatch, EpisodeRecord, FeedEntry};
