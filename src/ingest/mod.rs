//! Feed ingestion: fetching, normalization, and new-episode discovery.

pub mod feeds;

pub use feeds::{DiscoveryOptions, FeedFetcher, FeedSource};
