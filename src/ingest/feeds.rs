//! Feed fetching, entry normalization, and dedup/age filtering.
//!
//! Discovery walks the configured feeds in order, normalizes each entry to
//! a `FeedEntry`, and keeps the ones that are both unseen (guid not in the
//! state store) and within the recency window. A failing feed is skipped
//! with a warning; it never aborts the other feeds.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use feed_rs::model::{Entry, Feed};
use serde::Deserialize;
use tracing::{info, warn};

use crate::core::state_store::StateStore;
use crate::domain::{EpisodeRecord, FeedEntry};

/// One configured feed. The feeds file accepts either a bare URL string or
/// a map with a per-feed `force_latest` override.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FeedSource {
    Url(String),
    Detailed {
        url: String,
        #[serde(default)]
        force_latest: Option<usize>,
    },
}

impl FeedSource {
    pub fn url(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::Detailed { url, .. } => url,
        }
    }

    /// Per-feed override; falls back to the global default when unset.
    pub fn force_latest(&self, default_n: usize) -> usize {
        match self {
            Self::Url(_) => default_n,
            Self::Detailed { force_latest, .. } => force_latest.unwrap_or(default_n),
        }
    }
}

/// Filtering knobs for one discovery pass.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Entries older than this are skipped (unknown age always passes)
    pub max_age: Duration,
    /// When > 0: take the first N entries of each feed, in feed order,
    /// bypassing the age filter. An explicit backfill escape hatch.
    pub force_latest_n: usize,
}

/// Fetches and parses remote feeds.
pub struct FeedFetcher {
    client: reqwest::Client,
}

impl FeedFetcher {
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build feed HTTP client")?;
        Ok(Self { client })
    }

    /// Fetch one feed and normalize its entries, preserving entry order.
    pub async fn fetch(&self, url: &str) -> Result<Vec<FeedEntry>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch feed: {}", url))?
            .error_for_status()
            .with_context(|| format!("Feed returned error status: {}", url))?;

        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read feed body: {}", url))?;

        let feed = feed_rs::parser::parse(body.as_ref())
            .with_context(|| format!("Failed to parse feed: {}", url))?;

        Ok(normalize_feed(feed))
    }

    /// Discover the ordered list of new episodes across all feeds.
    ///
    /// Output preserves feed iteration order, then entry order within each
    /// feed; there is no cross-feed interleaving or sorting by publish time.
    pub async fn discover(
        &self,
        sources: &[FeedSource],
        store: &dyn StateStore,
        options: &DiscoveryOptions,
    ) -> Result<Vec<FeedEntry>> {
        let existing = store.list().await?;
        let now = Utc::now();
        let mut discovered = Vec::new();

        for source in sources {
            let entries = match self.fetch(source.url()).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(url = source.url(), error = %e, "skipping feed");
                    continue;
                }
            };

            let per_feed = DiscoveryOptions {
                max_age: options.max_age,
                force_latest_n: source.force_latest(options.force_latest_n),
            };
            let fresh = filter_new(entries, &existing, now, &per_feed);

            info!(url = source.url(), count = fresh.len(), "discovered new episodes");
            discovered.extend(fresh);
        }

        Ok(discovered)
    }
}

/// Normalize parsed feed entries, dropping entries with no derivable guid.
pub fn normalize_feed(feed: Feed) -> Vec<FeedEntry> {
    let feed_title = feed.title.map(|t| t.content);

    feed.entries
        .into_iter()
        .filter_map(|entry| normalize_entry(entry, feed_title.clone()))
        .collect()
}

fn normalize_entry(entry: Entry, feed_title: Option<String>) -> Option<FeedEntry> {
    let guid = derive_guid(&entry)?;

    let link = entry.links.first().map(|l| l.href.clone());
    let audio_url = entry_audio_url(&entry);
    let published = entry.published.or(entry.updated);
    let summary = entry
        .summary
        .map(|s| s.content)
        .filter(|s| !s.is_empty());

    Some(FeedEntry {
        guid,
        title: entry.title.map(|t| t.content),
        link,
        published,
        audio_url,
        summary,
        feed: feed_title,
    })
}

/// Derive the stable episode identity. First non-empty wins:
/// entry id (covers both RSS guid and Atom id) -> first link href ->
/// first enclosure URL -> title.
fn derive_guid(entry: &Entry) -> Option<String> {
    if !entry.id.is_empty() {
        return Some(entry.id.clone());
    }
    if let Some(link) = entry.links.first() {
        if !link.href.is_empty() {
            return Some(link.href.clone());
        }
    }
    if let Some(url) = entry_audio_url(entry) {
        return Some(url);
    }
    entry
        .title
        .as_ref()
        .map(|t| t.content.clone())
        .filter(|t| !t.is_empty())
}

/// Resolve the enclosure location: media content first, then any link
/// declaring an audio media type.
fn entry_audio_url(entry: &Entry) -> Option<String> {
    entry
        .media
        .iter()
        .flat_map(|m| m.content.iter())
        .find_map(|c| c.url.as_ref().map(|u| u.to_string()))
        .or_else(|| {
            entry
                .links
                .iter()
                .find(|l| {
                    l.media_type
                        .as_deref()
                        .is_some_and(|t| t.starts_with("audio"))
                })
                .map(|l| l.href.clone())
        })
}

/// Keep the entries that are unseen and within the age window.
///
/// An entry is new iff its guid is not already a key in the store. It
/// additionally passes the age filter iff its published timestamp is absent
/// (unknown age is always included) or its age does not exceed `max_age`.
/// `force_latest_n > 0` restricts the feed to its first N entries and
/// bypasses the age filter for them; dedup still applies.
pub fn filter_new(
    entries: Vec<FeedEntry>,
    existing: &BTreeMap<String, EpisodeRecord>,
    now: DateTime<Utc>,
    options: &DiscoveryOptions,
) -> Vec<FeedEntry> {
    let forced = options.force_latest_n > 0;
    let considered: Vec<FeedEntry> = if forced {
        entries.into_iter().take(options.force_latest_n).collect()
    } else {
        entries
    };

    considered
        .into_iter()
        .filter(|entry| !existing.contains_key(&entry.guid))
        .filter(|entry| {
            if forced {
                return true;
            }
            match entry.published {
                Some(published) => now - published <= options.max_age,
                None => true,
            }
        })
        .collect()
}
