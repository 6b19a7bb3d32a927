//! Episode state records and merge-only updates.
//!
//! A record is identified by its guid, which is the key in the state store
//! and never stored inside the record itself. Records are only ever merged
//! into, field by field; they are never replaced or deleted within a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted state for one episode.
///
/// Every field is optional and omitted from the serialized form when absent.
/// Unknown fields written by a newer version are preserved through the
/// flattened `extra` map so that reading and rewriting the state file never
/// drops data it does not understand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// Episode title from the feed (overwritten on every discovery)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Episode page link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    /// Title of the feed the episode came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed: Option<String>,

    /// Publish timestamp, normalized to UTC at discovery time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,

    /// Resolved enclosure location, if the feed declared one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,

    /// Transcript text. Once non-empty this is immutable ground truth:
    /// its presence is the cache key that skips re-download and
    /// re-transcription.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,

    /// Summary sourced directly from the feed (no API cost)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Summary produced by the summarization service. Unlike `transcript`,
    /// this is recomputed and overwritten on every pass through the
    /// summarization stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_ai: Option<String>,

    /// Fields this version does not know about, carried through verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EpisodeRecord {
    /// Whether a usable transcript is already stored.
    pub fn has_transcript(&self) -> bool {
        self.transcript.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Best available summary text for digest rendering.
    pub fn display_summary(&self) -> Option<&str> {
        self.summary_ai.as_deref().or(self.summary.as_deref())
    }

    /// Shallow-merge a patch into this record. `Some` fields overwrite,
    /// `None` fields leave the existing value untouched.
    pub fn apply(&mut self, patch: EpisodePatch) {
        if let Some(title) = patch.title {
            self.title = Some(title);
        }
        if let Some(link) = patch.link {
            self.link = Some(link);
        }
        if let Some(feed) = patch.feed {
            self.feed = Some(feed);
        }
        if let Some(published) = patch.published {
            self.published = Some(published);
        }
        if let Some(audio_url) = patch.audio_url {
            self.audio_url = Some(audio_url);
        }
        if let Some(transcript) = patch.transcript {
            self.transcript = Some(transcript);
        }
        if let Some(summary) = patch.summary {
            self.summary = Some(summary);
        }
        if let Some(summary_ai) = patch.summary_ai {
            self.summary_ai = Some(summary_ai);
        }
    }
}

/// Partial update for an episode record.
#[derive(Debug, Clone, Default)]
pub struct EpisodePatch {
    pub title: Option<String>,
    pub link: Option<String>,
    pub feed: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub audio_url: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub summary_ai: Option<String>,
}

impl EpisodePatch {
    /// Patch carrying the descriptive metadata of a discovered entry.
    pub fn metadata(entry: &FeedEntry) -> Self {
        Self {
            title: entry.title.clone(),
            link: entry.link.clone(),
            feed: entry.feed.clone(),
            published: entry.published,
            audio_url: entry.audio_url.clone(),
            ..Default::default()
        }
    }

    pub fn transcript(text: impl Into<String>) -> Self {
        Self {
            transcript: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn summary(text: impl Into<String>) -> Self {
        Self {
            summary: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn summary_ai(text: impl Into<String>) -> Self {
        Self {
            summary_ai: Some(text.into()),
            ..Default::default()
        }
    }
}

/// A feed entry normalized for the pipeline, produced by discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    /// Stable episode identity (see `ingest::feeds::derive_guid`)
    pub guid: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub audio_url: Option<String>,
    /// Summary/description text provided by the feed itself
    pub summary: Option<String>,
    /// Title of the feed this entry came from
    pub feed: Option<String>,
}
