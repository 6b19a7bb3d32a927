//! Per-episode processing pipeline.
//!
//! For each discovered episode the pipeline merges metadata into the state
//! store, then drives the optional stages: download -> transcribe ->
//! summarize. Progress is merged into the store after every stage, so a
//! crash or restart resumes instead of repeating paid work. A stage failure
//! is recovered as "stage skipped": the episode still reaches the digest
//! with whatever fields it accumulated.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::adapters::{Summarizer, Transcriber};
use crate::core::download::Downloader;
use crate::core::retry::CallPolicy;
use crate::core::state_store::StateStore;
use crate::domain::{EpisodePatch, EpisodeRecord, FeedEntry};

/// Pipeline configuration, resolved from the settings surface.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Master switch for the download + transcription stage
    pub asr_enabled: bool,
    /// Skip every paid external call; episodes go straight from metadata
    /// persistence to the digest. Used for dry validation.
    pub smoke: bool,
    pub transcription_model: String,
    pub summary_model: String,
    /// Retry policy for summarization calls
    pub llm: CallPolicy,
}

/// A processed episode, ready for digest assembly.
#[derive(Debug, Clone)]
pub struct ProcessedEpisode {
    pub guid: String,
    pub record: EpisodeRecord,
}

/// Transcript for an episode, flagged by origin.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    /// True when the text was reused from the store instead of transcribed
    pub cached: bool,
}

/// Drives the per-episode state machine. Episodes are processed strictly
/// sequentially; the store's merge primitive assumes a single writer.
pub struct EpisodePipeline {
    store: Arc<dyn StateStore>,
    transcriber: Arc<dyn Transcriber>,
    summarizer: Arc<dyn Summarizer>,
    downloader: Downloader,
    options: PipelineOptions,
}

impl EpisodePipeline {
    pub fn new(
        store: Arc<dyn StateStore>,
        transcriber: Arc<dyn Transcriber>,
        summarizer: Arc<dyn Summarizer>,
        downloader: Downloader,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            transcriber,
            summarizer,
            downloader,
            options,
        }
    }

    /// Process every discovered episode in order. Individual episode
    /// failures are recovered; the run always produces whatever succeeded.
    pub async fn process_all(&self, entries: Vec<FeedEntry>) -> Result<Vec<ProcessedEpisode>> {
        let mut processed = Vec::with_capacity(entries.len());

        for entry in &entries {
            match self.process_episode(entry).await {
                Ok(episode) => processed.push(episode),
                Err(e) => {
                    warn!(guid = %entry.guid, error = %e, "episode abandoned");
                }
            }
        }

        Ok(processed)
    }

    /// Run one episode through the state machine.
    #[instrument(skip(self, entry), fields(guid = %entry.guid))]
    pub async fn process_episode(&self, entry: &FeedEntry) -> Result<ProcessedEpisode> {
        // Metadata is persisted unconditionally, first.
        self.store
            .merge(&entry.guid, EpisodePatch::metadata(entry))
            .await
            .context("Failed to persist episode metadata")?;

        if self.options.smoke {
            info!("smoke mode: skipping external calls");
            return self.digest_ready(&entry.guid).await;
        }

        let transcript = if self.options.asr_enabled {
            match &entry.audio_url {
                Some(url) => self.transcribe_episode(&entry.guid, url).await,
                None => None,
            }
        } else {
            None
        };

        match transcript {
            Some(transcript) => {
                // Summarizing: recomputed unconditionally, even for a
                // cached transcript. See DESIGN.md on this asymmetry.
                self.summarize_into(&entry.guid, &transcript.text).await;
            }
            None => {
                // SummaryFromFeed: keep the feed's own text, then summarize it.
                if let Some(summary) = &entry.summary {
                    self.store
                        .merge(&entry.guid, EpisodePatch::summary(summary.clone()))
                        .await
                        .context("Failed to persist feed summary")?;
                    self.summarize_into(&entry.guid, summary).await;
                }
            }
        }

        self.digest_ready(&entry.guid).await
    }

    /// Download and transcribe one episode's audio.
    ///
    /// A transcript already in the store is reused without touching the
    /// network: a second line of defense beyond the dedup filter, relevant
    /// when an episode is re-discovered under a fallback identity. Any
    /// failure is a warned skip (the episode stays transcript-less and is
    /// retryable on the next run).
    async fn transcribe_episode(&self, guid: &str, audio_url: &str) -> Option<Transcript> {
        match self.store.get(guid).await {
            Ok(Some(record)) if record.has_transcript() => {
                info!(cached = true, "reusing stored transcript");
                return record.transcript.map(|text| Transcript { text, cached: true });
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "state read failed, skipping transcription");
                return None;
            }
        }

        let audio = match self.downloader.fetch_to_temp(audio_url).await {
            Ok(path) => path,
            Err(e) => {
                warn!(url = audio_url, error = %e, "audio download failed, skipping transcription");
                return None;
            }
        };

        // `audio` is dropped (and the file deleted) on every path below.
        let text = match self
            .transcriber
            .transcribe(&audio, &self.options.transcription_model)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "transcription failed, skipping");
                return None;
            }
        };

        if let Err(e) = self
            .store
            .merge(guid, EpisodePatch::transcript(text.clone()))
            .await
        {
            warn!(error = %e, "failed to persist transcript");
            return None;
        }

        info!(cached = false, chars = text.len(), "transcript stored");
        Some(Transcript { text, cached: false })
    }

    /// Summarize `text` under the retry policy and merge the result as
    /// `summary_ai`. Failure after retries is a warned skip.
    async fn summarize_into(&self, guid: &str, text: &str) {
        let summary = self
            .options
            .llm
            .run("summarization", || {
                self.summarizer.summarize(text, &self.options.summary_model)
            })
            .await;

        match summary {
            Ok(summary) => {
                if let Err(e) = self
                    .store
                    .merge(guid, EpisodePatch::summary_ai(summary))
                    .await
                {
                    warn!(error = %e, "failed to persist summary");
                }
            }
            Err(e) => {
                warn!(error = %e, "summarization failed, skipping");
            }
        }
    }

    /// Terminal state: fetch the episode's full record for the digest.
    async fn digest_ready(&self, guid: &str) -> Result<ProcessedEpisode> {
        let record = self
            .store
            .get(guid)
            .await?
            .with_context(|| format!("Episode record vanished from store: {}", guid))?;

        Ok(ProcessedEpisode {
            guid: guid.to_string(),
            record,
        })
    }
}
