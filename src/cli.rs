//! Command-line interface for poddigest.
//!
//! Provides commands for running a digest pass, inspecting stored
//! episodes, re-sending a preview, and dumping the resolved configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::adapters::mailer::{deliver, SmtpMailer};
use crate::adapters::OpenAiClient;
use crate::config::Settings;
use crate::core::{Downloader, EpisodePipeline, JsonStateStore, PipelineOptions, StateStore};
use crate::digest;
use crate::ingest::feeds::{DiscoveryOptions, FeedFetcher};

/// poddigest - podcast digest pipeline
#[derive(Parser, Debug)]
#[command(name = "poddigest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover new episodes, process them, and assemble the digest
    Run {
        /// Feeds file (defaults to $PODDIGEST_HOME/feeds.yaml)
        #[arg(long)]
        feeds: Option<PathBuf>,

        /// Produce the digest but do not send mail
        #[arg(long)]
        dry_run: bool,

        /// Skip all paid external calls (control-flow validation)
        #[arg(long)]
        smoke: bool,

        /// Force-include the latest N entries of every feed
        #[arg(long)]
        force_latest: Option<usize>,
    },

    /// List stored episode records
    Episodes {
        /// Maximum number of episodes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Send an existing preview file
    Send {
        /// Preview file (defaults to $PODDIGEST_HOME/preview.html)
        #[arg(long)]
        preview: Option<PathBuf>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                feeds,
                dry_run,
                smoke,
                force_latest,
            } => {
                let mut settings = Settings::load(feeds.as_deref())?;
                settings.dry_run |= dry_run;
                settings.smoke |= smoke;
                if let Some(n) = force_latest {
                    settings.force_latest_n = n;
                }
                run_digest(settings).await
            }

            Commands::Episodes { limit } => {
                let settings = Settings::load(None)?;
                list_episodes(&settings, limit).await
            }

            Commands::Send { preview } => {
                let settings = Settings::load(None)?;
                let path = preview.unwrap_or_else(|| settings.preview_path.clone());
                send_preview(&settings, &path).await
            }

            Commands::Config => {
                let settings = Settings::load(None)?;
                print_config(&settings);
                Ok(())
            }
        }
    }
}

/// One full digest pass: discover, process, render, deliver.
async fn run_digest(settings: Settings) -> Result<()> {
    if settings.feeds.is_empty() {
        println!("No feeds configured (feeds.yaml)");
        return Ok(());
    }

    if settings.smoke {
        info!("smoke mode enabled: skipping transcription and summarization");
    }

    let store: Arc<dyn StateStore> = Arc::new(JsonStateStore::new(&settings.state_path));

    let fetcher = FeedFetcher::new(std::time::Duration::from_secs(30))?;
    let discovered = fetcher
        .discover(
            &settings.feeds,
            store.as_ref(),
            &DiscoveryOptions {
                max_age: settings.max_episode_age,
                force_latest_n: settings.force_latest_n,
            },
        )
        .await?;

    info!(count = discovered.len(), "discovered new episodes");

    let api_key = settings.openai_api_key.clone().unwrap_or_default();
    let client = Arc::new(match &settings.openai_base_url {
        Some(base) => OpenAiClient::with_base_url(api_key, base.clone()),
        None => OpenAiClient::new(api_key),
    });

    let downloader = Downloader::new(settings.max_download_bytes, settings.download_timeout)?;

    let pipeline = EpisodePipeline::new(
        store,
        client.clone(),
        client,
        downloader,
        PipelineOptions {
            asr_enabled: settings.asr_enabled,
            smoke: settings.smoke,
            transcription_model: settings.transcription_model.clone(),
            summary_model: settings.summary_model.clone(),
            llm: settings.llm.clone(),
        },
    );

    let processed = pipeline.process_all(discovered).await?;

    let Some(html) = digest::render(&processed) else {
        println!("No episodes processed; digest withheld");
        return Ok(());
    };

    digest::write_preview(&settings.preview_path, &html).await?;
    println!(
        "Processed {} episodes; preview written to {}",
        processed.len(),
        settings.preview_path.display()
    );

    if settings.dry_run {
        println!("Dry run - no mail sent");
        return Ok(());
    }

    match &settings.mail {
        Some(mail) => {
            let mailer = SmtpMailer::new(mail)?;
            if !deliver(&mailer, mail, &html).await {
                println!("Digest delivery failed");
            }
        }
        None => {
            warn!("SMTP config incomplete (SMTP_HOST, MAIL_FROM, MAIL_TO); skipping delivery");
        }
    }

    Ok(())
}

async fn list_episodes(settings: &Settings, limit: usize) -> Result<()> {
    let store = JsonStateStore::new(&settings.state_path);
    let episodes = store.list().await?;

    if episodes.is_empty() {
        println!("No episodes in state");
        return Ok(());
    }

    for (guid, record) in episodes.iter().take(limit) {
        let title = record.title.as_deref().unwrap_or("(untitled)");
        let mut stages = Vec::new();
        if record.has_transcript() {
            stages.push("transcript");
        }
        if record.summary.is_some() {
            stages.push("summary");
        }
        if record.summary_ai.is_some() {
            stages.push("summary_ai");
        }
        println!("{} - {} [{}]", guid, title, stages.join(", "));
    }

    Ok(())
}

async fn send_preview(settings: &Settings, path: &std::path::Path) -> Result<()> {
    let html = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Preview file not found: {}", path.display()))?;

    match &settings.mail {
        Some(mail) => {
            let mailer = SmtpMailer::new(mail)?;
            if deliver(&mailer, mail, &html).await {
                println!("Sent");
            } else {
                println!("Send failed");
            }
            Ok(())
        }
        None => {
            println!("SMTP config incomplete (SMTP_HOST, MAIL_FROM, MAIL_TO)");
            Ok(())
        }
    }
}

fn print_config(settings: &Settings) {
    println!("state:          {}", settings.state_path.display());
    println!("preview:        {}", settings.preview_path.display());
    println!("feeds:          {}", settings.feeds.len());
    for feed in &settings.feeds {
        println!("  - {}", feed.url());
    }
    println!("max age (days): {}", settings.max_episode_age.num_days());
    println!("force latest:   {}", settings.force_latest_n);
    println!("asr enabled:    {}", settings.asr_enabled);
    println!("download cap:   {} bytes", settings.max_download_bytes);
    println!("asr model:      {}", settings.transcription_model);
    println!("text model:     {}", settings.summary_model);
    println!(
        "llm policy:     {} attempts, {}s timeout, base {}",
        settings.llm.max_attempts, settings.llm.timeout_seconds, settings.llm.backoff_base_seconds
    );
    println!("mail:           {}", if settings.mail.is_some() { "configured" } else { "incomplete" });
    println!("smoke:          {}", settings.smoke);
    println!("dry run:        {}", settings.dry_run);
}
