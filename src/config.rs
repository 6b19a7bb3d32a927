//! Configuration for the digest run.
//!
//! Sources (highest priority first):
//! 1. Environment variables (MAX_EPISODE_AGE_DAYS, ASR_ENABLED, SMTP_*, ...)
//! 2. The feeds file (feeds.yaml: a YAML list of URLs or {url, force_latest})
//! 3. Defaults
//!
//! The resolved `Settings` value is passed into the core explicitly; there
//! is no global configuration state, which keeps the store and pipeline
//! injectable in tests.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::adapters::mailer::{parse_recipients, MailSettings};
use crate::core::retry::CallPolicy;
use crate::ingest::feeds::FeedSource;

/// Resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub feeds: Vec<FeedSource>,

    /// State file location ($PODDIGEST_HOME/state.json)
    pub state_path: PathBuf,

    /// Rendered digest location ($PODDIGEST_HOME/preview.html)
    pub preview_path: PathBuf,

    /// Episodes older than this are skipped at discovery time
    pub max_episode_age: chrono::Duration,

    /// Global force-latest default; per-feed values override it
    pub force_latest_n: usize,

    pub asr_enabled: bool,

    /// Hard cap on a single audio download
    pub max_download_bytes: u64,

    /// Per-request download timeout
    pub download_timeout: Duration,

    pub transcription_model: String,
    pub summary_model: String,

    /// Retry policy for summarization calls
    pub llm: CallPolicy,

    /// None when the SMTP surface is incomplete; delivery is then skipped
    pub mail: Option<MailSettings>,

    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,

    pub smoke: bool,
    pub dry_run: bool,
}

impl Settings {
    /// Load settings from the environment plus the feeds file.
    pub fn load(feeds_path: Option<&Path>) -> Result<Self> {
        let home = home_dir()?;
        let feeds_path = feeds_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| home.join("feeds.yaml"));
        let feeds = load_feeds_file(&feeds_path)?;

        let max_age_days: i64 = env_parsed("MAX_EPISODE_AGE_DAYS", 7)?;
        let max_download_mb: u64 = env_parsed("ASR_MAX_DOWNLOAD_MB", 100)?;

        Ok(Self {
            feeds,
            state_path: home.join("state.json"),
            preview_path: home.join("preview.html"),
            max_episode_age: chrono::Duration::days(max_age_days),
            force_latest_n: env_parsed("FORCE_LATEST_N", 0usize)?,
            asr_enabled: env_flag("ASR_ENABLED"),
            max_download_bytes: max_download_mb * 1024 * 1024,
            download_timeout: Duration::from_secs(30),
            transcription_model: std::env::var("MODEL_ASR")
                .unwrap_or_else(|_| "gpt-4o-mini-transcribe".to_string()),
            summary_model: std::env::var("MODEL_TEXT")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            llm: CallPolicy {
                // retries on top of the first attempt
                max_attempts: env_parsed::<u32>("LLM_RETRIES", 2)? + 1,
                timeout_seconds: env_parsed("LLM_TIMEOUT_S", 60)?,
                backoff_base_seconds: env_parsed("LLM_BACKOFF_S", 2.0)?,
            },
            mail: mail_settings()?,
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_base_url: std::env::var("OPENAI_BASE_URL").ok(),
            smoke: env_flag("SMOKE_TEST"),
            dry_run: env_flag("DRY_RUN"),
        })
    }
}

/// State directory: $PODDIGEST_HOME or ~/.poddigest.
pub fn home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("PODDIGEST_HOME") {
        return Ok(PathBuf::from(home));
    }
    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".poddigest"))
}

/// Parse the feeds file. A missing file is not an error here; the run
/// aborts with an explanatory message when the list ends up empty.
pub fn load_feeds_file(path: &Path) -> Result<Vec<FeedSource>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read feeds file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse feeds file: {}", path.display()))
}

/// Assemble mail settings; None when the required surface (host, from, to)
/// is incomplete.
fn mail_settings() -> Result<Option<MailSettings>> {
    let host = std::env::var("SMTP_HOST").ok();
    let user = std::env::var("SMTP_USER").ok();
    let from = std::env::var("MAIL_FROM").ok().or_else(|| user.clone());
    let to = std::env::var("MAIL_TO")
        .ok()
        .map(|raw| parse_recipients(&raw))
        .unwrap_or_default();

    let (host, from) = match (host, from) {
        (Some(host), Some(from)) if !to.is_empty() => (host, from),
        _ => return Ok(None),
    };

    Ok(Some(MailSettings {
        host,
        port: env_parsed("SMTP_PORT", 587)?,
        user,
        password: std::env::var("SMTP_PASSWORD").ok(),
        from,
        to,
        subject: std::env::var("MAIL_SUBJECT")
            .unwrap_or_else(|_| "Daily Podcast Digest".to_string()),
        timeout_seconds: env_parsed("SMTP_TIMEOUT", 20)?,
        retries: env_parsed("SMTP_RETRIES", 2)?,
    }))
}

/// Parse an environment variable, falling back to `default` when unset.
/// A set-but-unparsable value is a configuration error, not a silent default.
fn env_parsed<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

/// Boolean env flag: "1" means enabled, anything else (or unset) disabled.
fn env_flag(key: &str) -> bool {
    std::env::var(key).map(|v| v == "1").unwrap_or(false)
}
