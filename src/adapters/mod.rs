//! Adapter interfaces for external services.
//!
//! The pipeline only depends on these traits; the concrete clients live in
//! the submodules so tests can substitute mocks.

pub mod mailer;
pub mod openai;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

pub use mailer::{MailSettings, MailTransport, SmtpMailer};
pub use openai::OpenAiClient;

/// Speech-to-text service: local audio artifact in, transcript text out.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path, model: &str) -> Result<String>;
}

/// Text summarization service.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str, model: &str) -> Result<String>;
}
