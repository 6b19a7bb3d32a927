//! OpenAI-compatible API client for transcription and summarization.
//!
//! Responses are parsed against explicit schemas per endpoint; a response
//! with no usable text is an error, not a silent empty result.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use super::{Summarizer, Transcriber};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SUMMARY_PROMPT: &str = "You are an assistant that creates concise podcast episode summaries.\n\
Provide a short summary (2-4 sentences) and 3-5 bullet key takeaways.\n\
Input text:\n";

/// Client for the chat-completions and audio-transcriptions endpoints.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Point the client at a different endpoint (tests, proxies).
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// One chat-completion round trip. Fails explicitly when the response
    /// carries no usable text.
    async fn chat(&self, model: &str, prompt: String) -> Result<String> {
        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send chat completion request")?
            .error_for_status()
            .context("Chat completion request rejected")?;

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .context("Chat completion response contained no usable text")
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    async fn transcribe(&self, audio: &Path, model: &str) -> Result<String> {
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "episode.audio".to_string());

        let file_bytes = tokio::fs::read(audio)
            .await
            .with_context(|| format!("Failed to read audio file: {}", audio.display()))?;

        let file_part = Part::bytes(file_bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;

        let form = Form::new()
            .text("model", model.to_string())
            .part("file", file_part);

        let response = self
            .client
            .post(self.endpoint("audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Failed to send transcription request")?
            .error_for_status()
            .context("Transcription request rejected")?;

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .context("Failed to parse transcription response")?;

        if parsed.text.trim().is_empty() {
            anyhow::bail!("Transcription response contained no usable text");
        }

        Ok(parsed.text)
    }
}

#[async_trait]
impl Summarizer for OpenAiClient {
    async fn summarize(&self, text: &str, model: &str) -> Result<String> {
        self.chat(model, format!("{}{}", SUMMARY_PROMPT, text)).await
    }
}
