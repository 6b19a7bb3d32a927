//! SMTP delivery for the rendered digest.
//!
//! Delivery runs through the shared call adapter and is reported as a
//! boolean: a send failure is a failed delivery, never a crashed run.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info};

use crate::core::retry::CallPolicy;

/// Resolved mail configuration. Absent entirely when the deployment has no
/// complete SMTP setup, in which case delivery is skipped with a message.
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub timeout_seconds: u64,
    pub retries: u32,
}

/// Mail transport boundary; tests substitute a recording mock.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send_html(&self, subject: &str, html: &str, to: &[String]) -> Result<()>;
}

/// lettre-backed SMTP transport with STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(settings: &MailSettings) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .with_context(|| format!("Invalid SMTP relay: {}", settings.host))?
            .port(settings.port)
            .timeout(Some(std::time::Duration::from_secs(settings.timeout_seconds)));

        if let (Some(user), Some(password)) = (&settings.user, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: settings.from.clone(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send_html(&self, subject: &str, html: &str, to: &[String]) -> Result<()> {
        let mut builder = Message::builder()
            .from(self.from.parse().context("Invalid MAIL_FROM address")?)
            .subject(subject)
            .header(ContentType::TEXT_HTML);

        for recipient in to {
            builder = builder.to(recipient
                .parse()
                .with_context(|| format!("Invalid recipient address: {}", recipient))?);
        }

        let message = builder
            .body(html.to_string())
            .context("Failed to build mail message")?;

        self.transport
            .send(message)
            .await
            .context("SMTP send failed")?;

        Ok(())
    }
}

/// Send the digest with retries, reduced to a success flag.
pub async fn deliver(
    transport: &dyn MailTransport,
    settings: &MailSettings,
    html: &str,
) -> bool {
    let policy = CallPolicy {
        max_attempts: settings.retries + 1,
        timeout_seconds: settings.timeout_seconds,
        backoff_base_seconds: 2.0,
    };

    let result = policy
        .run("mail delivery", || {
            transport.send_html(&settings.subject, html, &settings.to)
        })
        .await;

    match result {
        Ok(()) => {
            info!(recipients = settings.to.len(), "digest delivered");
            true
        }
        Err(e) => {
            error!(error = %e, "digest delivery failed");
            false
        }
    }
}

/// Split a comma-separated recipient list, dropping empty items.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Transport that starts failing and succeeds from `succeed_from` on
    /// (0 = never), counting every attempt.
    struct FlakyTransport {
        calls: AtomicU32,
        succeed_from: u32,
    }

    impl FlakyTransport {
        fn new(succeed_from: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                succeed_from,
            }
        }
    }

    #[async_trait]
    impl MailTransport for FlakyTransport {
        async fn send_html(&self, _subject: &str, _html: &str, _to: &[String]) -> Result<()> {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.succeed_from > 0 && attempt >= self.succeed_from {
                Ok(())
            } else {
                anyhow::bail!("relay refused connection");
            }
        }
    }

    fn settings(retries: u32) -> MailSettings {
        MailSettings {
            host: "smtp.example.com".to_string(),
            port: 587,
            user: None,
            password: None,
            from: "digest@example.com".to_string(),
            to: vec!["reader@example.com".to_string()],
            subject: "Daily Podcast Digest".to_string(),
            timeout_seconds: 5,
            retries,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deliver_reports_false_after_exhausting_retries() {
        let transport = FlakyTransport::new(0);
        let delivered = deliver(&transport, &settings(2), "<html/>").await;

        assert!(!delivered);
        // retries on top of the first attempt
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deliver_succeeds_on_retry() {
        let transport = FlakyTransport::new(2);
        let delivered = deliver(&transport, &settings(2), "<html/>").await;

        assert!(delivered);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_parse_recipients() {
        assert_eq!(
            parse_recipients("a@example.com, b@example.com,,  "),
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
        assert!(parse_recipients("").is_empty());
    }
}
