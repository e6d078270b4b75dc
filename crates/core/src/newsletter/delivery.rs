use crate::config::Settings;
use anyhow::Context;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 60;

#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    /// `true` once the transport accepted the message. Failures are logged, never returned.
    async fn deliver(&self, recipient: &str, subject: &str, html: &str) -> bool;
}

/// One SMTP session per delivery: connect, STARTTLS, AUTH, send, close.
pub struct SmtpMailer {
    inner: Option<SmtpSession>,
}

struct SmtpSession {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Without both `EMAIL_SENDER` and `EMAIL_PASSWORD` the mailer is built unconfigured and
    /// every delivery fails immediately.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let (Some(sender), Some(password)) = (
            settings.email_sender.as_deref(),
            settings.email_password.as_deref(),
        ) else {
            tracing::error!("email configuration incomplete; set EMAIL_SENDER and EMAIL_PASSWORD");
            return Ok(Self::unconfigured());
        };

        let host = settings
            .smtp_server
            .as_deref()
            .unwrap_or(DEFAULT_SMTP_SERVER);
        let port = settings.smtp_port.unwrap_or(DEFAULT_SMTP_PORT);
        let timeout_secs = crate::config::env_or("SMTP_TIMEOUT_SECS", DEFAULT_SMTP_TIMEOUT_SECS);

        let from: Mailbox = sender
            .parse()
            .with_context(|| format!("EMAIL_SENDER is not a valid address: {sender}"))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .with_context(|| format!("invalid SMTP relay: {host}"))?
            .port(port)
            .credentials(Credentials::new(sender.to_string(), password.to_string()))
            .timeout(Some(Duration::from_secs(timeout_secs)))
            .build();

        tracing::debug!(%host, port, "SMTP mailer configured");
        Ok(Self {
            inner: Some(SmtpSession { transport, from }),
        })
    }

    pub fn unconfigured() -> Self {
        Self { inner: None }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

pub fn build_message(
    from: &Mailbox,
    recipient: &str,
    subject: &str,
    html: &str,
) -> anyhow::Result<Message> {
    let to: Mailbox = recipient
        .parse()
        .with_context(|| format!("invalid recipient address: {recipient}"))?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(subject)
        .multipart(MultiPart::alternative().singlepart(SinglePart::html(html.to_string())))
        .context("failed to build email message")
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, recipient: &str, subject: &str, html: &str) -> bool {
        let Some(session) = &self.inner else {
            tracing::error!(%recipient, "email credentials not configured");
            return false;
        };

        let message = match build_message(&session.from, recipient, subject, html) {
            Ok(m) => m,
            Err(err) => {
                tracing::error!(%recipient, error = %format!("{err:#}"), "failed to build email");
                return false;
            }
        };

        match session.transport.send(message).await {
            Ok(_) => {
                tracing::info!(%recipient, "email sent");
                true
            }
            Err(err) => {
                tracing::error!(%recipient, error = %err, "failed to send email");
                false
            }
        }
    }
}

/// Logs what would be sent and reports success; nothing leaves the process.
#[derive(Debug, Clone, Default)]
pub struct DryRunMailer;

#[async_trait::async_trait]
impl Mailer for DryRunMailer {
    async fn deliver(&self, recipient: &str, subject: &str, html: &str) -> bool {
        tracing::info!(
            %recipient,
            %subject,
            html_bytes = html.len(),
            dry_run = true,
            "newsletter rendered (not sent)"
        );
        true
    }
}
