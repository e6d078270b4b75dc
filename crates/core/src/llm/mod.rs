use crate::config::Settings;
use std::sync::Arc;

pub mod anthropic;
pub mod error;
pub mod openai;
pub mod text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAI,
    Disabled,
}

#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    fn provider(&self) -> Provider;

    /// One system instruction plus one user prompt in, plain prose out.
    async fn summarize(&self, system: &str, prompt: &str) -> anyhow::Result<String>;
}

/// Stands in when no LLM is configured; every call fails so callers take their fallback path.
#[derive(Debug, Clone, Default)]
pub struct DisabledSummarizer;

#[async_trait::async_trait]
impl Summarizer for DisabledSummarizer {
    fn provider(&self) -> Provider {
        Provider::Disabled
    }

    async fn summarize(&self, _system: &str, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("no LLM provider configured")
    }
}

/// Picks the summarizer from `LLM_PROVIDER`, else whichever API key is present (OpenAI first).
pub fn summarizer_from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn Summarizer>> {
    let choice = settings
        .llm_provider
        .as_deref()
        .map(|s| s.to_ascii_lowercase());

    let summarizer: Arc<dyn Summarizer> = match choice.as_deref() {
        Some("anthropic") => Arc::new(anthropic::AnthropicClient::from_settings(settings)?),
        Some("openai") => Arc::new(openai::OpenAiClient::from_settings(settings)?),
        Some("none") | Some("disabled") => Arc::new(DisabledSummarizer),
        Some(other) => anyhow::bail!("unknown LLM_PROVIDER: {other}"),
        None if settings.openai_api_key.is_some() => {
            Arc::new(openai::OpenAiClient::from_settings(settings)?)
        }
        None if settings.anthropic_api_key.is_some() => {
            Arc::new(anthropic::AnthropicClient::from_settings(settings)?)
        }
        None => {
            tracing::warn!("no LLM API key configured; price summaries will use raw data");
            Arc::new(DisabledSummarizer)
        }
    };

    Ok(summarizer)
}
