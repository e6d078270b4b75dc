use crate::config::{env_or, Settings};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::text;
use crate::llm::{Provider, Summarizer};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_openai_api_key()?.to_string();
        let base_url = env_or("OPENAI_BASE_URL", DEFAULT_BASE_URL.to_string());
        let model = env_or("OPENAI_MODEL", DEFAULT_MODEL.to_string());
        let timeout_secs = env_or("OPENAI_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
        })
    }

    fn completion_text(res: &ChatCompletionResponse) -> Option<String> {
        res.choices
            .iter()
            .find_map(|c| c.message.content.as_deref())
            .map(text::strip_code_fences)
            .filter(|s| !s.is_empty())
    }
}

#[async_trait::async_trait]
impl Summarizer for OpenAiClient {
    fn provider(&self) -> Provider {
        Provider::OpenAI
    }

    async fn summarize(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
        let req = ChatCompletionRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("failed to read OpenAI response body")?;
        if !status.is_success() {
            return Err(LlmDiagnosticsError::http(Provider::OpenAI, status, body).into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&body)
            .with_context(|| format!("failed to parse OpenAI response JSON: {body}"))?;
        let parsed = serde_json::from_value::<ChatCompletionResponse>(raw_json.clone())
            .context("failed to decode OpenAI response into ChatCompletionResponse")?;

        Self::completion_text(&parsed)
            .ok_or_else(|| LlmDiagnosticsError::empty_output(Provider::OpenAI, raw_json).into())
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
