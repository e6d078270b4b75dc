//! In-memory stand-ins for the pipeline's external capabilities.

use crate::domain::newsletter::Subscriber;
use crate::llm::{Provider, Summarizer};
use crate::market::MarketDataClient;
use crate::newsletter::delivery::Mailer;
use crate::storage::subscribers::SubscriberSource;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct FakeMarket {
    failing_price: HashSet<String>,
    failing_news: HashSet<String>,
    panicking: HashSet<String>,
    slow: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeMarket {
    pub fn failing_price<'a>(tickers: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            failing_price: tickers.into_iter().map(str::to_string).collect(),
            ..Default::default()
        }
    }

    pub fn failing_news<'a>(tickers: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            failing_news: tickers.into_iter().map(str::to_string).collect(),
            ..Default::default()
        }
    }

    pub fn panicking<'a>(tickers: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            panicking: tickers.into_iter().map(str::to_string).collect(),
            ..Default::default()
        }
    }

    /// Tickers whose price fetch never completes within any sane test budget.
    pub fn hanging<'a>(tickers: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            slow: tickers.into_iter().map(str::to_string).collect(),
            ..Default::default()
        }
    }

    pub fn price_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MarketDataClient for FakeMarket {
    fn provider_name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_price(&self, ticker: &str) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(ticker.to_string());
        if self.panicking.contains(ticker) {
            panic!("provider blew up for {ticker}");
        }
        if self.slow.contains(ticker) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing_price.contains(ticker) {
            anyhow::bail!("provider error for {ticker}");
        }
        Ok(format!(
            "Price Quote Metrics:\n\n| symbol | last_price |\n|---|---|\n| {ticker} | 123.45 |\n{}",
            "padding ".repeat(100)
        ))
    }

    async fn fetch_news(&self, ticker: &str) -> anyhow::Result<String> {
        if self.failing_news.contains(ticker) {
            anyhow::bail!("no recent news found for {ticker}");
        }
        Ok(format!(
            "| symbols | title | summary | url |\n|---|---|---|---|\n\
             | {ticker} | {ticker} headline | Something happened to {ticker} \
             | https://news/{ticker} |"
        ))
    }
}

pub struct FakeSummarizer {
    answer: Option<String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeSummarizer {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Summarizer for FakeSummarizer {
    fn provider(&self) -> Provider {
        Provider::Disabled
    }

    async fn summarize(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), prompt.to_string()));
        match &self.answer {
            Some(a) => Ok(a.clone()),
            None => anyhow::bail!("LLM unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub recipient: String,
    pub subject: String,
    pub html: String,
}

pub struct FakeMailer {
    succeed: bool,
    sent: Mutex<Vec<SentMail>>,
}

impl FakeMailer {
    pub fn accepting() -> Self {
        Self {
            succeed: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            succeed: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Mailer for FakeMailer {
    async fn deliver(&self, recipient: &str, subject: &str, html: &str) -> bool {
        self.sent.lock().unwrap().push(SentMail {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
        });
        self.succeed
    }
}

pub struct FakeSource(pub Vec<Subscriber>);

#[async_trait::async_trait]
impl SubscriberSource for FakeSource {
    async fn list_subscribers(&self) -> Vec<Subscriber> {
        self.0.clone()
    }
}

pub fn subscriber(id: i64, name: &str, email: &str, watchlist: &[&str]) -> Subscriber {
    Subscriber {
        id,
        display_name: name.to_string(),
        email_address: email.to_string(),
        watchlist: watchlist.iter().map(|t| t.to_string()).collect(),
    }
}
