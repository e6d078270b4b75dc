use crate::domain::newsletter::TickerRecord;
use crate::llm::text::truncate_chars;
use crate::llm::Summarizer;
use crate::market::MarketDataClient;
use std::sync::Arc;

pub const PRICE_ANALYST_INSTRUCTION: &str = "You are a financial analyst assistant. \
Analyze the provided stock price data and create a clear, concise summary for investors. \
Focus on: current price, recent changes, performance trends, and key metrics. \
Format your response in a professional but easy-to-understand way. \
Keep it under 200 words.";

const DEFAULT_FALLBACK_CHARS: usize = 500;

pub struct Aggregator {
    market: Arc<dyn MarketDataClient>,
    summarizer: Arc<dyn Summarizer>,
    fallback_chars: usize,
}

impl Aggregator {
    pub fn new(market: Arc<dyn MarketDataClient>, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            market,
            summarizer,
            fallback_chars: DEFAULT_FALLBACK_CHARS,
        }
    }

    /// `None` when either upstream fetch fails; the caller just leaves the ticker out.
    pub async fn aggregate(&self, ticker: &str) -> Option<TickerRecord> {
        let price_raw = match self.market.fetch_price(ticker).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(
                    %ticker,
                    error = %format!("{err:#}"),
                    "price fetch failed; skipping ticker"
                );
                return None;
            }
        };
        let news_raw = match self.market.fetch_news(ticker).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(
                    %ticker,
                    error = %format!("{err:#}"),
                    "news fetch failed; skipping ticker"
                );
                return None;
            }
        };

        let price_summary = self.summarize_price(ticker, &price_raw).await;
        let news_digest = clean_news(&news_raw);

        Some(TickerRecord {
            ticker: ticker.to_string(),
            price_summary,
            news_digest,
        })
    }

    async fn summarize_price(&self, ticker: &str, price_raw: &str) -> String {
        let prompt = price_prompt(ticker, price_raw);
        match self
            .summarizer
            .summarize(PRICE_ANALYST_INSTRUCTION, &prompt)
            .await
        {
            Ok(summary) => summary,
            Err(err) => {
                tracing::error!(
                    %ticker,
                    provider = ?self.summarizer.provider(),
                    error = %err,
                    "LLM analysis failed; using raw price data"
                );
                fallback_summary(ticker, price_raw, self.fallback_chars)
            }
        }
    }
}

fn price_prompt(ticker: &str, price_raw: &str) -> String {
    format!(
        "Analyze this price data for {ticker} and provide a clear summary:\n\n\
         {price_raw}\n\n\
         Provide a concise analysis highlighting the most important metrics and trends."
    )
}

pub fn fallback_summary(ticker: &str, price_raw: &str, max_chars: usize) -> String {
    format!(
        "Price data for {ticker}:\n\n{}...",
        truncate_chars(price_raw, max_chars)
    )
}

/// Turns the provider's markdown news table into a bulleted digest.
///
/// Separator rows and the column header row are dropped. Each data row
/// (`symbols | title | summary | url`) becomes a `•` title line, an indented summary, an
/// indented `🔗` link and a blank spacer. Rows with fewer than three non-empty cells are kept
/// as they were. Plain text lines outside the table are kept, trimmed.
pub fn clean_news(raw: &str) -> String {
    let mut out: Vec<String> = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if line.contains("|--") || trimmed.starts_with("|---") || is_separator_row(trimmed) {
            continue;
        }

        let lower = line.to_lowercase();
        if lower.contains("symbols") && lower.contains("title") {
            continue;
        }

        if !line.contains('|') {
            out.push(trimmed.to_string());
            continue;
        }

        let parts: Vec<&str> = line
            .split('|')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if parts.len() < 3 {
            out.push(trimmed.to_string());
            continue;
        }

        let title = parts[1];
        let summary = parts[2];
        let url = parts.get(3).copied().unwrap_or("");

        out.push(format!("• {title}"));
        if !summary.is_empty() {
            out.push(format!("  {summary}"));
        }
        if !url.is_empty() {
            out.push(format!("  🔗 {url}"));
        }
        out.push(String::new());
    }

    out.join("\n")
}

// Alignment rows such as `| :--- | ---: |`.
fn is_separator_row(line: &str) -> bool {
    line.starts_with('|')
        && line.contains('-')
        && line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newsletter::fakes::{FakeMarket, FakeSummarizer};

    const NEWS: &str = "Here are the recent news headlines for the stock ticker symbol AAPL:\n\n\
| symbols | title | summary | url |\n\
| --- | --- | --- | --- |\n\
| AAPL | Apple beats estimates | Revenue up 8% | https://n/1 |\n\
| AAPL,MSFT | Big tech rally | Indices climb | https://n/2 |";

    #[test]
    fn cleans_table_into_bullets() {
        let out = clean_news(NEWS);
        assert_eq!(
            out,
            "Here are the recent news headlines for the stock ticker symbol AAPL:\n\
• Apple beats estimates\n  Revenue up 8%\n  🔗 https://n/1\n\n\
• Big tech rally\n  Indices climb\n  🔗 https://n/2\n"
        );
    }

    #[test]
    fn skips_compact_separator_rows() {
        let out = clean_news("|---|---|---|\n|--|--|");
        assert_eq!(out, "");
    }

    #[test]
    fn skips_spaced_alignment_rows() {
        let out = clean_news("| :--- | ---: | --- |\n| AAPL | Title | Summary | https://u |");
        assert_eq!(out, "• Title\n  Summary\n  🔗 https://u\n");
    }

    #[test]
    fn malformed_rows_pass_through() {
        let out = clean_news("| only | two |\n|lonely|");
        assert_eq!(out, "| only | two |\n|lonely|");
    }

    #[test]
    fn rows_without_url_omit_link_line() {
        let out = clean_news("| AAPL | Title | Summary |");
        assert_eq!(out, "• Title\n  Summary\n");
    }

    #[test]
    fn fallback_truncates_raw_payload() {
        let raw = "x".repeat(800);
        let out = fallback_summary("AAPL", &raw, 500);
        assert!(out.starts_with("Price data for AAPL:\n\n"));
        assert!(out.ends_with("..."));
        assert_eq!(out.matches('x').count(), 500);
    }

    #[tokio::test]
    async fn uses_llm_summary_when_available() {
        let market = Arc::new(FakeMarket::default());
        let summarizer = Arc::new(FakeSummarizer::answering("AAPL looks strong this week."));
        let agg = Aggregator::new(market, summarizer.clone());

        let record = agg.aggregate("AAPL").await.unwrap();
        assert_eq!(record.ticker, "AAPL");
        assert_eq!(record.price_summary, "AAPL looks strong this week.");
        assert!(record.news_digest.contains("• AAPL headline"));

        let calls = summarizer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, PRICE_ANALYST_INSTRUCTION);
        assert!(calls[0].1.contains("price data for AAPL"));
    }

    #[tokio::test]
    async fn falls_back_to_raw_price_when_llm_fails() {
        let market = Arc::new(FakeMarket::default());
        let agg = Aggregator::new(market, Arc::new(FakeSummarizer::failing()));

        let record = agg.aggregate("MSFT").await.unwrap();
        assert!(record.price_summary.starts_with("Price data for MSFT:\n\n"));
        assert!(record.price_summary.ends_with("..."));
    }

    #[tokio::test]
    async fn fetch_failure_skips_ticker() {
        let market = Arc::new(FakeMarket::failing_price(["BAD"]));
        let agg = Aggregator::new(market.clone(), Arc::new(FakeSummarizer::failing()));
        assert!(agg.aggregate("BAD").await.is_none());
        assert!(agg.aggregate("GOOD").await.is_some());

        let market = Arc::new(FakeMarket::failing_news(["NONEWS"]));
        let agg = Aggregator::new(market, Arc::new(FakeSummarizer::failing()));
        assert!(agg.aggregate("NONEWS").await.is_none());
    }
}
