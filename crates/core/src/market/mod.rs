pub mod provider;
pub mod table;
pub mod types;

/// Upstream financial data, one ticker at a time. Payloads are human-readable text
/// (markdown tables) meant for an LLM or a newsletter, not for further parsing.
#[async_trait::async_trait]
pub trait MarketDataClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_price(&self, ticker: &str) -> anyhow::Result<String>;

    async fn fetch_news(&self, ticker: &str) -> anyhow::Result<String>;
}
