use crate::config::{env_or, Settings};
use crate::llm::text;
use crate::market::table;
use crate::market::types::{MarketauxArticle, MarketauxResponse, NewsArticle, RowsResponse};
use crate::market::MarketDataClient;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_RETRIES: u32 = 1;
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:6900/api";
const DEFAULT_NEWS_BASE_URL: &str = "https://api.marketaux.com";

const QUOTE_PATH: &str = "/v1/equity/price/quote";
const PERFORMANCE_PATH: &str = "/v1/equity/price/performance";
const HISTORICAL_PATH: &str = "/v1/equity/price/historical";
const NEWS_PATH: &str = "/v1/news/all";

const HISTORY_DAYS: i64 = 182;
const MAX_ARTICLES: usize = 50;
const MAX_NEWS_PAGES: u32 = 10;
const NEWS_SUMMARY_MAX_CHARS: usize = 600;

#[derive(Debug, Clone)]
pub struct HttpMarketDataClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    news_base_url: String,
    news_api_key: Option<String>,
    retries: u32,
}

impl HttpMarketDataClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_data_provider_api_key()?.to_string();
        let base_url = settings
            .data_provider_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let news_base_url = settings
            .news_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_NEWS_BASE_URL.to_string());
        let news_api_key = settings
            .marketaux_api_key
            .clone()
            .or_else(|| settings.data_provider_api_key.clone());

        let timeout_secs = env_or("DATA_PROVIDER_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build data provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            news_base_url,
            news_api_key,
            retries: DEFAULT_RETRIES,
        }
        .with_retries(env_or("DATA_PROVIDER_RETRIES", DEFAULT_RETRIES)))
    }

    /// Attempts per request, at least one.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    fn url(base: &str, path: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), path)
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        bearer: Option<&str>,
    ) -> Result<T> {
        let mut req = self.http.get(url).query(query);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }

        let res = req.send().await.context("data provider request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read provider response")?;

        if !status.is_success() {
            anyhow::bail!("data provider HTTP {status}: {text}");
        }

        serde_json::from_str::<T>(&text)
            .with_context(|| format!("provider response has an unexpected shape: {text}"))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        bearer: Option<&str>,
    ) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.get_once(url, query, bearer).await {
                Ok(parsed) => return Ok(parsed),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(
                        attempt,
                        ?backoff,
                        %url,
                        error = %err,
                        "data provider fetch failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn fetch_rows(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Map<String, Value>>> {
        let url = Self::url(&self.base_url, path);
        let rows: RowsResponse = self.get_json(&url, query, Some(&self.api_key)).await?;
        Ok(rows.into_rows())
    }
}

#[async_trait::async_trait]
impl MarketDataClient for HttpMarketDataClient {
    fn provider_name(&self) -> &'static str {
        "openbb_http"
    }

    async fn fetch_price(&self, ticker: &str) -> Result<String> {
        let symbol = ticker.trim().to_ascii_uppercase();
        anyhow::ensure!(!symbol.is_empty(), "ticker must be non-empty");

        let quote = self
            .fetch_rows(
                QUOTE_PATH,
                &[("symbol", symbol.clone()), ("provider", "cboe".to_string())],
            )
            .await
            .with_context(|| format!("price quote fetch failed for {symbol}"))?;

        let performance = self
            .fetch_rows(
                PERFORMANCE_PATH,
                &[("symbol", symbol.clone()), ("provider", "finviz".to_string())],
            )
            .await
            .with_context(|| format!("price performance fetch failed for {symbol}"))?;

        let start_date = chrono::Utc::now().date_naive() - chrono::Duration::days(HISTORY_DAYS);
        let historical = self
            .fetch_rows(
                HISTORICAL_PATH,
                &[
                    ("symbol", symbol.clone()),
                    ("start_date", start_date.to_string()),
                    ("interval", "1d".to_string()),
                    ("provider", "yfinance".to_string()),
                ],
            )
            .await
            .with_context(|| format!("price history fetch failed for {symbol}"))?;

        Ok(render_price_report(
            &symbol,
            &quote,
            &performance,
            &historical,
        ))
    }

    async fn fetch_news(&self, ticker: &str) -> Result<String> {
        let symbol = ticker.trim().to_ascii_uppercase();
        anyhow::ensure!(!symbol.is_empty(), "ticker must be non-empty");
        let token = self
            .news_api_key
            .as_deref()
            .context("MARKETAUX_API_KEY is required for news")?;

        let url = Self::url(&self.news_base_url, NEWS_PATH);
        let mut raw: Vec<MarketauxArticle> = Vec::new();
        let mut page: u32 = 1;
        while raw.len() < MAX_ARTICLES && page <= MAX_NEWS_PAGES {
            let query = [
                ("symbols", symbol.clone()),
                ("filter_entities", "true".to_string()),
                ("language", "en".to_string()),
                ("api_token", token.to_string()),
                ("limit", MAX_ARTICLES.to_string()),
                ("page", page.to_string()),
            ];
            let res: MarketauxResponse = self
                .get_json(&url, &query, None)
                .await
                .with_context(|| format!("news fetch failed for {symbol} (page {page})"))?;

            if res.data.is_empty() {
                break;
            }
            raw.extend(res.data);
            if !res.meta.has_next_page {
                break;
            }
            page += 1;
        }

        let articles = news_articles(&symbol, raw);
        anyhow::ensure!(!articles.is_empty(), "no recent news found for {symbol}");

        tracing::debug!(%symbol, articles = articles.len(), "fetched news");
        Ok(render_news_report(&symbol, &articles))
    }
}

pub fn render_price_report(
    symbol: &str,
    quote: &[Map<String, Value>],
    performance: &[Map<String, Value>],
    historical: &[Map<String, Value>],
) -> String {
    format!(
        "Here are the stock price metrics and data for the stock ticker symbol {symbol}: \n\n\
         Price Quote Metrics:\n\n{}\n\n\
         Price Performance Metrics:\n\n{}\n\n\
         Price Historical Data:\n\n{}",
        table::render_rows(quote),
        table::render_rows(performance),
        table::render_rows(historical),
    )
}

/// Normalizes raw articles, newest first, at most 50.
pub fn news_articles(symbol: &str, raw: Vec<MarketauxArticle>) -> Vec<NewsArticle> {
    let mut out: Vec<NewsArticle> = raw
        .into_iter()
        .take(MAX_ARTICLES)
        .map(|a| {
            let symbols = a
                .entities
                .iter()
                .filter_map(|e| e.symbol.as_deref())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(",");
            let summary = [&a.snippet, &a.description, &a.content]
                .into_iter()
                .flatten()
                .find(|s| !s.trim().is_empty())
                .map(|s| text::clip_summary(s, NEWS_SUMMARY_MAX_CHARS))
                .unwrap_or_default();

            NewsArticle {
                symbols: if symbols.is_empty() {
                    symbol.to_string()
                } else {
                    symbols
                },
                title: a.title.unwrap_or_default().trim().to_string(),
                summary,
                source: a.source.unwrap_or_default(),
                published_at: a.published_at.unwrap_or_default(),
                url: a.url.unwrap_or_default(),
            }
        })
        .collect();

    // ISO-8601 timestamps sort lexically; stable so undated articles keep provider order.
    out.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    out
}

pub fn render_news_report(symbol: &str, articles: &[NewsArticle]) -> String {
    let rows: Vec<Vec<String>> = articles
        .iter()
        .map(|a| {
            vec![
                a.symbols.clone(),
                a.title.clone(),
                a.summary.clone(),
                a.url.clone(),
            ]
        })
        .collect();
    let news = table::render_table(&["symbols", "title", "summary", "url"], &rows);
    format!("Here are the recent news headlines for the stock ticker symbol {symbol}:\n\n{news}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn client(base: &str, api_key: &str) -> HttpMarketDataClient {
        let settings = Settings {
            data_provider_api_key: Some(api_key.to_string()),
            data_provider_base_url: Some(base.to_string()),
            news_base_url: Some(base.to_string()),
            marketaux_api_key: Some("tok".to_string()),
            ..Default::default()
        };
        HttpMarketDataClient::from_settings(&settings)
            .unwrap()
            .with_retries(1)
    }

    fn page_of(count: usize, page: u32, has_next_page: bool) -> Value {
        let data: Vec<Value> = (0..count)
            .map(|i| {
                json!({
                    "title": format!("Headline {page}-{i}"),
                    "snippet": "Quarterly results beat estimates",
                    "url": format!("https://news.example/{page}/{i}"),
                    "published_at": "2026-10-15T10:00:00Z",
                    "entities": []
                })
            })
            .collect();
        json!({ "data": data, "meta": { "has_next_page": has_next_page } })
    }

    /// Serves `body(page)` on the news path and counts requests.
    fn news_app(hits: Arc<AtomicUsize>, body: fn(u32) -> Value) -> Router {
        Router::new().route(
            NEWS_PATH,
            get(move |Query(q): Query<HashMap<String, String>>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                if q.get("api_token").map(String::as_str) != Some("tok") {
                    return (StatusCode::UNAUTHORIZED, Json(json!({})));
                }
                let page = q.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
                (StatusCode::OK, Json(body(page)))
            }),
        )
    }

    async fn fetch_news_with(body: fn(u32) -> Value) -> (Result<String>, usize) {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(news_app(hits.clone(), body)).await;
        let out = client(&base, "key").fetch_news("aapl").await;
        (out, hits.load(Ordering::SeqCst))
    }

    fn news_rows(out: &str) -> usize {
        out.lines().filter(|l| l.starts_with("| AAPL |")).count()
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            == Some("Bearer key")
    }

    fn price_app() -> Router {
        Router::new()
            .route(
                QUOTE_PATH,
                get(|headers: HeaderMap| async move {
                    if !authorized(&headers) {
                        return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "bad key"})));
                    }
                    let body = json!({
                        "results": [{"symbol": "AAPL", "last_price": 190.1}],
                        "provider": "cboe"
                    });
                    (StatusCode::OK, Json(body))
                }),
            )
            .route(
                PERFORMANCE_PATH,
                get(|| async { Json(json!([{"symbol": "AAPL", "one_month": 0.042}])) }),
            )
            .route(HISTORICAL_PATH, get(|| async { Json(json!({"results": []})) }))
    }

    #[tokio::test]
    async fn price_report_reads_both_envelopes() {
        let base = serve(price_app()).await;
        let out = client(&base, "key").fetch_price(" aapl ").await.unwrap();

        assert!(out.starts_with("Here are the stock price metrics and data for the stock ticker"));
        assert!(out.contains("| symbol | last_price |\n|---|---|\n| AAPL | 190.1 |"));
        assert!(out.contains("| symbol | one_month |\n|---|---|\n| AAPL | 0.042 |"));
        assert!(out.ends_with("Price Historical Data:\n\n(no data)"));
    }

    #[tokio::test]
    async fn price_fetch_sends_bearer_key() {
        let base = serve(price_app()).await;
        let err = client(&base, "wrong").fetch_price("AAPL").await.unwrap_err();
        assert!(format!("{err:#}").contains("price quote fetch failed for AAPL"));
        assert!(format!("{err:#}").contains("401"));
    }

    #[tokio::test]
    async fn news_stops_once_fifty_articles_are_collected() {
        let (out, hits) = fetch_news_with(|page| page_of(20, page, true)).await;
        assert_eq!(hits, 3);
        assert_eq!(news_rows(&out.unwrap()), 50);
    }

    #[tokio::test]
    async fn news_stops_when_provider_has_no_next_page() {
        let (out, hits) = fetch_news_with(|page| page_of(5, page, false)).await;
        assert_eq!(hits, 1);
        assert_eq!(news_rows(&out.unwrap()), 5);
    }

    #[tokio::test]
    async fn news_stops_on_an_empty_page() {
        let (out, hits) = fetch_news_with(|page| {
            let count = if page == 1 { 5 } else { 0 };
            page_of(count, page, true)
        })
        .await;
        assert_eq!(hits, 2);
        assert_eq!(news_rows(&out.unwrap()), 5);
    }

    #[tokio::test]
    async fn news_paging_is_capped_at_ten_pages() {
        let (out, hits) = fetch_news_with(|page| page_of(1, page, true)).await;
        assert_eq!(hits, 10);
        assert_eq!(news_rows(&out.unwrap()), 10);
    }

    #[tokio::test]
    async fn no_articles_is_an_error() {
        let (out, hits) = fetch_news_with(|page| page_of(0, page, false)).await;
        assert_eq!(hits, 1);
        assert!(out.unwrap_err().to_string().contains("no recent news found for AAPL"));
    }

    fn flaky_news_app(hits: Arc<AtomicUsize>) -> Router {
        Router::new().route(
            NEWS_PATH,
            get(move || async move {
                if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                    return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
                }
                (StatusCode::OK, Json(page_of(3, 1, false)))
            }),
        )
    }

    #[tokio::test]
    async fn failed_request_is_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(flaky_news_app(hits.clone())).await;
        let out = client(&base, "key")
            .with_retries(2)
            .fetch_news("AAPL")
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(news_rows(&out), 3);
    }

    #[tokio::test]
    async fn single_attempt_surfaces_the_first_failure() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(flaky_news_app(hits.clone())).await;
        let err = client(&base, "key").fetch_news("AAPL").await.unwrap_err();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(format!("{err:#}").contains("500"));
    }

    fn article(v: Value) -> MarketauxArticle {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn parses_wrapped_and_bare_rows() {
        let wrapped: RowsResponse =
            serde_json::from_value(json!({"results": [{"symbol": "AAPL"}], "provider": "cboe"}))
                .unwrap();
        assert_eq!(wrapped.into_rows().len(), 1);

        let bare: RowsResponse = serde_json::from_value(json!([{"a": 1}, {"a": 2}])).unwrap();
        assert_eq!(bare.into_rows().len(), 2);
    }

    #[test]
    fn normalizes_articles_newest_first() {
        let raw = vec![
            article(json!({
                "title": "  Older  ",
                "snippet": "",
                "description": "Desc   with\nspaces",
                "url": "https://a",
                "published_at": "2026-10-14T10:00:00Z",
                "entities": []
            })),
            article(json!({
                "title": "Newer",
                "snippet": "Snippet",
                "url": "https://b",
                "published_at": "2026-10-15T10:00:00Z",
                "entities": [{"symbol": "AAPL"}, {"symbol": "MSFT"}]
            })),
        ];

        let out = news_articles("AAPL", raw);
        assert_eq!(out[0].title, "Newer");
        assert_eq!(out[0].symbols, "AAPL,MSFT");
        assert_eq!(out[1].title, "Older");
        assert_eq!(out[1].symbols, "AAPL");
        assert_eq!(out[1].summary, "Desc with spaces");
    }

    #[test]
    fn news_report_is_a_four_column_table() {
        let articles = vec![NewsArticle {
            symbols: "AAPL".to_string(),
            title: "Apple ships".to_string(),
            summary: "Record quarter".to_string(),
            source: "wire".to_string(),
            published_at: String::new(),
            url: "https://x".to_string(),
        }];
        let out = render_news_report("AAPL", &articles);
        assert!(out
            .starts_with("Here are the recent news headlines for the stock ticker symbol AAPL:"));
        assert!(out.contains("| symbols | title | summary | url |"));
        assert!(out.contains("| AAPL | Apple ships | Record quarter | https://x |"));
    }

    #[test]
    fn price_report_has_three_sections() {
        let rows: Vec<Map<String, Value>> =
            serde_json::from_value(json!([{"symbol": "AAPL", "last_price": 190.1}])).unwrap();
        let out = render_price_report("AAPL", &rows, &[], &rows);
        assert!(out.contains("Price Quote Metrics:"));
        assert!(out.contains("Price Performance Metrics:\n\n(no data)"));
        assert!(out.contains("Price Historical Data:"));
    }
}
