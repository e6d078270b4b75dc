use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An opted-in recipient and the tickers they follow, in the order they added them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: i64,
    pub display_name: String,
    pub email_address: String,
    pub watchlist: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerRecord {
    pub ticker: String,
    pub price_summary: String,
    pub news_digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub recipient_display_name: String,
    pub generation_date: NaiveDate,
    pub records: Vec<TickerRecord>,
    pub rendered_markup: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub recipient_email: String,
    pub success: bool,
}

impl DeliveryOutcome {
    pub fn failed(recipient_email: impl Into<String>) -> Self {
        Self {
            recipient_email: recipient_email.into(),
            success: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub total_subscribers: usize,
    #[serde(rename = "emails_sent")]
    pub sent_count: usize,
    #[serde(rename = "emails_failed")]
    pub failed_count: usize,
    pub success_rate: f64,
}

impl DispatchStats {
    pub fn from_counts(total_subscribers: usize, sent_count: usize, failed_count: usize) -> Self {
        Self {
            total_subscribers,
            sent_count,
            failed_count,
            success_rate: success_rate(sent_count, total_subscribers),
        }
    }
}

/// Percentage of `sent` over `total`, rounded to two decimals; `0` when nothing was attempted.
pub fn success_rate(sent: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = sent as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}
