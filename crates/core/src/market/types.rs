use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tabular provider payloads come either as a bare array of row objects or wrapped in
/// `{"results": [...]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RowsResponse {
    Bare(Vec<Map<String, Value>>),
    Wrapped { results: Vec<Map<String, Value>> },
}

impl RowsResponse {
    pub fn into_rows(self) -> Vec<Map<String, Value>> {
        match self {
            RowsResponse::Bare(rows) => rows,
            RowsResponse::Wrapped { results } => results,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketauxResponse {
    #[serde(default)]
    pub data: Vec<MarketauxArticle>,
    #[serde(default)]
    pub meta: MarketauxMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketauxMeta {
    #[serde(default)]
    pub has_next_page: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketauxArticle {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub entities: Vec<MarketauxEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketauxEntity {
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsArticle {
    pub symbols: String,
    pub title: String,
    pub summary: String,
    pub source: String,
    pub published_at: String,
    pub url: String,
}
