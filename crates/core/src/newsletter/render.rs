use crate::domain::newsletter::{RenderedDocument, TickerRecord};
use anyhow::Context;
use askama::Template;
use chrono::NaiveDate;

/// Sections at or below this many characters carry nothing worth reading and are left out.
const MIN_SECTION_CHARS: usize = 20;

#[derive(Template)]
#[template(path = "newsletter.html")]
struct NewsletterTemplate<'a> {
    name: &'a str,
    date: String,
    records: Vec<StockCard<'a>>,
}

struct StockCard<'a> {
    ticker: &'a str,
    sections: Vec<Section<'a>>,
}

struct Section<'a> {
    title: &'static str,
    body: &'a str,
}

impl<'a> StockCard<'a> {
    fn from_record(record: &'a TickerRecord) -> Self {
        let sections = [
            ("Price Analysis", record.price_summary.as_str()),
            ("Latest News", record.news_digest.as_str()),
        ]
        .into_iter()
        .filter(|(_, body)| body.chars().count() > MIN_SECTION_CHARS)
        .map(|(title, body)| Section { title, body })
        .collect();

        Self {
            ticker: &record.ticker,
            sections,
        }
    }
}

pub fn display_date(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

pub fn subject_line(date: NaiveDate) -> String {
    format!("📊 Your Daily Stock Update - {}", display_date(date))
}

pub fn render_document(
    recipient_display_name: &str,
    generation_date: NaiveDate,
    records: Vec<TickerRecord>,
) -> anyhow::Result<RenderedDocument> {
    let rendered_markup = render_newsletter(recipient_display_name, generation_date, &records)?;
    Ok(RenderedDocument {
        recipient_display_name: recipient_display_name.to_string(),
        generation_date,
        records,
        rendered_markup,
    })
}

/// Pure over its inputs: identical arguments give byte-identical HTML. Every interpolated value
/// is HTML-escaped by the template.
pub fn render_newsletter(
    subscriber_name: &str,
    generation_date: NaiveDate,
    records: &[TickerRecord],
) -> anyhow::Result<String> {
    NewsletterTemplate {
        name: subscriber_name,
        date: display_date(generation_date),
        records: records.iter().map(StockCard::from_record).collect(),
    }
    .render()
    .context("failed to render newsletter template")
}
