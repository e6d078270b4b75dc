use crate::config::{ConfigError, Settings};
use crate::domain::newsletter::DispatchStats;
use crate::llm::{summarizer_from_settings, Summarizer};
use crate::market::provider::HttpMarketDataClient;
use crate::market::MarketDataClient;
use crate::newsletter::aggregate::Aggregator;
use crate::newsletter::delivery::{DryRunMailer, Mailer, SmtpMailer};
use crate::newsletter::dispatch::{DispatchOptions, Dispatcher};
use crate::storage::subscribers::{PgSubscriberSource, SubscriberSource};
use crate::time::schedule::format_timestamp;
use chrono::Utc;
use serde::Serialize;
use sqlx::postgres::PgConnectOptions;
use std::sync::Arc;

/// Validated inputs for one dispatch run.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub database: PgConnectOptions,
    pub options: DispatchOptions,
}

impl DispatchConfig {
    /// Fails with a [`ConfigError`] naming every missing variable at once. Mail credentials are
    /// not required for a dry run.
    pub fn from_settings(settings: &Settings, dry_run: bool) -> anyhow::Result<Self> {
        let missing: Vec<&'static str> = settings
            .missing_dispatch_vars()
            .into_iter()
            .filter(|var| !(dry_run && matches!(*var, "EMAIL_SENDER" | "EMAIL_PASSWORD")))
            .collect();

        if !missing.is_empty() {
            let err = ConfigError { missing };
            tracing::error!(error = %err, "newsletter job cannot start");
            return Err(err.into());
        }

        Ok(Self {
            database: settings.require_pg_connect_options()?,
            options: DispatchOptions::from_env()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JobOptions {
    /// Render and log every newsletter without sending it.
    pub dry_run: bool,
    pub max_workers: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub status: String,
    pub message: String,
    pub timestamp: String,
    pub stats: DispatchStats,
}

/// The four external capabilities a run is wired from.
pub struct Capabilities {
    pub subscribers: Arc<dyn SubscriberSource>,
    pub market: Arc<dyn MarketDataClient>,
    pub summarizer: Arc<dyn Summarizer>,
    pub mailer: Arc<dyn Mailer>,
}

impl Capabilities {
    pub fn from_settings(
        settings: &Settings,
        config: &DispatchConfig,
        options: JobOptions,
    ) -> anyhow::Result<Self> {
        let pool = crate::storage::lazy_pool(config.database.clone());
        let mailer: Arc<dyn Mailer> = if options.dry_run {
            Arc::new(DryRunMailer)
        } else {
            Arc::new(SmtpMailer::from_settings(settings)?)
        };

        Ok(Self {
            subscribers: Arc::new(PgSubscriberSource::new(pool)),
            market: Arc::new(HttpMarketDataClient::from_settings(settings)?),
            summarizer: summarizer_from_settings(settings)?,
            mailer,
        })
    }
}

pub async fn run_newsletter_job(
    settings: &Settings,
    options: JobOptions,
) -> anyhow::Result<JobReport> {
    run_job_with(settings, options, Capabilities::from_settings).await
}

/// Validates configuration, wires the capabilities through `build`, and runs one dispatch.
/// Nothing is built, and no connection is opened, when configuration is incomplete.
pub async fn run_job_with<F>(
    settings: &Settings,
    options: JobOptions,
    build: F,
) -> anyhow::Result<JobReport>
where
    F: FnOnce(&Settings, &DispatchConfig, JobOptions) -> anyhow::Result<Capabilities>,
{
    let mut config = DispatchConfig::from_settings(settings, options.dry_run)?;
    if let Some(n) = options.max_workers {
        config.options.max_workers = n.max(1);
    }
    let offset = config.options.utc_offset;

    let caps = build(settings, &config, options)?;
    tracing::info!(
        timestamp = %format_timestamp(Utc::now(), offset),
        dry_run = options.dry_run,
        market = caps.market.provider_name(),
        llm = ?caps.summarizer.provider(),
        "starting the newsletter sending process"
    );

    let dispatcher = Dispatcher::new(
        caps.subscribers,
        Aggregator::new(caps.market, caps.summarizer),
        caps.mailer,
        config.options,
    );
    let stats = dispatcher.run_dispatch().await;

    Ok(JobReport {
        status: "success".to_string(),
        message: "Newsletters sent successfully".to_string(),
        timestamp: format_timestamp(Utc::now(), offset),
        stats,
    })
}
