use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockletter_core::config::Settings;
use stockletter_core::newsletter::job::{run_newsletter_job, JobOptions};
use stockletter_core::time::schedule;

#[derive(Debug, Parser)]
#[command(name = "stockletter_worker")]
struct Args {
    /// Render every newsletter and log it instead of sending.
    #[arg(long)]
    dry_run: bool,

    /// Stay up and run once a day at `--at`.
    #[arg(long)]
    daemon: bool,

    /// Local send time (HH:MM) in NEWSLETTER_UTC_OFFSET_HOURS.
    #[arg(long, default_value = "07:00")]
    at: String,

    /// Subscribers processed concurrently; overrides NEWSLETTER_MAX_WORKERS.
    #[arg(long)]
    max_workers: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let options = JobOptions {
        dry_run: args.dry_run,
        max_workers: args.max_workers,
    };

    if args.daemon {
        return run_daemon(&settings, options, &args.at).await;
    }

    match run_newsletter_job(&settings, options).await {
        Ok(report) => {
            tracing::info!(dry_run = args.dry_run, "newsletter run finished");
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), "newsletter run failed");
            Err(err)
        }
    }
}

/// One run per day at `at` local time until Ctrl-C. A failed run is reported and the loop
/// carries on to the next day.
async fn run_daemon(settings: &Settings, options: JobOptions, at: &str) -> anyhow::Result<()> {
    let offset = schedule::newsletter_offset()?;
    let at = schedule::parse_send_time(at)?;

    loop {
        let now = Utc::now();
        let next = schedule::next_run_after(now, offset, at)?;
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::info!(
            next_run = %schedule::format_timestamp(next, offset),
            wait_secs = wait.as_secs(),
            "waiting for next newsletter run"
        );

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                return Ok(());
            }
        }

        match run_newsletter_job(settings, options).await {
            Ok(report) => tracing::info!(
                emails_sent = report.stats.sent_count,
                emails_failed = report.stats.failed_count,
                success_rate = report.stats.success_rate,
                "scheduled newsletter run finished"
            ),
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %format!("{err:#}"), "scheduled newsletter run failed");
            }
        }
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
