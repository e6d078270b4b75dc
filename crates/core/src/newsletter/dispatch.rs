use crate::config::env_or;
use crate::domain::newsletter::{DeliveryOutcome, DispatchStats, Subscriber};
use crate::newsletter::aggregate::Aggregator;
use crate::newsletter::delivery::Mailer;
use crate::newsletter::render::{render_document, subject_line};
use crate::storage::subscribers::SubscriberSource;
use crate::time::schedule;
use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const DEFAULT_MAX_WORKERS: usize = 3;
const DEFAULT_MAX_TICKERS: usize = 10;
const DEFAULT_SUBSCRIBER_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Subscribers processed concurrently.
    pub max_workers: usize,
    /// Leading watchlist entries aggregated per subscriber.
    pub max_tickers: usize,
    /// Wall-clock budget for one subscriber, aggregation and delivery included.
    pub subscriber_timeout: Duration,
    /// Time zone the newsletter's date is taken in.
    pub utc_offset: FixedOffset,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            max_tickers: DEFAULT_MAX_TICKERS,
            subscriber_timeout: Duration::from_secs(DEFAULT_SUBSCRIBER_TIMEOUT_SECS),
            utc_offset: FixedOffset::east_opt(10 * 3600).unwrap_or_else(|| Utc.fix()),
        }
    }
}

impl DispatchOptions {
    pub fn from_env() -> anyhow::Result<Self> {
        let max_workers = env_or("NEWSLETTER_MAX_WORKERS", DEFAULT_MAX_WORKERS);
        anyhow::ensure!(max_workers >= 1, "NEWSLETTER_MAX_WORKERS must be >= 1");

        Ok(Self {
            max_workers,
            max_tickers: env_or("NEWSLETTER_MAX_TICKERS", DEFAULT_MAX_TICKERS),
            subscriber_timeout: Duration::from_secs(env_or(
                "DISPATCH_SUBSCRIBER_TIMEOUT_SECS",
                DEFAULT_SUBSCRIBER_TIMEOUT_SECS,
            )),
            utc_offset: schedule::newsletter_offset()?,
        })
    }
}

/// Everything one subscriber's task needs, shared read-only across workers.
struct SubscriberPipeline {
    aggregator: Aggregator,
    mailer: Arc<dyn Mailer>,
    max_tickers: usize,
}

impl SubscriberPipeline {
    async fn process(&self, subscriber: Subscriber, generation_date: NaiveDate) -> DeliveryOutcome {
        let email = subscriber.email_address.trim();
        if email.is_empty() {
            tracing::warn!(
                subscriber_id = subscriber.id,
                username = %subscriber.display_name,
                "no email on file"
            );
            return DeliveryOutcome::failed(email);
        }

        if subscriber.watchlist.is_empty() {
            tracing::info!(
                subscriber_id = subscriber.id,
                "no favorite stocks; sending empty newsletter"
            );
        }

        let mut records = Vec::new();
        for ticker in subscriber.watchlist.iter().take(self.max_tickers) {
            if let Some(record) = self.aggregator.aggregate(ticker).await {
                records.push(record);
            }
        }

        let subject = subject_line(generation_date);
        let document = match render_document(&subscriber.display_name, generation_date, records) {
            Ok(document) => document,
            Err(err) => {
                tracing::error!(
                    subscriber_id = subscriber.id,
                    error = %format!("{err:#}"),
                    "failed to render newsletter"
                );
                return DeliveryOutcome::failed(email);
            }
        };
        let success = self
            .mailer
            .deliver(email, &subject, &document.rendered_markup)
            .await;

        tracing::debug!(
            subscriber_id = subscriber.id,
            tickers = document.records.len(),
            success,
            "subscriber processed"
        );

        DeliveryOutcome {
            recipient_email: email.to_string(),
            success,
        }
    }
}

pub struct Dispatcher {
    subscribers: Arc<dyn SubscriberSource>,
    pipeline: Arc<SubscriberPipeline>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(
        subscribers: Arc<dyn SubscriberSource>,
        aggregator: Aggregator,
        mailer: Arc<dyn Mailer>,
        options: DispatchOptions,
    ) -> Self {
        let pipeline = Arc::new(SubscriberPipeline {
            aggregator,
            mailer,
            max_tickers: options.max_tickers,
        });
        Self {
            subscribers,
            pipeline,
            options,
        }
    }

    pub async fn run_dispatch(&self) -> DispatchStats {
        let today = schedule::local_date(Utc::now(), self.options.utc_offset);
        self.run_dispatch_on(today).await
    }

    /// Sends one newsletter to every current subscriber and waits for all of them.
    ///
    /// A fixed set of workers drains a shared queue; each subscriber runs in its own task under
    /// a time budget, so a panic or a hung upstream only costs that subscriber. Outcomes are
    /// folded here, on the calling task, from a channel.
    pub async fn run_dispatch_on(&self, generation_date: NaiveDate) -> DispatchStats {
        let run_id = uuid::Uuid::new_v4();
        let started = Instant::now();
        tracing::info!(%run_id, %generation_date, "starting newsletter dispatch");

        let subscribers = self.subscribers.list_subscribers().await;
        if subscribers.is_empty() {
            tracing::info!(%run_id, "no subscribers found");
            return DispatchStats::default();
        }

        let total = subscribers.len();
        let workers = self.options.max_workers.clamp(1, total);
        tracing::info!(%run_id, total, workers, "found subscribers");

        let queue = Arc::new(Mutex::new(VecDeque::from(subscribers)));
        let (tx, mut rx) = mpsc::channel::<DeliveryOutcome>(total);

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let pipeline = Arc::clone(&self.pipeline);
            let budget = self.options.subscriber_timeout;

            handles.push(tokio::spawn(async move {
                while let Some(subscriber) = next_subscriber(&queue) {
                    let outcome =
                        run_isolated(&pipeline, subscriber, generation_date, budget).await;
                    if tx.send(outcome).await.is_err() {
                        break;
                    }
                }
                tracing::debug!(worker, "dispatch worker done");
            }));
        }
        drop(tx);

        let mut sent = 0usize;
        let mut failed = 0usize;
        while let Some(outcome) = rx.recv().await {
            if outcome.success {
                sent += 1;
            } else {
                failed += 1;
            }
        }

        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(%run_id, error = %err, "dispatch worker aborted");
            }
        }

        let unaccounted = total.saturating_sub(sent + failed);
        if unaccounted > 0 {
            tracing::warn!(
                %run_id,
                unaccounted,
                "subscribers without an outcome counted as failed"
            );
            failed += unaccounted;
        }

        let stats = DispatchStats::from_counts(total, sent, failed);
        tracing::info!(
            %run_id,
            total_subscribers = stats.total_subscribers,
            emails_sent = stats.sent_count,
            emails_failed = stats.failed_count,
            success_rate = stats.success_rate,
            elapsed_ms = started.elapsed().as_millis(),
            "newsletter dispatch completed"
        );
        stats
    }
}

fn next_subscriber(queue: &Mutex<VecDeque<Subscriber>>) -> Option<Subscriber> {
    match queue.lock() {
        Ok(mut q) => q.pop_front(),
        Err(poisoned) => poisoned.into_inner().pop_front(),
    }
}

async fn run_isolated(
    pipeline: &Arc<SubscriberPipeline>,
    subscriber: Subscriber,
    generation_date: NaiveDate,
    budget: Duration,
) -> DeliveryOutcome {
    let subscriber_id = subscriber.id;
    let email = subscriber.email_address.clone();

    let task = tokio::spawn({
        let pipeline = Arc::clone(pipeline);
        async move { pipeline.process(subscriber, generation_date).await }
    });
    let abort = task.abort_handle();

    match tokio::time::timeout(budget, task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            tracing::error!(
                subscriber_id,
                recipient = %email,
                error = %err,
                "error processing subscriber"
            );
            DeliveryOutcome::failed(email)
        }
        Err(_) => {
            abort.abort();
            tracing::error!(
                subscriber_id,
                recipient = %email,
                ?budget,
                "subscriber exceeded its time budget"
            );
            DeliveryOutcome::failed(email)
        }
    }
}
