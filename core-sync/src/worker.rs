//! # Page Worker
//!
//! Consumes page messages from the [`TaskQueue`], materializes the page and
//! reports the outcome through a [`ReportSink`].
//!
//! ## Delivery policy
//!
//! - Malformed payload: acked and dropped, nothing reported
//! - Success: one success report, then ack
//! - Failure with retries left (`retryCount < max_retries`): requeued with
//!   exponential backoff, nothing reported yet
//! - Failure with retries exhausted: one error report, then ack
//!
//! `max_retries = 0` reports every failure immediately. A report the sink
//! refuses leaves the message claimed; the queue redelivers it after the
//! visibility timeout and the idempotent upsert makes the rerun harmless.
//! Refusals share the `max_retries` budget: once a message has been
//! delivered more than `max_retries` times without a retry of its own, it is
//! acked and the undeliverable report is logged at `error`.
//!
//! [`WorkerRunner`] polls the queue and runs deliveries concurrently, bounded
//! by a semaphore, until its cancellation token fires.

use crate::error::{Result, SyncError};
use crate::materializer::RecordMaterializer;
use crate::queue::{Delivery, QueueMessage, TaskQueue};
use crate::report::{PageReport, ReportSink};
use bridge_traits::source::PhotoSource;
use bridge_traits::time::{Clock, SystemClock};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Worker tuning
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Records requested per page
    pub per_page: u32,
    /// Requeue attempts before a failure is reported
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            per_page: 30,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    /// Backoff before retry number `retry_count + 1`: `base * 2^retry_count`,
    /// capped at `max_retry_delay`.
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_count);
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.max_retry_delay)
    }
}

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Invalid payload, acked without a report
    Dropped,
    /// Report delivered and message acked
    Reported(PageReport),
    /// Failed attempt requeued
    Requeued { retry_count: u32, delay: Duration },
    /// The sink refused the report; the message stays claimed
    Unreported { error: String },
    /// The sink kept refusing; the message was acked without a report
    Abandoned { error: String },
}

pub struct PageWorker {
    queue: Arc<dyn TaskQueue>,
    source: Arc<dyn PhotoSource>,
    materializer: Arc<RecordMaterializer>,
    reporter: Arc<dyn ReportSink>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
}

impl PageWorker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        source: Arc<dyn PhotoSource>,
        materializer: Arc<RecordMaterializer>,
        reporter: Arc<dyn ReportSink>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            source,
            materializer,
            reporter,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Process one delivery to completion.
    #[instrument(skip(self, delivery), fields(message_id = %delivery.id, attempts = delivery.attempts))]
    pub async fn process_delivery(&self, delivery: &Delivery) -> DeliveryOutcome {
        let message = match QueueMessage::parse(&delivery.raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping malformed page message");
                self.ack(delivery).await;
                return DeliveryOutcome::Dropped;
            }
        };

        let report = match self.process_page(message.page).await {
            Ok(report) => report,
            Err(e) => {
                let retry_count = message.retry_count();
                if retry_count < self.config.max_retries {
                    match self.requeue(delivery, &message, &e).await {
                        Ok(outcome) => return outcome,
                        Err(queue_error) => {
                            error!(page = message.page, error = %queue_error, "Requeue failed, reporting instead");
                        }
                    }
                }
                error!(page = message.page, retry_count, error = %e, "Page failed");
                PageReport::failure(format!("Failed to process page {}: {}", message.page, e))
            }
        };

        if let Err(e) = self.reporter.report(report.clone()).await {
            // Deliveries spent on this report, not on requeued fetch failures
            let report_attempts = delivery.attempts.saturating_sub(message.retry_count());
            if report_attempts > self.config.max_retries {
                error!(
                    page = message.page,
                    report_attempts,
                    error = %e,
                    "Report was never accepted, dropping message"
                );
                self.ack(delivery).await;
                return DeliveryOutcome::Abandoned {
                    error: e.to_string(),
                };
            }

            warn!(
                page = message.page,
                report_attempts,
                error = %e,
                "Report was not accepted, leaving message for redelivery"
            );
            return DeliveryOutcome::Unreported {
                error: e.to_string(),
            };
        }

        self.ack(delivery).await;
        DeliveryOutcome::Reported(report)
    }

    /// Fetch and materialize one page, producing its success report.
    async fn process_page(&self, page: u64) -> Result<PageReport> {
        let page_number = u32::try_from(page)
            .map_err(|_| SyncError::InvalidPayload(format!("page out of range: {}", page)))?;

        let fetched = self
            .source
            .fetch_page(page_number, self.config.per_page)
            .await?;
        let total_pages = fetched.total_pages(self.config.per_page);
        let photo_count = fetched.photos.len() as u64;

        let outcome = self.materializer.materialize(page, fetched.photos).await?;
        debug!(
            page,
            photo_count,
            mirror_tasks = outcome.mirror_tasks.len(),
            "Page processed"
        );

        Ok(PageReport::success(page, photo_count).with_total_pages(total_pages))
    }

    async fn requeue(
        &self,
        delivery: &Delivery,
        message: &QueueMessage,
        cause: &SyncError,
    ) -> Result<DeliveryOutcome> {
        let retry_count = message.retry_count();
        let delay = self.config.retry_delay(retry_count);
        let next = message.retried(cause.to_string(), self.clock.unix_timestamp_millis());

        self.queue.retry(delivery, next, delay).await?;
        warn!(
            page = message.page,
            retry_count = retry_count + 1,
            delay_ms = delay.as_millis() as u64,
            error = %cause,
            "Page failed, requeued"
        );

        Ok(DeliveryOutcome::Requeued {
            retry_count: retry_count + 1,
            delay,
        })
    }

    async fn ack(&self, delivery: &Delivery) {
        if let Err(e) = self.queue.ack(delivery).await {
            // Redelivery is safe; the next attempt is either stale or idempotent
            warn!(message_id = %delivery.id, error = %e, "Failed to ack message");
        }
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Polls the queue and feeds deliveries to a [`PageWorker`].
pub struct WorkerRunner {
    worker: Arc<PageWorker>,
    queue: Arc<dyn TaskQueue>,
    batch_size: u32,
    poll_interval: Duration,
    permits: Arc<Semaphore>,
}

impl WorkerRunner {
    pub fn new(
        worker: Arc<PageWorker>,
        queue: Arc<dyn TaskQueue>,
        concurrency: usize,
        batch_size: u32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            worker,
            queue,
            batch_size: batch_size.max(1),
            poll_interval,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Receive one batch and process it. Deliveries run concurrently, each
    /// independent of the others. Returns the batch size.
    pub async fn run_once(&self) -> Result<usize> {
        let deliveries = self.queue.receive(self.batch_size).await?;
        let count = deliveries.len();

        join_all(deliveries.iter().map(|delivery| async move {
            let _permit = self.permits.acquire().await.ok();
            self.worker.process_delivery(delivery).await
        }))
        .await;

        Ok(count)
    }

    /// Poll until `shutdown` is cancelled. A batch in progress is finished
    /// before the loop exits.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(batch_size = self.batch_size, "Page worker started");

        while !shutdown.is_cancelled() {
            let idle = match self.run_once().await {
                Ok(0) => true,
                Ok(count) => {
                    debug!(count, "Processed batch");
                    false
                }
                Err(e) => {
                    warn!(error = %e, "Failed to receive from queue");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        info!("Page worker stopped");
    }
}

// ============================================================================
// Tests
// ============================================================================
