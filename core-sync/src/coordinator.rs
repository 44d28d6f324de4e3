//! # Sync Coordinator
//!
//! Durable, serialized owner of sync progress.
//!
//! ## Overview
//!
//! The `SyncCoordinator` is the only component that reads or writes the
//! [`SyncState`] checkpoint. It exposes five operations:
//!
//! - `start()`: begin or resume a run at `lastProcessedPage + 1`
//! - `stop()`: halt auto-advance (optionally draining the in-flight page)
//! - `status()`: read-only snapshot
//! - `report()`: consume a page worker's [`PageReport`]
//! - `reset()`: discard all progress
//!
//! Every mutating operation holds a single async lock across
//! load → mutate → enqueue → save, so two concurrent `start()` calls can
//! never both enqueue the same page. Enqueues are bounded by a timeout and a
//! failed enqueue always moves the state to `error`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{CoordinatorConfig, PageReport, SyncCoordinator};
//!
//! # async fn example(coordinator: SyncCoordinator) -> core_sync::Result<()> {
//! let started = coordinator.start().await?;
//! println!("requested page {}", started.page);
//!
//! // Later, from a page worker
//! coordinator.report(PageReport::success(started.page, 30)).await?;
//!
//! let state = coordinator.status().await?;
//! assert_eq!(state.last_processed_page, started.page);
//! # Ok(())
//! # }
//! ```

use crate::{
    queue::{QueueMessage, TaskQueue},
    report::{PageReport, ReportOutcome, ReportSink},
    repository::SyncStateRepository,
    state::{Advance, StopOutcome, SyncState, SyncStatus},
    Result, SyncError,
};
use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Coordinator tuning
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound on a single enqueue
    pub enqueue_timeout: Duration,
    /// `stop()` moves a running sync to `stopping` instead of `idle`
    pub drain_on_stop: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            enqueue_timeout: Duration::from_secs(5),
            drain_on_stop: false,
        }
    }
}

/// Result of a successful `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOutcome {
    /// Page that was enqueued
    pub page: u64,
    /// Whether the run resumed from a non-zero checkpoint
    pub resumed: bool,
}

pub struct SyncCoordinator {
    repository: Arc<dyn SyncStateRepository>,
    queue: Arc<dyn TaskQueue>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
    /// Serializes every read-modify-write of the checkpoint
    op_lock: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(
        repository: Arc<dyn SyncStateRepository>,
        queue: Arc<dyn TaskQueue>,
        event_bus: EventBus,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            repository,
            queue,
            event_bus,
            clock: Arc::new(SystemClock),
            config,
            op_lock: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Begin a run, or resume one that halted in `error`.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if a run is active; nothing is enqueued
    /// - `Enqueue` if the first page could not be enqueued; the state is left
    ///   in `error` with the reason recorded
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<StartOutcome> {
        let _guard = self.op_lock.lock().await;
        let mut state = self.repository.load().await?;

        let page = match state.begin_run(self.clock.now()) {
            Ok(page) => page,
            Err(e) => {
                debug!(status = %state.status, "Start rejected");
                return Err(e);
            }
        };
        let resumed = state.last_processed_page > 0;

        if let Err(e) = self.enqueue(page).await {
            state.fail(e.to_string());
            self.repository.save(&state).await?;
            error!(page, error = %e, "Failed to enqueue first page");
            self.publish(vec![SyncEvent::Failed {
                message: e.to_string(),
                last_processed_page: state.last_processed_page,
            }]);
            return Err(e);
        }

        self.repository.save(&state).await?;
        info!(page, resumed, "Sync started");
        self.publish(vec![
            SyncEvent::Started { page },
            SyncEvent::PageEnqueued { page },
        ]);

        Ok(StartOutcome { page, resumed })
    }

    /// Halt auto-advance. In-flight pages are not cancelled; their reports
    /// are still applied.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<StopOutcome> {
        let _guard = self.op_lock.lock().await;
        let mut state = self.repository.load().await?;

        let outcome = state.request_stop(self.config.drain_on_stop)?;
        match outcome {
            StopOutcome::Stopped | StopOutcome::Draining => {
                self.repository.save(&state).await?;
                info!(
                    last_processed_page = state.last_processed_page,
                    draining = outcome == StopOutcome::Draining,
                    "Sync stopped"
                );
                self.publish(vec![SyncEvent::Stopped {
                    last_processed_page: state.last_processed_page,
                    draining: outcome == StopOutcome::Draining,
                }]);
            }
            StopOutcome::AlreadyStopped | StopOutcome::NotRunning => {
                debug!(status = %state.status, "Stop was a no-op");
            }
        }

        Ok(outcome)
    }

    /// Read-only snapshot. Does not take the operation lock; a snapshot
    /// taken mid-operation shows the last saved state.
    pub async fn status(&self) -> Result<SyncState> {
        self.repository.load().await
    }

    /// Apply a page worker's report.
    ///
    /// # Errors
    ///
    /// `Enqueue` when the checkpoint advanced but the next page could not be
    /// enqueued. The advance and the `error` status are both persisted.
    #[instrument(skip(self, report), fields(success = report.is_success()))]
    pub async fn report(&self, report: PageReport) -> Result<ReportOutcome> {
        match report {
            PageReport::Success {
                page_completed,
                photo_count,
                total_pages,
            } => {
                self.complete_page(page_completed, photo_count, total_pages)
                    .await
            }
            PageReport::Failure { error } => self.halt(error).await,
        }
    }

    /// Discard all progress. Allowed from any state.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        let previous = self.repository.load().await?;

        self.repository.clear().await?;
        info!(
            previous_status = %previous.status,
            previous_page = previous.last_processed_page,
            "Sync progress reset"
        );
        self.publish(vec![SyncEvent::Reset]);

        Ok(())
    }

    /// Reconcile the persisted state after a process restart.
    ///
    /// A `running` checkpoint re-enqueues its next page so the run cannot
    /// stall on a message that was lost with the previous process; a
    /// duplicate is harmless because stale reports are ignored. A `stopping`
    /// checkpoint has nothing left to drain and settles to `idle`.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<Option<u64>> {
        let _guard = self.op_lock.lock().await;
        let mut state = self.repository.load().await?;

        match state.status {
            SyncStatus::Running => {
                let page = state.next_page();
                if let Err(e) = self.enqueue(page).await {
                    state.fail(e.to_string());
                    self.repository.save(&state).await?;
                    error!(page, error = %e, "Failed to re-enqueue page during recovery");
                    self.publish(vec![SyncEvent::Failed {
                        message: e.to_string(),
                        last_processed_page: state.last_processed_page,
                    }]);
                    return Err(e);
                }
                info!(page, "Recovered running sync");
                self.publish(vec![SyncEvent::PageEnqueued { page }]);
                Ok(Some(page))
            }
            SyncStatus::Stopping => {
                state.finish_run()?;
                self.repository.save(&state).await?;
                info!("Settled interrupted drain");
                Ok(None)
            }
            SyncStatus::Idle | SyncStatus::Error => Ok(None),
        }
    }

    // ========================================================================
    // Report handling
    // ========================================================================

    async fn complete_page(
        &self,
        page: u64,
        photo_count: u64,
        total_pages: Option<u64>,
    ) -> Result<ReportOutcome> {
        let _guard = self.op_lock.lock().await;
        let mut state = self.repository.load().await?;

        if !state.has_run() {
            debug!(page, "Discarding report from before the last reset");
            return Ok(ReportOutcome::Discarded);
        }

        if page <= state.last_processed_page {
            debug!(
                page,
                last_processed_page = state.last_processed_page,
                "Ignoring stale page report"
            );
            return Ok(ReportOutcome::Stale {
                page,
                last_processed_page: state.last_processed_page,
            });
        }

        if total_pages.is_some() {
            state.total_pages = total_pages;
        }

        let mut events = Vec::new();

        // An empty page during a run means the source is exhausted; the
        // checkpoint stays put so the next run re-reads this page.
        if photo_count == 0 && state.status.is_active() {
            state.finish_run()?;
            info!(
                page,
                last_processed_page = state.last_processed_page,
                "Source exhausted, sync finished"
            );
            events.push(SyncEvent::Finished {
                last_processed_page: state.last_processed_page,
            });
            self.repository.save(&state).await?;
            self.publish(events);
            return Ok(ReportOutcome::Finished {
                last_processed_page: state.last_processed_page,
            });
        }

        let advance = state.record_completion(page);
        let gap = matches!(advance, Advance::Gap { .. });
        if let Advance::Gap { expected, page } = advance {
            warn!(
                expected,
                received = page,
                "Page completed out of order, advancing past gap"
            );
            events.push(SyncEvent::OrderingAnomaly {
                expected,
                received: page,
            });
        }
        events.push(SyncEvent::PageCompleted { page, photo_count });

        let outcome = match state.status {
            SyncStatus::Running if state.reached_end() => {
                state.finish_run()?;
                info!(page, "Reached last known page, sync finished");
                events.push(SyncEvent::Finished {
                    last_processed_page: page,
                });
                ReportOutcome::Finished {
                    last_processed_page: page,
                }
            }
            SyncStatus::Running => {
                let next = state.next_page();
                if let Err(e) = self.enqueue(next).await {
                    state.fail(e.to_string());
                    self.repository.save(&state).await?;
                    error!(page, next, error = %e, "Failed to enqueue next page");
                    events.push(SyncEvent::Failed {
                        message: e.to_string(),
                        last_processed_page: state.last_processed_page,
                    });
                    self.publish(events);
                    return Err(e);
                }
                events.push(SyncEvent::PageEnqueued { page: next });
                ReportOutcome::Advanced {
                    page,
                    next_page: Some(next),
                    gap,
                }
            }
            SyncStatus::Stopping => {
                state.finish_run()?;
                info!(page, "In-flight page drained, sync stopped");
                events.push(SyncEvent::Stopped {
                    last_processed_page: page,
                    draining: false,
                });
                ReportOutcome::Advanced {
                    page,
                    next_page: None,
                    gap,
                }
            }
            SyncStatus::Idle | SyncStatus::Error => {
                debug!(page, status = %state.status, "Recorded completion without advancing run");
                ReportOutcome::Advanced {
                    page,
                    next_page: None,
                    gap,
                }
            }
        };

        self.repository.save(&state).await?;
        debug!(page, photo_count, "Page report applied");
        self.publish(events);

        Ok(outcome)
    }

    async fn halt(&self, message: String) -> Result<ReportOutcome> {
        let _guard = self.op_lock.lock().await;
        let mut state = self.repository.load().await?;

        if !state.has_run() {
            debug!("Discarding error report from before the last reset");
            return Ok(ReportOutcome::Discarded);
        }

        state.fail(message.clone());
        self.repository.save(&state).await?;

        error!(
            last_processed_page = state.last_processed_page,
            error = %message,
            "Page failed, sync halted"
        );
        self.publish(vec![SyncEvent::Failed {
            message: message.clone(),
            last_processed_page: state.last_processed_page,
        }]);

        Ok(ReportOutcome::Halted { message })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn enqueue(&self, page: u64) -> Result<()> {
        let message = QueueMessage::new(page, self.clock.unix_timestamp_millis());

        match tokio::time::timeout(self.config.enqueue_timeout, self.queue.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SyncError::Enqueue {
                page,
                reason: e.to_string(),
            }),
            Err(_) => Err(SyncError::Enqueue {
                page,
                reason: format!(
                    "timed out after {} ms",
                    self.config.enqueue_timeout.as_millis()
                ),
            }),
        }
    }

    fn publish(&self, events: Vec<SyncEvent>) {
        for event in events {
            // No subscribers is not an error
            self.event_bus.emit(CoreEvent::Sync(event)).ok();
        }
    }
}

#[async_trait]
impl ReportSink for SyncCoordinator {
    /// In-process delivery. An enqueue failure after the report was applied
    /// still counts as consumed: the failure lives in the coordinator state.
    async fn report(&self, report: PageReport) -> Result<()> {
        match SyncCoordinator::report(self, report).await {
            Ok(_) | Err(SyncError::Enqueue { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
