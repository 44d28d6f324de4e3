//! Integration tests for the sync coordinator
//!
//! These tests drive the coordinator against the real SQLite checkpoint and
//! a recording queue, covering:
//! - Checkpoint monotonicity and stale-report idempotence
//! - At most one enqueue per advance under concurrent `start()`
//! - Resume after error, stop, and reset
//! - Out-of-order completion and enqueue failures
//! - Drain-on-stop and end-of-data handling

use async_trait::async_trait;
use chrono::Utc;
use core_library::db::create_test_pool;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_sync::{
    CoordinatorConfig, Delivery, PageReport, QueueMessage, ReportOutcome,
    SqliteSyncStateRepository, StopOutcome, SyncCoordinator, SyncError, SyncState,
    SyncStateRepository, SyncStatus, TaskQueue,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Mock Implementations
// ============================================================================

/// Queue that records every send and can be told to fail.
#[derive(Default)]
struct RecordingQueue {
    sent: Mutex<Vec<QueueMessage>>,
    fail_sends: AtomicBool,
    send_delay: Option<Duration>,
}

impl RecordingQueue {
    fn with_send_delay(delay: Duration) -> Self {
        Self {
            send_delay: Some(delay),
            ..Default::default()
        }
    }

    fn pages(&self) -> Vec<u64> {
        self.sent.lock().unwrap().iter().map(|m| m.page).collect()
    }

    fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn send(&self, message: QueueMessage) -> core_sync::Result<()> {
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SyncError::Queue("queue unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn receive(&self, _max: u32) -> core_sync::Result<Vec<Delivery>> {
        Ok(Vec::new())
    }

    async fn ack(&self, _delivery: &Delivery) -> core_sync::Result<()> {
        Ok(())
    }

    async fn retry(
        &self,
        _delivery: &Delivery,
        _message: QueueMessage,
        _delay: Duration,
    ) -> core_sync::Result<()> {
        Ok(())
    }

    async fn pending_count(&self) -> core_sync::Result<u64> {
        Ok(0)
    }
}

struct Harness {
    coordinator: Arc<SyncCoordinator>,
    repository: Arc<SqliteSyncStateRepository>,
    queue: Arc<RecordingQueue>,
    event_bus: EventBus,
}

async fn harness_with(queue: RecordingQueue, drain_on_stop: bool) -> Harness {
    let pool = create_test_pool().await.unwrap();
    let repository = Arc::new(SqliteSyncStateRepository::new(pool));
    let queue = Arc::new(queue);
    let event_bus = EventBus::new(64);

    let coordinator = Arc::new(SyncCoordinator::new(
        repository.clone(),
        queue.clone(),
        event_bus.clone(),
        CoordinatorConfig {
            enqueue_timeout: Duration::from_secs(2),
            drain_on_stop,
        },
    ));

    Harness {
        coordinator,
        repository,
        queue,
        event_bus,
    }
}

async fn harness() -> Harness {
    harness_with(RecordingQueue::default(), false).await
}

/// Persist a mid-run checkpoint directly.
async fn seed(h: &Harness, status: SyncStatus, last_processed_page: u64) {
    h.repository
        .save(&SyncState {
            status,
            last_processed_page,
            last_run_start: Some(Utc::now()),
            last_error: (status == SyncStatus::Error).then(|| "previous failure".to_string()),
            total_pages: None,
        })
        .await
        .unwrap();
}

fn drain_events(receiver: &mut tokio::sync::broadcast::Receiver<CoreEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let CoreEvent::Sync(event) = event {
            events.push(event);
        }
    }
    events
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_checkpoint_is_monotonic_across_any_report_sequence() {
    let h = harness().await;
    h.coordinator.start().await.unwrap();

    let mut previous = 0;
    for page in [1, 1, 2, 5, 3, 4, 5, 7, 6, 2, 8] {
        h.coordinator
            .report(PageReport::success(page, 10))
            .await
            .unwrap();
        let current = h.coordinator.status().await.unwrap().last_processed_page;
        assert!(current >= previous, "checkpoint went from {} to {}", previous, current);
        previous = current;
    }

    assert_eq!(previous, 8);
}

#[tokio::test]
async fn test_stale_report_leaves_state_unchanged() {
    let h = harness().await;
    seed(&h, SyncStatus::Running, 5).await;
    let before = h.coordinator.status().await.unwrap();

    let outcome = h
        .coordinator
        .report(PageReport::success(3, 30))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReportOutcome::Stale {
            page: 3,
            last_processed_page: 5
        }
    );
    assert_eq!(h.coordinator.status().await.unwrap(), before);
    assert!(h.queue.pages().is_empty());
}

#[tokio::test]
async fn test_concurrent_start_enqueues_exactly_once() {
    let h = harness_with(
        RecordingQueue::with_send_delay(Duration::from_millis(50)),
        false,
    )
    .await;

    let (first, second) = tokio::join!(h.coordinator.start(), h.coordinator.start());

    let results = [first, second];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.is_conflict()))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(conflicts, 1);
    assert_eq!(h.queue.pages(), vec![1]);
}

#[tokio::test]
async fn test_concurrent_duplicate_reports_advance_once() {
    let h = harness_with(
        RecordingQueue::with_send_delay(Duration::from_millis(50)),
        false,
    )
    .await;
    seed(&h, SyncStatus::Running, 4).await;

    let (first, second) = tokio::join!(
        h.coordinator.report(PageReport::success(5, 30)),
        h.coordinator.report(PageReport::success(5, 30))
    );

    let outcomes = [first.unwrap(), second.unwrap()];
    let advanced = outcomes
        .iter()
        .filter(|o| matches!(o, ReportOutcome::Advanced { page: 5, next_page: Some(6), .. }))
        .count();
    let stale = outcomes
        .iter()
        .filter(|o| {
            matches!(
                o,
                ReportOutcome::Stale {
                    page: 5,
                    last_processed_page: 5
                }
            )
        })
        .count();

    assert_eq!(advanced, 1);
    assert_eq!(stale, 1);
    assert_eq!(h.queue.pages(), vec![6]);
    assert_eq!(h.coordinator.status().await.unwrap().last_processed_page, 5);
}

#[tokio::test]
async fn test_resume_after_error() {
    let h = harness().await;
    seed(&h, SyncStatus::Error, 7).await;

    let outcome = h.coordinator.start().await.unwrap();
    assert_eq!(outcome.page, 8);
    assert!(outcome.resumed);

    let state = h.coordinator.status().await.unwrap();
    assert_eq!(state.status, SyncStatus::Running);
    assert_eq!(state.last_error, None);
    assert_eq!(state.last_processed_page, 7);
    assert_eq!(h.queue.pages(), vec![8]);
}

#[tokio::test]
async fn test_reset_from_every_state() {
    for status in [
        SyncStatus::Idle,
        SyncStatus::Running,
        SyncStatus::Stopping,
        SyncStatus::Error,
    ] {
        let h = harness().await;
        seed(&h, status, 12).await;

        h.coordinator.reset().await.unwrap();

        let state = h.coordinator.status().await.unwrap();
        assert_eq!(state.status, SyncStatus::Idle);
        assert_eq!(state.last_processed_page, 0);
        assert_eq!(state.last_error, None);
        assert_eq!(state.last_run_start, None);
    }
}

#[tokio::test]
async fn test_out_of_order_completion_advances_with_anomaly() {
    let h = harness().await;
    seed(&h, SyncStatus::Running, 4).await;
    let mut events = h.event_bus.subscribe();

    let outcome = h
        .coordinator
        .report(PageReport::success(6, 30))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReportOutcome::Advanced {
            page: 6,
            next_page: Some(7),
            gap: true
        }
    );
    assert_eq!(h.coordinator.status().await.unwrap().last_processed_page, 6);
    assert_eq!(h.queue.pages(), vec![7]);
    assert!(drain_events(&mut events).contains(&SyncEvent::OrderingAnomaly {
        expected: 5,
        received: 6
    }));
}

#[tokio::test]
async fn test_enqueue_failure_during_advance() {
    let h = harness().await;
    h.coordinator.start().await.unwrap();
    h.queue.fail_sends(true);

    let result = h.coordinator.report(PageReport::success(1, 30)).await;
    assert!(matches!(result, Err(SyncError::Enqueue { page: 2, .. })));

    let state = h.coordinator.status().await.unwrap();
    assert_eq!(state.status, SyncStatus::Error);
    assert_eq!(state.last_processed_page, 1);
    assert!(state
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("queue unavailable")));
}

#[tokio::test]
async fn test_enqueue_failure_during_start_is_reported() {
    let h = harness().await;
    h.queue.fail_sends(true);

    assert!(matches!(
        h.coordinator.start().await,
        Err(SyncError::Enqueue { page: 1, .. })
    ));
    let state = h.coordinator.status().await.unwrap();
    assert_eq!(state.status, SyncStatus::Error);

    // A later start succeeds once the queue recovers
    h.queue.fail_sends(false);
    assert_eq!(h.coordinator.start().await.unwrap().page, 1);
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_start_report_stop_resume_scenario() {
    let h = harness().await;

    assert_eq!(h.coordinator.start().await.unwrap().page, 1);
    assert_eq!(h.queue.pages(), vec![1]);

    h.coordinator
        .report(PageReport::success(1, 30))
        .await
        .unwrap();
    let state = h.coordinator.status().await.unwrap();
    assert_eq!(state.last_processed_page, 1);
    assert_eq!(h.queue.pages(), vec![1, 2]);

    assert_eq!(h.coordinator.stop().await.unwrap(), StopOutcome::Stopped);
    assert_eq!(
        h.coordinator.status().await.unwrap().status,
        SyncStatus::Idle
    );
    assert_eq!(h.queue.pages(), vec![1, 2]);

    let resumed = h.coordinator.start().await.unwrap();
    assert_eq!(resumed.page, 2);
    assert_eq!(h.queue.pages(), vec![1, 2, 2]);
}

#[tokio::test]
async fn test_start_while_running_is_conflict() {
    let h = harness().await;
    h.coordinator.start().await.unwrap();

    let err = h.coordinator.start().await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(h.queue.pages(), vec![1]);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let h = harness().await;
    assert_eq!(
        h.coordinator.stop().await.unwrap(),
        StopOutcome::AlreadyStopped
    );

    h.coordinator.start().await.unwrap();
    assert_eq!(h.coordinator.stop().await.unwrap(), StopOutcome::Stopped);
    assert_eq!(
        h.coordinator.stop().await.unwrap(),
        StopOutcome::AlreadyStopped
    );
}

#[tokio::test]
async fn test_stop_keeps_error_visible() {
    let h = harness().await;
    seed(&h, SyncStatus::Error, 3).await;

    assert_eq!(h.coordinator.stop().await.unwrap(), StopOutcome::NotRunning);
    let state = h.coordinator.status().await.unwrap();
    assert_eq!(state.status, SyncStatus::Error);
    assert_eq!(state.last_error.as_deref(), Some("previous failure"));
}

#[tokio::test]
async fn test_late_report_after_stop_is_bookkeeping_only() {
    let h = harness().await;
    h.coordinator.start().await.unwrap();
    h.coordinator.stop().await.unwrap();

    let outcome = h
        .coordinator
        .report(PageReport::success(1, 30))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReportOutcome::Advanced {
            page: 1,
            next_page: None,
            gap: false
        }
    );
    let state = h.coordinator.status().await.unwrap();
    assert_eq!(state.status, SyncStatus::Idle);
    assert_eq!(state.last_processed_page, 1);
    assert_eq!(h.queue.pages(), vec![1]);
}

#[tokio::test]
async fn test_drain_on_stop_waits_for_in_flight_page() {
    let h = harness_with(RecordingQueue::default(), true).await;
    h.coordinator.start().await.unwrap();

    assert_eq!(h.coordinator.stop().await.unwrap(), StopOutcome::Draining);
    assert_eq!(
        h.coordinator.status().await.unwrap().status,
        SyncStatus::Stopping
    );
    assert!(h.coordinator.start().await.unwrap_err().is_conflict());

    h.coordinator
        .report(PageReport::success(1, 30))
        .await
        .unwrap();

    let state = h.coordinator.status().await.unwrap();
    assert_eq!(state.status, SyncStatus::Idle);
    assert_eq!(state.last_processed_page, 1);
    assert_eq!(h.queue.pages(), vec![1]);
}

#[tokio::test]
async fn test_error_report_halts_without_advancing() {
    let h = harness().await;
    h.coordinator.start().await.unwrap();
    h.coordinator
        .report(PageReport::success(1, 30))
        .await
        .unwrap();

    let outcome = h
        .coordinator
        .report(PageReport::failure("HTTP 503 from source"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReportOutcome::Halted {
            message: "HTTP 503 from source".to_string()
        }
    );

    let state = h.coordinator.status().await.unwrap();
    assert_eq!(state.status, SyncStatus::Error);
    assert_eq!(state.last_error.as_deref(), Some("HTTP 503 from source"));
    assert_eq!(state.last_processed_page, 1);
    assert_eq!(h.queue.pages(), vec![1, 2]);
}

#[tokio::test]
async fn test_empty_page_finishes_run() {
    let h = harness().await;
    h.coordinator.start().await.unwrap();
    h.coordinator
        .report(PageReport::success(1, 30))
        .await
        .unwrap();
    let mut events = h.event_bus.subscribe();

    let outcome = h
        .coordinator
        .report(PageReport::success(2, 0))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReportOutcome::Finished {
            last_processed_page: 1
        }
    );
    let state = h.coordinator.status().await.unwrap();
    assert_eq!(state.status, SyncStatus::Idle);
    assert_eq!(state.last_processed_page, 1);
    assert_eq!(h.queue.pages(), vec![1, 2]);
    assert!(drain_events(&mut events).contains(&SyncEvent::Finished {
        last_processed_page: 1
    }));
}

#[tokio::test]
async fn test_empty_page_while_idle_is_bookkeeping_only() {
    let h = harness().await;
    seed(&h, SyncStatus::Idle, 4).await;
    let mut events = h.event_bus.subscribe();

    let outcome = h
        .coordinator
        .report(PageReport::success(5, 0))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReportOutcome::Advanced {
            page: 5,
            next_page: None,
            gap: false
        }
    );
    let state = h.coordinator.status().await.unwrap();
    assert_eq!(state.status, SyncStatus::Idle);
    assert_eq!(state.last_processed_page, 5);
    assert!(h.queue.pages().is_empty());
    assert!(!drain_events(&mut events)
        .iter()
        .any(|e| matches!(e, SyncEvent::Finished { .. })));
}

#[tokio::test]
async fn test_known_total_pages_finishes_run() {
    let h = harness().await;
    h.coordinator.start().await.unwrap();

    h.coordinator
        .report(PageReport::success(1, 30).with_total_pages(Some(2)))
        .await
        .unwrap();
    let outcome = h
        .coordinator
        .report(PageReport::success(2, 12))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReportOutcome::Finished {
            last_processed_page: 2
        }
    );
    let state = h.coordinator.status().await.unwrap();
    assert_eq!(state.status, SyncStatus::Idle);
    assert_eq!(state.total_pages, Some(2));
    assert_eq!(h.queue.pages(), vec![1, 2]);
}

#[tokio::test]
async fn test_reports_after_reset_are_discarded() {
    let h = harness().await;
    h.coordinator.start().await.unwrap();
    h.coordinator.reset().await.unwrap();

    assert_eq!(
        h.coordinator
            .report(PageReport::success(1, 30))
            .await
            .unwrap(),
        ReportOutcome::Discarded
    );
    assert_eq!(
        h.coordinator
            .report(PageReport::failure("late"))
            .await
            .unwrap(),
        ReportOutcome::Discarded
    );
    assert_eq!(h.coordinator.status().await.unwrap(), SyncState::new());

    // A fresh run starts from page 1 again
    assert_eq!(h.coordinator.start().await.unwrap().page, 1);
}

#[tokio::test]
async fn test_lifecycle_events() {
    let h = harness().await;
    let mut events = h.event_bus.subscribe();

    h.coordinator.start().await.unwrap();
    h.coordinator
        .report(PageReport::success(1, 5))
        .await
        .unwrap();
    h.coordinator.stop().await.unwrap();

    assert_eq!(
        drain_events(&mut events),
        vec![
            SyncEvent::Started { page: 1 },
            SyncEvent::PageEnqueued { page: 1 },
            SyncEvent::PageCompleted {
                page: 1,
                photo_count: 5
            },
            SyncEvent::PageEnqueued { page: 2 },
            SyncEvent::Stopped {
                last_processed_page: 1,
                draining: false
            },
        ]
    );
}
