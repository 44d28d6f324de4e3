//! # Page Task Queue
//!
//! At-least-once delivery of page messages between the coordinator and the
//! page workers.
//!
//! ## Overview
//!
//! - [`QueueMessage`]: the JSON payload `{page, retryCount?, lastError?, timestamp?}`
//! - [`TaskQueue`]: send / receive / ack / retry
//! - [`SqliteTaskQueue`]: durable implementation on the shared database
//!
//! A received message is claimed for the queue's visibility timeout. If it is
//! neither acked nor retried before the timeout expires it becomes
//! receivable again, so a crashed worker never loses a page. Consumers must
//! therefore be idempotent.
//!
//! Deliveries carry the raw payload text. Decoding happens in the consumer so
//! a malformed message can be acked and dropped instead of poisoning the
//! queue.

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Default claim duration for received messages
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Message
// ============================================================================

/// Page work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    pub page: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Enqueue time, unix millis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl QueueMessage {
    pub fn new(page: u64, timestamp: i64) -> Self {
        Self {
            page,
            retry_count: None,
            last_error: None,
            timestamp: Some(timestamp),
        }
    }

    /// Decode and validate a raw payload. The page must be a positive
    /// integer that the photo source can address.
    pub fn parse(raw: &str) -> Result<Self> {
        let message: QueueMessage =
            serde_json::from_str(raw).map_err(|e| SyncError::InvalidPayload(e.to_string()))?;

        if message.page == 0 || message.page > u64::from(u32::MAX) {
            return Err(SyncError::InvalidPayload(format!(
                "page out of range: {}",
                message.page
            )));
        }

        Ok(message)
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count.unwrap_or(0)
    }

    /// The message to requeue after a failed attempt.
    pub fn retried(&self, error: impl Into<String>, timestamp: i64) -> Self {
        Self {
            page: self.page,
            retry_count: Some(self.retry_count() + 1),
            last_error: Some(error.into()),
            timestamp: Some(timestamp),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| SyncError::Queue(e.to_string()))
    }
}

/// Type-safe queue message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::Queue(format!("Invalid message id {}: {}", s, e)))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A claimed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: MessageId,
    /// Payload exactly as enqueued
    pub raw: String,
    /// Number of times this message has been received, including this one
    pub attempts: u32,
}

// ============================================================================
// Queue Trait
// ============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a message for immediate delivery.
    async fn send(&self, message: QueueMessage) -> Result<()>;

    /// Claim up to `max` available messages.
    async fn receive(&self, max: u32) -> Result<Vec<Delivery>>;

    /// Remove a delivered message permanently.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Replace a delivered message's payload with `message` and make it
    /// receivable again after `delay`.
    async fn retry(&self, delivery: &Delivery, message: QueueMessage, delay: Duration)
        -> Result<()>;

    /// Messages not yet acked, claimed or not.
    async fn pending_count(&self) -> Result<u64>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// Durable queue stored in the `page_queue` table.
pub struct SqliteTaskQueue {
    pool: SqlitePool,
    visibility_timeout: Duration,
}

#[derive(Debug, FromRow)]
struct ClaimedRow {
    id: String,
    payload: String,
    attempts: i64,
    available_at: i64,
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl SqliteTaskQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
        }
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Initialize database table if it doesn't exist
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS page_queue (
                id TEXT PRIMARY KEY NOT NULL,
                payload TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                available_at INTEGER NOT NULL,
                claimed_until INTEGER,
                enqueued_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_page_queue_available
            ON page_queue(available_at ASC, enqueued_at ASC)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    /// Enqueue a payload without validation. Lets operators and tests inject
    /// messages that bypass [`QueueMessage`].
    pub async fn send_raw(&self, payload: &str) -> Result<MessageId> {
        let id = MessageId::new();
        let now = Utc::now().timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO page_queue (id, payload, attempts, available_at, claimed_until, enqueued_at)
            VALUES (?, ?, 0, ?, NULL, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(payload)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Queue(e.to_string()))?;

        debug!(message_id = %id, "Enqueued message");
        Ok(id)
    }
}

#[async_trait]
impl TaskQueue for SqliteTaskQueue {
    #[instrument(skip(self), fields(page = message.page))]
    async fn send(&self, message: QueueMessage) -> Result<()> {
        self.send_raw(&message.to_json()?).await?;
        Ok(())
    }

    async fn receive(&self, max: u32) -> Result<Vec<Delivery>> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let now = Utc::now().timestamp_millis();
        let claimed_until = now.saturating_add(millis(self.visibility_timeout));

        // Single statement so concurrent receivers never claim the same row.
        let mut rows = sqlx::query_as::<_, ClaimedRow>(
            r#"
            UPDATE page_queue
            SET claimed_until = ?, attempts = attempts + 1
            WHERE id IN (
                SELECT id FROM page_queue
                WHERE available_at <= ?
                  AND (claimed_until IS NULL OR claimed_until <= ?)
                ORDER BY available_at ASC, enqueued_at ASC
                LIMIT ?
            )
            RETURNING id, payload, attempts, available_at
            "#,
        )
        .bind(claimed_until)
        .bind(now)
        .bind(now)
        .bind(i64::from(max))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Queue(e.to_string()))?;

        rows.sort_by_key(|row| row.available_at);

        rows.into_iter()
            .map(|row| {
                Ok(Delivery {
                    id: MessageId::from_string(&row.id)?,
                    raw: row.payload,
                    attempts: u32::try_from(row.attempts).unwrap_or(u32::MAX),
                })
            })
            .collect()
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        sqlx::query("DELETE FROM page_queue WHERE id = ?")
            .bind(delivery.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Queue(e.to_string()))?;

        debug!(message_id = %delivery.id, "Acked message");
        Ok(())
    }

    #[instrument(skip(self, delivery, message), fields(message_id = %delivery.id, page = message.page))]
    async fn retry(
        &self,
        delivery: &Delivery,
        message: QueueMessage,
        delay: Duration,
    ) -> Result<()> {
        let available_at = Utc::now().timestamp_millis().saturating_add(millis(delay));

        let result = sqlx::query(
            r#"
            UPDATE page_queue
            SET payload = ?, available_at = ?, claimed_until = NULL
            WHERE id = ?
            "#,
        )
        .bind(message.to_json()?)
        .bind(available_at)
        .bind(delivery.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Queue(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::Queue(format!(
                "Message {} no longer in queue",
                delivery.id
            )));
        }

        Ok(())
    }

    async fn pending_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM page_queue")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::Queue(e.to_string()))?;

        Ok(u64::try_from(count).unwrap_or(0))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::db::create_test_pool;

    async fn create_queue(visibility: Duration) -> SqliteTaskQueue {
        let queue = SqliteTaskQueue::new(create_test_pool().await.unwrap())
            .with_visibility_timeout(visibility);
        queue.initialize().await.unwrap();
        queue
    }

    #[test]
    fn test_message_wire_shape() {
        let json = QueueMessage::new(3, 1_700_000_000_000).to_json().unwrap();
        assert_eq!(json, r#"{"page":3,"timestamp":1700000000000}"#);

        let retried = QueueMessage::new(3, 0).retried("HTTP 500", 5);
        let value: serde_json::Value = serde_json::from_str(&retried.to_json().unwrap()).unwrap();
        assert_eq!(value["retryCount"], 1);
        assert_eq!(value["lastError"], "HTTP 500");
    }

    #[test]
    fn test_parse_rejects_invalid_pages() {
        assert!(QueueMessage::parse(r#"{"page":1}"#).is_ok());
        for raw in [
            "not json",
            r#"{}"#,
            r#"{"page":0}"#,
            r#"{"page":-2}"#,
            r#"{"page":1.5}"#,
            r#"{"page":"3"}"#,
            r#"{"page":99999999999}"#,
        ] {
            assert!(
                matches!(QueueMessage::parse(raw), Err(SyncError::InvalidPayload(_))),
                "{} should be rejected",
                raw
            );
        }
    }

    #[tokio::test]
    async fn test_send_receive_ack() {
        let queue = create_queue(DEFAULT_VISIBILITY_TIMEOUT).await;
        queue.send(QueueMessage::new(1, 0)).await.unwrap();

        let deliveries = queue.receive(10).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].attempts, 1);
        assert_eq!(QueueMessage::parse(&deliveries[0].raw).unwrap().page, 1);

        // Claimed messages are invisible
        assert!(queue.receive(10).await.unwrap().is_empty());
        assert_eq!(queue.pending_count().await.unwrap(), 1);

        queue.ack(&deliveries[0]).await.unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_receive_respects_batch_size() {
        let queue = create_queue(DEFAULT_VISIBILITY_TIMEOUT).await;
        for page in 1..=5 {
            queue.send(QueueMessage::new(page, 0)).await.unwrap();
        }

        assert_eq!(queue.receive(2).await.unwrap().len(), 2);
        assert_eq!(queue.receive(10).await.unwrap().len(), 3);
        assert!(queue.receive(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unacked_message_is_redelivered_after_visibility_timeout() {
        let queue = create_queue(Duration::ZERO).await;
        queue.send(QueueMessage::new(4, 0)).await.unwrap();

        let first = queue.receive(1).await.unwrap();
        let second = queue.receive(1).await.unwrap();

        assert_eq!(first[0].id, second[0].id);
        assert_eq!(second[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_delayed_retry_is_not_immediately_visible() {
        let queue = create_queue(DEFAULT_VISIBILITY_TIMEOUT).await;
        let message = QueueMessage::new(2, 0);
        queue.send(message.clone()).await.unwrap();

        let delivery = queue.receive(1).await.unwrap().remove(0);
        queue
            .retry(&delivery, message.retried("HTTP 503", 1), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(queue.receive(10).await.unwrap().is_empty());
        assert_eq!(queue.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retry_replaces_payload() {
        let queue = create_queue(DEFAULT_VISIBILITY_TIMEOUT).await;
        let original = QueueMessage::new(7, 0);
        queue.send(original.clone()).await.unwrap();

        let delivery = queue.receive(1).await.unwrap().remove(0);
        queue
            .retry(&delivery, original.retried("timeout", 1), Duration::ZERO)
            .await
            .unwrap();

        let redelivered = queue.receive(1).await.unwrap().remove(0);
        assert_eq!(redelivered.id, delivery.id);
        let message = QueueMessage::parse(&redelivered.raw).unwrap();
        assert_eq!(message.retry_count(), 1);
        assert_eq!(message.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_retry_after_ack_fails() {
        let queue = create_queue(DEFAULT_VISIBILITY_TIMEOUT).await;
        queue.send(QueueMessage::new(1, 0)).await.unwrap();
        let delivery = queue.receive(1).await.unwrap().remove(0);
        queue.ack(&delivery).await.unwrap();

        let result = queue
            .retry(&delivery, QueueMessage::new(1, 0), Duration::ZERO)
            .await;
        assert!(matches!(result, Err(SyncError::Queue(_))));
    }

    #[tokio::test]
    async fn test_send_raw_preserves_payload() {
        let queue = create_queue(DEFAULT_VISIBILITY_TIMEOUT).await;
        queue.send_raw("{garbage").await.unwrap();

        let delivery = queue.receive(1).await.unwrap().remove(0);
        assert_eq!(delivery.raw, "{garbage");
    }
}
