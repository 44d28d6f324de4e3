//! # Event Bus System
//!
//! Broadcast channel for sync lifecycle and library change notifications.
//!
//! ## Overview
//!
//! The [`EventBus`] wraps `tokio::sync::broadcast`. Producers call
//! [`EventBus::emit`] and ignore the "no subscribers" error with `.ok()`;
//! consumers call [`EventBus::subscribe`].
//!
//! Events are notifications only. Nothing in the sync core reads them back
//! to make decisions; the persisted sync state is the source of truth.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut subscriber = bus.subscribe();
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::PageEnqueued { page: 1 })).ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event, CoreEvent::Sync(SyncEvent::PageEnqueued { page: 1 }));
//! # }
//! ```
//!
//! Slow subscribers receive `RecvError::Lagged(n)` instead of blocking
//! producers.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Sync(SyncEvent),
    Library(LibraryEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Library(LibraryEvent::AssetMirrorFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::OrderingAnomaly { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Started { .. })
            | CoreEvent::Sync(SyncEvent::Stopped { .. })
            | CoreEvent::Sync(SyncEvent::Finished { .. })
            | CoreEvent::Sync(SyncEvent::Reset) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Sync coordinator lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A run started (or resumed) at `page`.
    Started { page: u64 },
    /// A page request was handed to the task queue.
    PageEnqueued { page: u64 },
    /// A page's metadata was confirmed durable.
    PageCompleted { page: u64, photo_count: u64 },
    /// A completion arrived for a page beyond the expected next page.
    OrderingAnomaly { expected: u64, received: u64 },
    /// The run was stopped (or is draining) by request.
    Stopped { last_processed_page: u64, draining: bool },
    /// The run reached the end of the remote data.
    Finished { last_processed_page: u64 },
    /// The run halted with an error.
    Failed {
        message: String,
        last_processed_page: u64,
    },
    /// Progress was discarded.
    Reset,
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::PageEnqueued { .. } => "Page enqueued",
            SyncEvent::PageCompleted { .. } => "Page completed",
            SyncEvent::OrderingAnomaly { .. } => "Out-of-order page completion",
            SyncEvent::Stopped { .. } => "Sync stopped",
            SyncEvent::Finished { .. } => "Sync reached end of data",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::Reset => "Sync progress reset",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Metadata store and asset mirror events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// A page's records were written to the metadata store.
    PhotosUpserted {
        page: u64,
        upserted: u64,
        skipped: u64,
        failed: u64,
    },
    AssetMirrored { photo_id: String, key: String, bytes: u64 },
    AssetMirrorFailed { photo_id: String, message: String },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::PhotosUpserted { .. } => "Photos upserted",
            LibraryEvent::AssetMirrored { .. } => "Asset mirrored",
            LibraryEvent::AssetMirrorFailed { .. } => "Asset mirroring failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus holding at most `capacity` undelivered events
    /// per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emits an event to all current subscribers.
    ///
    /// Returns the number of subscribers that received it, or an error when
    /// nobody is listening. Callers that do not care use `.ok()`.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
