//! # Sync Module
//!
//! Resumable, page-by-page ingestion of a remote photo catalogue.
//!
//! ## Overview
//!
//! A run walks the remote catalogue one page at a time. The coordinator
//! enqueues a page, a worker fetches and stores it, reports back, and the
//! coordinator advances its checkpoint and enqueues the next page. Progress
//! survives restarts, stops and failures because the checkpoint
//! (`lastProcessedPage`) is the only thing a new run needs.
//!
//! ## Components
//!
//! - **State Machine** (`state`): `SyncState`, `SyncStatus` and the advance rule
//! - **Repository** (`repository`): Durable single-row checkpoint
//! - **Task Queue** (`queue`): At-least-once page delivery with visibility timeouts
//! - **Reports** (`report`): Worker → coordinator contract and delivery sinks
//! - **Sync Coordinator** (`coordinator`): Serialized owner of the checkpoint
//! - **Record Materializer** (`materializer`): Idempotent per-record upserts
//! - **Asset Mirror** (`mirror`): Detached best-effort binary copies
//! - **Page Worker** (`worker`): Queue consumer with bounded retry

pub mod coordinator;
pub mod error;
pub mod materializer;
pub mod mirror;
pub mod queue;
pub mod report;
pub mod repository;
pub mod state;
pub mod worker;

pub use coordinator::{CoordinatorConfig, StartOutcome, SyncCoordinator};
pub use error::{Result, SyncError};
pub use materializer::{MaterializeOutcome, RecordMaterializer};
pub use mirror::{AssetMirror, MirrorResult};
pub use queue::{
    Delivery, MessageId, QueueMessage, SqliteTaskQueue, TaskQueue, DEFAULT_VISIBILITY_TIMEOUT,
};
pub use report::{HttpReportSink, PageReport, ReportOutcome, ReportSink};
pub use repository::{SqliteSyncStateRepository, SyncStateRepository};
pub use state::{Advance, StopOutcome, SyncState, SyncStatus};
pub use worker::{DeliveryOutcome, PageWorker, WorkerConfig, WorkerRunner};
