use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Conflict: a run is already active.
    #[error("Sync already {status}")]
    AlreadyRunning { status: String },

    #[error("Failed to enqueue page {page}: {reason}")]
    Enqueue { page: u64, reason: String },

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Invalid queue payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid page report: {0}")]
    InvalidReport(String),

    #[error("Failed to materialize page {page}: {message}")]
    Materialize { page: u64, message: String },

    #[error("Source error: {0}")]
    Source(#[from] BridgeError),

    #[error("Report delivery failed: {0}")]
    Report(String),

    #[error("Invalid sync status: {0}")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Library(#[from] LibraryError),
}

impl SyncError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::AlreadyRunning { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
