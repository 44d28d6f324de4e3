use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// HTTP status a control surface should answer with.
    pub fn status_code(&self) -> u16 {
        use core_sync::SyncError;

        match self {
            CoreError::Sync(SyncError::AlreadyRunning { .. }) => 409,
            CoreError::Sync(SyncError::InvalidReport(_))
            | CoreError::Sync(SyncError::InvalidPayload(_))
            | CoreError::Library(core_library::LibraryError::InvalidInput { .. }) => 400,
            _ => 500,
        }
    }

    /// Message safe to show callers. Internal details stay in the logs.
    pub fn user_message(&self) -> String {
        use core_sync::SyncError;

        match self {
            CoreError::Sync(SyncError::AlreadyRunning { status }) => {
                format!("Sync already {}", status)
            }
            CoreError::Sync(SyncError::InvalidReport(_)) => "Invalid report format".to_string(),
            CoreError::Sync(SyncError::Enqueue { page, .. }) => {
                format!("Failed to enqueue page {}", page)
            }
            CoreError::Library(core_library::LibraryError::InvalidInput { field, message }) => {
                format!("Invalid {}: {}", field, message)
            }
            _ => "Internal error".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use core_sync::SyncError;

    #[test]
    fn test_status_codes() {
        let conflict = CoreError::from(SyncError::AlreadyRunning {
            status: "running".to_string(),
        });
        assert_eq!(conflict.status_code(), 409);
        assert_eq!(conflict.user_message(), "Sync already running");

        let invalid = CoreError::from(SyncError::InvalidReport("eof".to_string()));
        assert_eq!(invalid.status_code(), 400);

        let enqueue = CoreError::from(SyncError::Enqueue {
            page: 4,
            reason: "connection reset by peer at 10.0.0.3".to_string(),
        });
        assert_eq!(enqueue.status_code(), 500);
        assert_eq!(enqueue.user_message(), "Failed to enqueue page 4");

        let db = CoreError::from(SyncError::Database("disk I/O error".to_string()));
        assert_eq!(db.status_code(), 500);
        assert_eq!(db.user_message(), "Internal error");
    }
}
