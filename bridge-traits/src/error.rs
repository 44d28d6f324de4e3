use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Remote request failed with status {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether retrying the same call later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::Remote { status, .. } => *status == 429 || *status >= 500,
            BridgeError::Io(_) | BridgeError::OperationFailed(_) => true,
            BridgeError::NotAvailable(_) | BridgeError::InvalidKey(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
