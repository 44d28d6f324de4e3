//! Error types for the photo API provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhotoApiError {
    /// The access key was rejected
    #[error("Unauthorized (status {status_code}): {message}")]
    Unauthorized { status_code: u16, message: String },

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Photo API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, PhotoApiError>;

impl From<PhotoApiError> for BridgeError {
    fn from(error: PhotoApiError) -> Self {
        match error {
            PhotoApiError::Unauthorized {
                status_code,
                message,
            } => BridgeError::Remote {
                status: status_code,
                message: format!("unauthorized: {}", message),
            },
            PhotoApiError::RateLimited => BridgeError::Remote {
                status: 429,
                message: "rate limit exceeded".to_string(),
            },
            PhotoApiError::ApiError {
                status_code,
                message,
            } => BridgeError::Remote {
                status: status_code,
                message,
            },
            PhotoApiError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Malformed photo page: {}", msg))
            }
            PhotoApiError::Bridge(e) => e,
        }
    }
}
