//! Object Storage Abstraction
//!
//! Binary assets (photo files) are mirrored into an object store addressed by
//! slash-separated keys such as `photos/abc123.jpg`.

use async_trait::async_trait;

use crate::error::{BridgeError, Result};

/// Streamed body accepted by [`ObjectStore::put_stream`].
pub type ObjectReader = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Object store trait
///
/// Implementations must make `put_stream` atomic from the reader's point of
/// view: a partially written object is never visible under its final key.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::ObjectStore;
///
/// async fn mirror(store: &dyn ObjectStore, body: ObjectReader) -> Result<u64> {
///     if store.exists("photos/abc.jpg").await? {
///         return Ok(0);
///     }
///     store.put_stream("photos/abc.jpg", body, Some("image/jpeg")).await
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream `body` into the object at `key`, returning the number of bytes written.
    async fn put_stream(
        &self,
        key: &str,
        body: ObjectReader,
        content_type: Option<&str>,
    ) -> Result<u64>;

    /// Check whether an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Validate an object key.
///
/// Keys are relative, slash-separated and may not contain empty, `.` or `..`
/// segments.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(BridgeError::InvalidKey(key.to_string()));
    }

    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(BridgeError::InvalidKey(key.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("photos/abc.jpg").is_ok());
        assert!(validate_key("abc").is_ok());

        assert!(validate_key("").is_err());
        assert!(validate_key("/photos/abc.jpg").is_err());
        assert!(validate_key("photos/../secret").is_err());
        assert!(validate_key("photos//abc").is_err());
        assert!(validate_key("photos\\abc").is_err());
    }
}
