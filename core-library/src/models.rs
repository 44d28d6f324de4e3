//! Domain models for the photo library

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One photo's flattened metadata.
///
/// `id` is the remote record's natural key; every other column is overwritten
/// on upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: String,
    pub description: Option<String>,
    pub alt_description: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub color: Option<String>,
    pub blur_hash: Option<String>,
    pub likes: Option<i64>,
    pub url_raw: Option<String>,
    pub url_full: Option<String>,
    pub url_regular: Option<String>,
    pub url_small: Option<String>,
    pub url_thumb: Option<String>,
    pub author_username: Option<String>,
    pub author_name: Option<String>,
    pub remote_created_at: Option<String>,
    pub remote_updated_at: Option<String>,
    /// Remote page this row was last seen on
    pub source_page: i64,
    /// Unix milliseconds of the last upsert
    pub synced_at: i64,
}

impl Photo {
    /// Minimal photo with only the required columns set.
    pub fn new(id: impl Into<String>, source_page: i64, synced_at: i64) -> Self {
        Self {
            id: id.into(),
            description: None,
            alt_description: None,
            width: None,
            height: None,
            color: None,
            blur_hash: None,
            likes: None,
            url_raw: None,
            url_full: None,
            url_regular: None,
            url_small: None,
            url_thumb: None,
            author_username: None,
            author_name: None,
            remote_created_at: None,
            remote_updated_at: None,
            source_page,
            synced_at,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Photo id cannot be empty".to_string());
        }

        if self.source_page <= 0 {
            return Err("Source page must be positive".to_string());
        }

        if self.width.is_some_and(|w| w < 0) || self.height.is_some_and(|h| h < 0) {
            return Err("Dimensions cannot be negative".to_string());
        }

        Ok(())
    }

    /// Best URL for mirroring the binary asset.
    pub fn mirror_source_url(&self) -> Option<&str> {
        self.url_regular
            .as_deref()
            .or(self.url_raw.as_deref())
            .or(self.url_full.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(Photo::new("abc", 1, 0).validate().is_ok());
        assert!(Photo::new("  ", 1, 0).validate().is_err());
        assert!(Photo::new("abc", 0, 0).validate().is_err());

        let mut negative = Photo::new("abc", 1, 0);
        negative.width = Some(-1);
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_mirror_source_url_prefers_regular() {
        let mut photo = Photo::new("abc", 1, 0);
        assert_eq!(photo.mirror_source_url(), None);

        photo.url_raw = Some("https://img/raw".to_string());
        assert_eq!(photo.mirror_source_url(), Some("https://img/raw"));

        photo.url_regular = Some("https://img/regular".to_string());
        assert_eq!(photo.mirror_source_url(), Some("https://img/regular"));
    }

    #[test]
    fn test_serializes_camel_case() {
        let photo = Photo::new("abc", 2, 10);
        let json = serde_json::to_value(&photo).unwrap();

        assert_eq!(json["id"], "abc");
        assert_eq!(json["sourcePage"], 2);
        assert!(json.get("urlRegular").is_some());
    }
}
