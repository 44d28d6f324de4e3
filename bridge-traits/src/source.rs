//! Remote Photo Source Abstraction
//!
//! A paginated, read-only view of a remote photo catalogue. Connectors map
//! their wire format onto [`RemotePhoto`] so the rest of the system never
//! sees provider-specific JSON.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Image URLs in decreasing size order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoUrls {
    pub raw: Option<String>,
    pub full: Option<String>,
    pub regular: Option<String>,
    pub small: Option<String>,
    pub thumb: Option<String>,
}

/// Photo metadata as reported by the remote source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemotePhoto {
    /// Natural key. Records without one cannot be upserted.
    pub id: Option<String>,
    pub description: Option<String>,
    pub alt_description: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub color: Option<String>,
    pub blur_hash: Option<String>,
    pub likes: Option<i64>,
    pub urls: PhotoUrls,
    pub author_username: Option<String>,
    pub author_name: Option<String>,
    /// Remote creation time, as sent by the source
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// One fetched page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoPage {
    pub page: u32,
    pub photos: Vec<RemotePhoto>,
    /// Total number of records across all pages, if the source reports it.
    pub total_records: Option<u64>,
}

impl PhotoPage {
    /// Number of pages implied by `total_records` at `per_page` records each.
    pub fn total_pages(&self, per_page: u32) -> Option<u64> {
        let per_page = u64::from(per_page);
        if per_page == 0 {
            return None;
        }
        self.total_records.map(|total| total.div_ceil(per_page))
    }
}

/// Paginated photo source.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// Fetch one 1-indexed page of `per_page` records.
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<PhotoPage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        let page = PhotoPage {
            page: 1,
            photos: vec![],
            total_records: Some(61),
        };

        assert_eq!(page.total_pages(30), Some(3));
        assert_eq!(page.total_pages(0), None);

        let unknown = PhotoPage::default();
        assert_eq!(unknown.total_pages(30), None);
    }

    #[test]
    fn test_total_pages_huge_remote_total() {
        let page = PhotoPage {
            page: 1,
            photos: vec![],
            total_records: Some(u64::MAX),
        };

        assert_eq!(page.total_pages(30), Some(u64::MAX / 30 + 1));
        assert_eq!(page.total_pages(1), Some(u64::MAX));
    }
}
