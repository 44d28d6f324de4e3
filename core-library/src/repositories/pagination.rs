//! Pagination helper types for repository queries

use serde::{Deserialize, Serialize};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 12;
/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 50;

/// Pagination request parameters. Pages are 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Build a request, clamping `page` to at least 1 and `page_size` to
    /// `[1, MAX_PAGE_SIZE]`.
    ///
    /// ```
    /// use core_library::repositories::PageRequest;
    ///
    /// let request = PageRequest::new(0, 500);
    /// assert_eq!(request.page, 1);
    /// assert_eq!(request.page_size, 50);
    /// ```
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Build a request from loosely typed query parameters.
    ///
    /// Missing or non-numeric values fall back to page 1 and
    /// [`DEFAULT_PAGE_SIZE`]; numeric values are clamped as in [`PageRequest::new`].
    pub fn from_query(page: Option<&str>, limit: Option<&str>) -> Self {
        let page = page
            .and_then(|p| p.trim().parse::<i64>().ok())
            .map(|p| p.clamp(1, i64::from(u32::MAX)) as u32)
            .unwrap_or(1);
        let limit = limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .map(|l| l.clamp(1, i64::from(MAX_PAGE_SIZE)) as u32)
            .unwrap_or(DEFAULT_PAGE_SIZE);

        Self::new(page, limit)
    }

    /// SQL OFFSET value
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    /// SQL LIMIT value
    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// Paginated response containing items and metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
        }
    }

    pub fn total_pages(&self) -> u64 {
        let size = u64::from(self.page_size);
        (self.total + size - 1) / size
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_is_one_indexed() {
        assert_eq!(PageRequest::new(1, 12).offset(), 0);
        assert_eq!(PageRequest::new(3, 12).offset(), 24);
    }

    #[test]
    fn test_from_query_defaults_and_clamps() {
        assert_eq!(PageRequest::from_query(None, None), PageRequest::new(1, 12));
        assert_eq!(
            PageRequest::from_query(Some("abc"), Some("")),
            PageRequest::new(1, 12)
        );
        assert_eq!(
            PageRequest::from_query(Some("2"), Some("100")).page_size,
            MAX_PAGE_SIZE
        );
        assert_eq!(PageRequest::from_query(Some("-4"), Some("0")), PageRequest::new(1, 1));
        assert_eq!(
            PageRequest::from_query(Some(" 5 "), Some("20")),
            PageRequest::new(5, 20)
        );
    }

    #[test]
    fn test_page_metadata() {
        let page = Page::new(vec![1, 2, 3], 25, PageRequest::new(1, 12));

        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());

        let last = Page::new(vec![25], 25, PageRequest::new(3, 12));
        assert!(!last.has_next());
    }
}
