//! # Page Reports
//!
//! The message a page worker sends back to the coordinator once a page is
//! done, plus the seam ([`ReportSink`]) it is delivered through.
//!
//! Wire format (JSON object, untagged):
//!
//! ```text
//! {"pageCompleted": 3, "photoCount": 30, "totalPages": 120}   success
//! {"error": "Failed to process page 3: HTTP 503"}              failure
//! ```
//!
//! `totalPages` is optional and only ever a hint.

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageReport {
    Success {
        #[serde(rename = "pageCompleted")]
        page_completed: u64,
        #[serde(rename = "photoCount")]
        photo_count: u64,
        #[serde(
            rename = "totalPages",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        total_pages: Option<u64>,
    },
    Failure {
        error: String,
    },
}

impl PageReport {
    pub fn success(page_completed: u64, photo_count: u64) -> Self {
        PageReport::Success {
            page_completed,
            photo_count,
            total_pages: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        PageReport::Failure {
            error: error.into(),
        }
    }

    /// Attach a total page hint. No effect on failures.
    pub fn with_total_pages(self, total: Option<u64>) -> Self {
        match self {
            PageReport::Success {
                page_completed,
                photo_count,
                ..
            } => PageReport::Success {
                page_completed,
                photo_count,
                total_pages: total,
            },
            failure => failure,
        }
    }

    /// Decode a report body. Anything other than the two shapes above is
    /// `InvalidReport`.
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| SyncError::InvalidReport(e.to_string()))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PageReport::Success { .. })
    }
}

/// What the coordinator did with a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Checkpoint moved to `page`. `next_page` is set when the follow-up page
    /// was enqueued.
    Advanced {
        page: u64,
        next_page: Option<u64>,
        gap: bool,
    },
    /// Page already covered by the checkpoint.
    Stale { page: u64, last_processed_page: u64 },
    /// The source ran out of data; the run ended.
    Finished { last_processed_page: u64 },
    /// Failure recorded; the run halted.
    Halted { message: String },
    /// No run has started since the last reset; the report was dropped.
    Discarded,
}

// ============================================================================
// Report Sink
// ============================================================================

/// Destination for page reports.
///
/// `Ok` means the report was consumed and the worker may ack its message.
/// On `Err` the worker leaves the message claimed so it is redelivered.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn report(&self, report: PageReport) -> Result<()>;
}

/// Posts reports to a remote control surface's `/report` endpoint.
pub struct HttpReportSink {
    http_client: Arc<dyn HttpClient>,
    url: String,
    timeout: Duration,
}

impl HttpReportSink {
    pub fn new(http_client: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        Self {
            http_client,
            url: url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    #[instrument(skip(self, report), fields(url = %self.url, success = report.is_success()))]
    async fn report(&self, report: PageReport) -> Result<()> {
        let request = HttpRequest::new(HttpMethod::Post, self.url.clone())
            .json(&report)
            .map_err(|e| SyncError::Report(e.to_string()))?
            .timeout(self.timeout);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| SyncError::Report(e.to_string()))?;

        if !response.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SyncError::Report(format!(
                "HTTP {}: {}",
                response.status, body
            )));
        }

        debug!(status = response.status, "Report delivered");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::HttpResponse;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn download_stream(
                &self,
                url: String,
            ) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn test_parse_success() {
        let report = PageReport::parse(br#"{"pageCompleted":3,"photoCount":30}"#).unwrap();
        assert_eq!(report, PageReport::success(3, 30));

        let with_total =
            PageReport::parse(br#"{"pageCompleted":3,"photoCount":30,"totalPages":9}"#).unwrap();
        assert_eq!(
            with_total,
            PageReport::success(3, 30).with_total_pages(Some(9))
        );
    }

    #[test]
    fn test_parse_failure() {
        let report = PageReport::parse(br#"{"error":"HTTP 500"}"#).unwrap();
        assert_eq!(report, PageReport::failure("HTTP 500"));
        assert!(!report.is_success());
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        for body in [
            &b"not json"[..],
            br#"{}"#,
            br#"{"pageCompleted":3}"#,
            br#"{"pageCompleted":-1,"photoCount":2}"#,
            br#"{"error":42}"#,
            br#"[1,2]"#,
        ] {
            assert!(matches!(
                PageReport::parse(body),
                Err(SyncError::InvalidReport(_))
            ));
        }
    }

    #[test]
    fn test_serialize_omits_missing_total() {
        let json = serde_json::to_string(&PageReport::success(1, 0)).unwrap();
        assert_eq!(json, r#"{"pageCompleted":1,"photoCount":0}"#);
    }

    #[tokio::test]
    async fn test_http_sink_posts_json() {
        let mut client = MockHttpClient::new();
        client
            .expect_execute()
            .withf(|request| {
                request.method == HttpMethod::Post
                    && request.url == "http://control/report"
                    && request
                        .body
                        .as_ref()
                        .is_some_and(|b| b.as_ref() == br#"{"pageCompleted":2,"photoCount":5}"#)
            })
            .times(1)
            .returning(|_| Ok(response(200, r#"{"success":true}"#)));

        let sink = HttpReportSink::new(Arc::new(client), "http://control/report");
        sink.report(PageReport::success(2, 5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_sink_surfaces_rejection() {
        let mut client = MockHttpClient::new();
        client
            .expect_execute()
            .returning(|_| Ok(response(500, r#"{"success":false}"#)));

        let sink = HttpReportSink::new(Arc::new(client), "http://control/report");
        let err = sink.report(PageReport::failure("x")).await.unwrap_err();
        assert!(matches!(err, SyncError::Report(ref m) if m.contains("500")));
    }

    #[tokio::test]
    async fn test_http_sink_surfaces_transport_error() {
        let mut client = MockHttpClient::new();
        client
            .expect_execute()
            .returning(|_| Err(BridgeError::OperationFailed("connection refused".to_string())));

        let sink = HttpReportSink::new(Arc::new(client), "http://control/report");
        assert!(matches!(
            sink.report(PageReport::success(1, 1)).await,
            Err(SyncError::Report(_))
        ));
    }
}
