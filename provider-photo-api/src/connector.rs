//! Photo API connector implementation

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::source::{PhotoPage, PhotoSource, RemotePhoto};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::PhotoApiError;
use crate::types::{ApiErrorBody, ApiPhoto};

const TOTAL_HEADER: &str = "X-Total";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Photo API connector
///
/// # Example
///
/// ```ignore
/// use provider_photo_api::PhotoApiConnector;
/// use bridge_traits::PhotoSource;
///
/// let connector = PhotoApiConnector::new(http_client, "https://api.unsplash.com", access_key);
/// let page = connector.fetch_page(1, 30).await?;
/// ```
pub struct PhotoApiConnector {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    access_key: String,
}

impl PhotoApiConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        access_key: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_key: access_key.into(),
        }
    }

    fn build_request(&self, page: u32, per_page: u32) -> HttpRequest {
        HttpRequest::new(HttpMethod::Get, format!("{}/photos", self.base_url))
            .query("page", page)
            .query("per_page", per_page)
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .header("Accept-Version", "v1")
            .timeout(REQUEST_TIMEOUT)
    }

    fn check_status(response: &HttpResponse) -> std::result::Result<(), PhotoApiError> {
        if response.is_success() {
            return Ok(());
        }

        let message = response
            .json::<ApiErrorBody>()
            .ok()
            .filter(|body| !body.errors.is_empty())
            .map(|body| body.errors.join("; "))
            .unwrap_or_else(|| String::from_utf8_lossy(&response.body).into_owned());

        Err(match response.status {
            401 | 403 => PhotoApiError::Unauthorized {
                status_code: response.status,
                message,
            },
            429 => PhotoApiError::RateLimited,
            status_code => PhotoApiError::ApiError {
                status_code,
                message,
            },
        })
    }

    /// Decode the page body record by record.
    fn parse_photos(response: &HttpResponse) -> std::result::Result<Vec<RemotePhoto>, PhotoApiError> {
        let records: Vec<serde_json::Value> = serde_json::from_slice(&response.body)
            .map_err(|e| PhotoApiError::ParseError(format!("expected a JSON array: {}", e)))?;

        let photos = records
            .into_iter()
            .enumerate()
            .map(|(index, value)| match serde_json::from_value::<ApiPhoto>(value) {
                Ok(api_photo) => RemotePhoto::from(api_photo),
                Err(e) => {
                    warn!(index, error = %e, "Undecodable photo record, keeping it without a key");
                    RemotePhoto::default()
                }
            })
            .collect();

        Ok(photos)
    }

    fn parse_total(response: &HttpResponse) -> Option<u64> {
        response
            .header(TOTAL_HEADER)
            .and_then(|value| value.trim().parse().ok())
    }
}

#[async_trait]
impl PhotoSource for PhotoApiConnector {
    #[instrument(skip(self))]
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<PhotoPage> {
        let response = self.http_client.execute(self.build_request(page, per_page)).await?;

        Self::check_status(&response).map_err(|e| {
            warn!(status = response.status, error = %e, "Photo page request failed");
            e
        })?;

        let photos = Self::parse_photos(&response)?;
        let total_records = Self::parse_total(&response);

        debug!(count = photos.len(), total_records, "Fetched photo page");

        Ok(PhotoPage {
            page,
            photos,
            total_records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
            async fn download_stream(&self, url: String) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
        }
    }

    fn response(status: u16, body: &str, headers: &[(&str, &str)]) -> HttpResponse {
        HttpResponse {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            body: Bytes::from(body.to_string()),
        }
    }

    #[tokio::test]
    async fn test_fetch_page_success() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .withf(|request| {
                request.url == "https://api.example.com/photos?page=2&per_page=30"
                    && request.headers.get("Authorization") == Some(&"Client-ID key123".to_string())
            })
            .returning(|_| {
                Ok(response(
                    200,
                    r#"[{"id": "a", "likes": 3}, {"id": "b"}, {"description": "no id"}]"#,
                    &[("x-total", "95")],
                ))
            });

        let connector =
            PhotoApiConnector::new(Arc::new(mock_http), "https://api.example.com/", "key123");
        let page = connector.fetch_page(2, 30).await.unwrap();

        assert_eq!(page.page, 2);
        assert_eq!(page.photos.len(), 3);
        assert_eq!(page.photos[0].id.as_deref(), Some("a"));
        assert_eq!(page.photos[0].likes, Some(3));
        assert_eq!(page.photos[2].id, None);
        assert_eq!(page.total_records, Some(95));
        assert_eq!(page.total_pages(30), Some(4));
    }

    #[tokio::test]
    async fn test_undecodable_record_is_kept_without_key() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, r#"[{"id": "a"}, {"id": 42}]"#, &[])));

        let connector = PhotoApiConnector::new(Arc::new(mock_http), "https://api.example.com", "k");
        let page = connector.fetch_page(1, 10).await.unwrap();

        assert_eq!(page.photos.len(), 2);
        assert_eq!(page.photos[1].id, None);
        assert_eq!(page.total_records, None);
    }

    #[tokio::test]
    async fn test_malformed_body_is_an_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, r#"{"not": "an array"}"#, &[])));

        let connector = PhotoApiConnector::new(Arc::new(mock_http), "https://api.example.com", "k");
        let result = connector.fetch_page(1, 10).await;

        assert!(matches!(result, Err(BridgeError::OperationFailed(msg)) if msg.contains("Malformed")));
    }

    #[tokio::test]
    async fn test_non_success_status_maps_to_remote_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(401, r#"{"errors": ["OAuth error: The access token is invalid"]}"#, &[])));

        let connector = PhotoApiConnector::new(Arc::new(mock_http), "https://api.example.com", "k");
        let result = connector.fetch_page(1, 10).await;

        match result {
            Err(BridgeError::Remote { status, message }) => {
                assert_eq!(status, 401);
                assert!(message.contains("access token is invalid"));
            }
            other => panic!("unexpected result: {:?}", other.map(|p| p.photos.len())),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Err(BridgeError::OperationFailed("Connection failed".to_string())));

        let connector = PhotoApiConnector::new(Arc::new(mock_http), "https://api.example.com", "k");
        assert!(connector.fetch_page(1, 10).await.is_err());
    }
}
