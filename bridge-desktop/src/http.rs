//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use futures_util::TryStreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("photo-sync/", env!("CARGO_PKG_VERSION"));

/// Reqwest-based HTTP client implementation
///
/// Retries connection failures, timeouts, 5xx and 429 responses according to
/// its [`RetryPolicy`]. Other statuses are returned to the caller untouched.
pub struct ReqwestHttpClient {
    client: Client,
    policy: RetryPolicy,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with a 30 second request timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    fn build_request(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(Self::convert_method(request.method), &request.url);

        for (key, value) in &request.headers {
            req = req.header(key, value);
        }
        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    fn is_retryable_status(status: u16) -> bool {
        status >= 500 || status == 429
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            debug!(
                attempt = attempt + 1,
                max_attempts,
                url = %request.url,
                "Executing HTTP request"
            );

            let outcome = match self.build_request(&request).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let headers: HashMap<String, String> = response
                        .headers()
                        .iter()
                        .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
                        .collect();
                    let body = response
                        .bytes()
                        .await
                        .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;

                    Ok(HttpResponse {
                        status,
                        headers,
                        body,
                    })
                }
                Err(e) if e.is_timeout() => {
                    Err(BridgeError::OperationFailed("Request timed out".to_string()))
                }
                Err(e) if e.is_connect() => Err(BridgeError::OperationFailed(format!(
                    "Connection failed: {}",
                    e
                ))),
                Err(e) => Err(BridgeError::OperationFailed(e.to_string())),
            };

            attempt += 1;
            let retryable = match &outcome {
                Ok(response) => Self::is_retryable_status(response.status),
                Err(_) => true,
            };
            if !retryable || attempt >= max_attempts {
                return outcome;
            }

            let delay = self.policy.delay_for(attempt - 1);
            match &outcome {
                Ok(response) => warn!(status = response.status, attempt, "Retryable HTTP status"),
                Err(e) => warn!(error = %e, attempt, "HTTP request failed"),
            }
            debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
            sleep(delay).await;
        }
    }

    async fn download_stream(
        &self,
        url: String,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Remote {
                status: status.as_u16(),
                message: format!("download of {} failed", url),
            });
        }

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::new(tokio_util::io::StreamReader::new(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_creation() {
        let client = ReqwestHttpClient::new().unwrap();
        assert_eq!(client.policy.max_attempts, 3);
    }

    #[test]
    fn test_method_conversion() {
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Get),
            reqwest::Method::GET
        );
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Post),
            reqwest::Method::POST
        );
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(ReqwestHttpClient::is_retryable_status(503));
        assert!(ReqwestHttpClient::is_retryable_status(429));
        assert!(!ReqwestHttpClient::is_retryable_status(404));
        assert!(!ReqwestHttpClient::is_retryable_status(200));
    }
}
