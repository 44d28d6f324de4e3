//! # Core Configuration Module
//!
//! Settings and injected capabilities for the photo sync service.
//!
//! ## Overview
//!
//! [`CoreConfig`] is assembled with [`CoreConfigBuilder`] or loaded from
//! `PHOTO_SYNC_*` environment variables with [`CoreConfig::from_env`]. Both
//! paths run the same fail-fast validation, so a service never starts with a
//! configuration it cannot honour.
//!
//! Capabilities (`HttpClient`, `ObjectStore`, `LoggerSink`) are optional
//! here; the service layer injects native defaults when they are absent.
//!
//! When [`CoreConfig::logging`] is set the service installs the global
//! subscriber at bootstrap, forwarding to `logger_sink` if one was injected.
//! `from_env` always enables it, honouring `PHOTO_SYNC_LOG_FORMAT`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .api_access_key("my-access-key")
//!     .database_path("/var/lib/photo-sync/photos.db")
//!     .per_page(30)
//!     .max_retries(2)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::logging::{LogFormat, LoggingConfig};
use bridge_traits::{HttpClient, LoggerSink, ObjectStore};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.unsplash.com";
pub const DEFAULT_DATABASE_PATH: &str = "photo-sync.db";
/// Upper bound the remote API accepts for `per_page`.
pub const MAX_PER_PAGE: u32 = 30;

const ENV_PREFIX: &str = "PHOTO_SYNC_";

/// Core configuration.
#[derive(Clone)]
pub struct CoreConfig {
    pub database_path: PathBuf,
    /// Root of the local object store, if no `ObjectStore` is injected
    pub asset_root: Option<PathBuf>,

    pub api_base_url: String,
    pub api_access_key: String,
    pub per_page: u32,

    /// Requeue attempts before a failing page is reported as an error.
    /// Zero means report on first failure.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub max_retry_delay: Duration,

    /// Bound on every enqueue issued by the coordinator
    pub enqueue_timeout: Duration,
    pub drain_on_stop: bool,

    pub worker_concurrency: usize,
    pub queue_batch_size: u32,
    pub queue_poll_interval: Duration,
    pub visibility_timeout: Duration,

    pub event_buffer_size: usize,

    /// Subscriber installed at bootstrap; `None` leaves logging to the host
    pub logging: Option<LoggingConfig>,

    pub http_client: Option<Arc<dyn HttpClient>>,
    pub object_store: Option<Arc<dyn ObjectStore>>,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("asset_root", &self.asset_root)
            .field("api_base_url", &self.api_base_url)
            .field("api_access_key", &"[REDACTED]")
            .field("per_page", &self.per_page)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("max_retry_delay", &self.max_retry_delay)
            .field("enqueue_timeout", &self.enqueue_timeout)
            .field("drain_on_stop", &self.drain_on_stop)
            .field("worker_concurrency", &self.worker_concurrency)
            .field("queue_batch_size", &self.queue_batch_size)
            .field("logging", &self.logging.as_ref().map(|logging| logging.format))
            .field("http_client", &self.http_client.as_ref().map(|_| "HttpClient { ... }"))
            .field("object_store", &self.object_store.as_ref().map(|_| "ObjectStore { ... }"))
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Load configuration from `PHOTO_SYNC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Names are passed with the `PHOTO_SYNC_` prefix already applied.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, suffix)).filter(|value| !value.trim().is_empty())
        };

        let mut builder = CoreConfig::builder();

        if let Some(path) = get("DATABASE_PATH") {
            builder = builder.database_path(path);
        }
        if let Some(root) = get("ASSET_ROOT") {
            builder = builder.asset_root(root);
        }
        if let Some(url) = get("API_BASE_URL") {
            builder = builder.api_base_url(url);
        }
        if let Some(key) = get("API_ACCESS_KEY") {
            builder = builder.api_access_key(key);
        }
        if let Some(value) = get("PER_PAGE") {
            builder = builder.per_page(parse_var("PER_PAGE", &value)?);
        }
        if let Some(value) = get("MAX_RETRIES") {
            builder = builder.max_retries(parse_var("MAX_RETRIES", &value)?);
        }
        if let Some(value) = get("RETRY_BASE_DELAY_MS") {
            builder = builder.retry_base_delay(Duration::from_millis(parse_var(
                "RETRY_BASE_DELAY_MS",
                &value,
            )?));
        }
        if let Some(value) = get("ENQUEUE_TIMEOUT_MS") {
            builder = builder.enqueue_timeout(Duration::from_millis(parse_var(
                "ENQUEUE_TIMEOUT_MS",
                &value,
            )?));
        }
        if let Some(value) = get("WORKER_CONCURRENCY") {
            builder = builder.worker_concurrency(parse_var("WORKER_CONCURRENCY", &value)?);
        }
        if let Some(value) = get("QUEUE_BATCH_SIZE") {
            builder = builder.queue_batch_size(parse_var("QUEUE_BATCH_SIZE", &value)?);
        }
        if let Some(value) = get("DRAIN_ON_STOP") {
            builder = builder.drain_on_stop(parse_var("DRAIN_ON_STOP", &value)?);
        }

        let mut logging = LoggingConfig::default();
        if let Some(value) = get("LOG_FORMAT") {
            logging = logging.with_format(value.parse::<LogFormat>()?);
        }
        builder = builder.logging(logging);

        builder.build()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.api_access_key.trim().is_empty() {
            return Err(Error::Config(
                "API access key is required. Set PHOTO_SYNC_API_ACCESS_KEY or use .api_access_key()"
                    .to_string(),
            ));
        }

        if !(self.api_base_url.starts_with("https://") || self.api_base_url.starts_with("http://"))
        {
            return Err(Error::Config(format!(
                "API base URL must be http(s): {}",
                self.api_base_url
            )));
        }

        if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
            return Err(Error::Config(format!(
                "per_page must be between 1 and {}",
                MAX_PER_PAGE
            )));
        }

        if self.retry_base_delay > self.max_retry_delay {
            return Err(Error::Config(
                "Retry base delay cannot exceed the maximum retry delay".to_string(),
            ));
        }

        if self.enqueue_timeout.is_zero() {
            return Err(Error::Config(
                "Enqueue timeout must be greater than zero".to_string(),
            ));
        }

        if self.worker_concurrency == 0 || self.queue_batch_size == 0 {
            return Err(Error::Config(
                "Worker concurrency and queue batch size must be greater than zero".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!(
            "Invalid value for {}{}: {:?}",
            ENV_PREFIX, name, value
        ))
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    asset_root: Option<PathBuf>,
    api_base_url: Option<String>,
    api_access_key: Option<String>,
    per_page: Option<u32>,
    max_retries: Option<u32>,
    retry_base_delay: Option<Duration>,
    max_retry_delay: Option<Duration>,
    enqueue_timeout: Option<Duration>,
    drain_on_stop: bool,
    worker_concurrency: Option<usize>,
    queue_batch_size: Option<u32>,
    queue_poll_interval: Option<Duration>,
    visibility_timeout: Option<Duration>,
    event_buffer_size: Option<usize>,
    logging: Option<LoggingConfig>,
    http_client: Option<Arc<dyn HttpClient>>,
    object_store: Option<Arc<dyn ObjectStore>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
}

impl CoreConfigBuilder {
    /// Path to the SQLite database file. Defaults to `photo-sync.db`.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn asset_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.asset_root = Some(path.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn api_access_key(mut self, key: impl Into<String>) -> Self {
        self.api_access_key = Some(key.into());
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = Some(delay);
        self
    }

    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = Some(delay);
        self
    }

    pub fn enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = Some(timeout);
        self
    }

    /// When enabled, `stop()` lets the in-flight page finish before going idle.
    pub fn drain_on_stop(mut self, drain: bool) -> Self {
        self.drain_on_stop = drain;
        self
    }

    pub fn worker_concurrency(mut self, concurrency: usize) -> Self {
        self.worker_concurrency = Some(concurrency);
        self
    }

    pub fn queue_batch_size(mut self, size: u32) -> Self {
        self.queue_batch_size = Some(size);
        self
    }

    pub fn queue_poll_interval(mut self, interval: Duration) -> Self {
        self.queue_poll_interval = Some(interval);
        self
    }

    pub fn visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = Some(timeout);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<CoreConfig> {
        let api_access_key = self.api_access_key.ok_or_else(|| {
            Error::Config(
                "API access key is required. Set PHOTO_SYNC_API_ACCESS_KEY or use .api_access_key()"
                    .to_string(),
            )
        })?;

        let config = CoreConfig {
            database_path: self
                .database_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            asset_root: self.asset_root,
            api_base_url: self
                .api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            api_access_key,
            per_page: self.per_page.unwrap_or(MAX_PER_PAGE),
            max_retries: self.max_retries.unwrap_or(3),
            retry_base_delay: self.retry_base_delay.unwrap_or(Duration::from_secs(1)),
            max_retry_delay: self.max_retry_delay.unwrap_or(Duration::from_secs(60)),
            enqueue_timeout: self.enqueue_timeout.unwrap_or(Duration::from_secs(5)),
            drain_on_stop: self.drain_on_stop,
            worker_concurrency: self.worker_concurrency.unwrap_or(4),
            queue_batch_size: self.queue_batch_size.unwrap_or(10),
            queue_poll_interval: self
                .queue_poll_interval
                .unwrap_or(Duration::from_millis(500)),
            visibility_timeout: self.visibility_timeout.unwrap_or(Duration::from_secs(60)),
            event_buffer_size: self.event_buffer_size.unwrap_or(100),
            logging: self.logging,
            http_client: self.http_client,
            object_store: self.object_store,
            logger_sink: self.logger_sink,
        };

        config.validate()?;
        Ok(config)
    }
}
