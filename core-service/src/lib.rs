//! Photo sync service façade and bootstrap.
//!
//! This crate wires the configured capabilities (HTTP, object storage, the
//! photo API) into the sync core and exposes the framework-neutral
//! [`ControlSurface`]. Native hosts enable the `desktop-shims` feature
//! (default), which supplies `bridge-desktop` implementations for any
//! capability the [`CoreConfig`] leaves unset.
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::PhotoSyncService;
//!
//! # async fn example() -> core_service::Result<()> {
//! let service = PhotoSyncService::bootstrap(CoreConfig::from_env()?).await?;
//! service.spawn_workers().await;
//!
//! let control = service.control();
//! let response = control.start().await;
//! assert_eq!(response.status_code, 200);
//!
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod control;
pub mod error;

pub use control::{ControlResponse, ControlSurface};
pub use error::{CoreError, Result};

use bridge_traits::{HttpClient, ObjectStore, PhotoSource};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{PhotoRepository, SqlitePhotoRepository};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus};
use core_runtime::logging::{init_logging, LoggingConfig};
use core_sync::{
    AssetMirror, CoordinatorConfig, PageWorker, RecordMaterializer, SqliteSyncStateRepository,
    SqliteTaskQueue, SyncCoordinator, SyncError, WorkerConfig, WorkerRunner,
};
use provider_photo_api::PhotoApiConnector;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// A fully wired sync service.
pub struct PhotoSyncService {
    pool: SqlitePool,
    event_bus: EventBus,
    coordinator: Arc<SyncCoordinator>,
    photos: Arc<dyn PhotoRepository>,
    runner: Arc<WorkerRunner>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PhotoSyncService {
    /// Bootstrap against the remote photo API named in `config`.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.validate()?;
        install_logging(&config)?;
        let http_client = resolve_http_client(&config)?;
        let source = Arc::new(PhotoApiConnector::new(
            http_client.clone(),
            config.api_base_url.clone(),
            config.api_access_key.clone(),
        ));
        Self::assemble(config, source, http_client).await
    }

    /// Bootstrap with an explicit photo source.
    ///
    /// Opens the database, prepares the queue, wires coordinator and worker,
    /// and reconciles any run interrupted by a previous process.
    pub async fn bootstrap_with_source(
        config: CoreConfig,
        source: Arc<dyn PhotoSource>,
    ) -> Result<Self> {
        config.validate()?;
        install_logging(&config)?;
        let http_client = resolve_http_client(&config)?;
        Self::assemble(config, source, http_client).await
    }

    #[instrument(skip_all, fields(database = %config.database_path.display()))]
    async fn assemble(
        config: CoreConfig,
        source: Arc<dyn PhotoSource>,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self> {
        let pool = create_pool(DatabaseConfig::new(config.database_path.clone())).await?;
        let queue = Arc::new(
            SqliteTaskQueue::new(pool.clone()).with_visibility_timeout(config.visibility_timeout),
        );
        queue.initialize().await?;

        let event_bus = EventBus::new(config.event_buffer_size);
        let object_store = resolve_object_store(&config)?;

        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::new(SqliteSyncStateRepository::new(pool.clone())),
            queue.clone(),
            event_bus.clone(),
            CoordinatorConfig {
                enqueue_timeout: config.enqueue_timeout,
                drain_on_stop: config.drain_on_stop,
            },
        ));

        let photos: Arc<dyn PhotoRepository> = Arc::new(SqlitePhotoRepository::new(pool.clone()));
        let mirror = Arc::new(AssetMirror::new(
            http_client,
            object_store,
            event_bus.clone(),
        ));
        let materializer = Arc::new(
            RecordMaterializer::new(photos.clone(), event_bus.clone()).with_mirror(mirror),
        );

        let worker = Arc::new(PageWorker::new(
            queue.clone(),
            source,
            materializer,
            coordinator.clone(),
            WorkerConfig {
                per_page: config.per_page,
                max_retries: config.max_retries,
                retry_base_delay: config.retry_base_delay,
                max_retry_delay: config.max_retry_delay,
            },
        ));
        let runner = Arc::new(WorkerRunner::new(
            worker,
            queue,
            config.worker_concurrency,
            config.queue_batch_size,
            config.queue_poll_interval,
        ));

        match coordinator.recover().await {
            Ok(Some(page)) => info!(page, "Resumed interrupted sync"),
            Ok(None) => {}
            // The failure is recorded in the sync state; the service still starts
            Err(e @ SyncError::Enqueue { .. }) => warn!(error = %e, "Could not resume sync"),
            Err(e) => return Err(e.into()),
        }

        info!("Photo sync service ready");

        Ok(Self {
            pool,
            event_bus,
            coordinator,
            photos,
            runner,
            shutdown: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Handlers for the HTTP control endpoints.
    pub fn control(&self) -> ControlSurface {
        ControlSurface::new(self.coordinator.clone(), self.photos.clone())
    }

    pub fn coordinator(&self) -> Arc<SyncCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// Start the background page worker. Calling it again adds another
    /// polling loop sharing the same concurrency limit.
    pub async fn spawn_workers(&self) {
        let runner = self.runner.clone();
        let shutdown = self.shutdown.child_token();
        let handle = tokio::spawn(async move { runner.run(shutdown).await });
        self.workers.lock().await.push(handle);
    }

    /// Stop the workers after their current batch and close the database.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }

        self.pool.close().await;
        info!("Photo sync service stopped");
    }
}

/// Install the global subscriber requested by `config`, forwarding to the
/// injected `LoggerSink`. Returns `false` when nothing was installed, either
/// because logging is left to the host or a subscriber already exists.
fn install_logging(config: &CoreConfig) -> Result<bool> {
    let logging = match (&config.logging, &config.logger_sink) {
        (Some(logging), _) => logging.clone(),
        (None, Some(_)) => LoggingConfig::default(),
        (None, None) => return Ok(false),
    };
    let logging = match (&logging.logger_sink, &config.logger_sink) {
        (None, Some(sink)) => logging.with_logger_sink(sink.clone()),
        _ => logging,
    };

    match init_logging(logging) {
        Ok(()) => Ok(true),
        Err(core_runtime::Error::LoggingAlreadyInitialized) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn resolve_http_client(config: &CoreConfig) -> Result<Arc<dyn HttpClient>> {
    match &config.http_client {
        Some(client) => Ok(client.clone()),
        None => default_http_client(),
    }
}

fn resolve_object_store(config: &CoreConfig) -> Result<Arc<dyn ObjectStore>> {
    match &config.object_store {
        Some(store) => Ok(store.clone()),
        None => default_object_store(config),
    }
}

#[cfg(feature = "desktop-shims")]
fn default_http_client() -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::new()
        .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(CoreError::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "Inject one via CoreConfig or enable the desktop-shims feature".to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn default_object_store(config: &CoreConfig) -> Result<Arc<dyn ObjectStore>> {
    let store = match &config.asset_root {
        Some(root) => bridge_desktop::FsObjectStore::new(root.clone()),
        None => bridge_desktop::FsObjectStore::in_data_dir(),
    };
    info!(root = %store.root().display(), "Mirroring assets to local filesystem");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_object_store(_config: &CoreConfig) -> Result<Arc<dyn ObjectStore>> {
    Err(CoreError::CapabilityMissing {
        capability: "ObjectStore".to_string(),
        message: "Inject one via CoreConfig or enable the desktop-shims feature".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as SinkResult;
    use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
    use core_runtime::logging::LogFormat;

    #[derive(Default)]
    struct CollectingSink {
        entries: std::sync::Mutex<Vec<LogEntry>>,
    }

    #[async_trait]
    impl LoggerSink for CollectingSink {
        async fn log(&self, entry: LogEntry) -> SinkResult<()> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }

        fn min_level(&self) -> LogLevel {
            LogLevel::Warn
        }
    }

    // Only this test installs a global subscriber in this binary.
    #[test]
    fn test_install_logging_forwards_to_injected_sink() {
        let host_managed = CoreConfig::builder().api_access_key("key").build().unwrap();
        assert!(!install_logging(&host_managed).unwrap());

        let sink = Arc::new(CollectingSink::default());
        let config = CoreConfig::builder()
            .api_access_key("key")
            .logging(LoggingConfig::default().with_format(LogFormat::Compact))
            .logger_sink(sink.clone())
            .build()
            .unwrap();

        assert!(install_logging(&config).unwrap());

        tracing::info!("Below the sink threshold");
        tracing::warn!(photo_id = "abc", "Asset mirror failed for install test");
        {
            // Other tests in this binary log concurrently; look for ours only
            let entries = sink.entries.lock().unwrap();
            assert!(!entries.iter().any(|e| e.message == "Below the sink threshold"));
            let forwarded = entries
                .iter()
                .find(|e| e.message == "Asset mirror failed for install test")
                .expect("warning forwarded to the sink");
            assert_eq!(forwarded.fields.get("photo_id"), Some(&"abc".to_string()));
        }

        // A second bootstrap in the same process keeps the first subscriber
        assert!(!install_logging(&config).unwrap());
    }
}
