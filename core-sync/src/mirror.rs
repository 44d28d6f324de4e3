//! # Asset Mirror
//!
//! Best-effort copy of photo binaries into the object store.
//!
//! Mirroring is detached from page completion: [`AssetMirror::schedule`]
//! spawns a task and returns immediately. A failure is logged and published
//! as [`LibraryEvent::AssetMirrorFailed`]; it never reaches the coordinator.
//!
//! Objects are keyed `photos/<id>.jpg`. An existing object is left alone,
//! so redelivered pages don't download the same asset twice.

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::HttpClient;
use bridge_traits::storage::ObjectStore;
use core_library::Photo;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

const CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorResult {
    Stored { key: String, bytes: u64 },
    AlreadyPresent { key: String },
}

pub struct AssetMirror {
    http_client: Arc<dyn HttpClient>,
    store: Arc<dyn ObjectStore>,
    event_bus: EventBus,
}

impl AssetMirror {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        store: Arc<dyn ObjectStore>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            http_client,
            store,
            event_bus,
        }
    }

    /// Object key for a photo id. Path separators in ids are flattened.
    pub fn object_key(photo_id: &str) -> String {
        let safe: String = photo_id
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        format!("photos/{}.jpg", safe)
    }

    /// Spawn a detached mirror task for `photo`. Returns `None` when the
    /// photo has no usable URL.
    pub fn schedule(self: &Arc<Self>, photo: &Photo) -> Option<JoinHandle<()>> {
        let url = photo.mirror_source_url()?.to_string();
        let photo_id = photo.id.clone();
        let mirror = Arc::clone(self);

        Some(tokio::spawn(async move {
            mirror.run(photo_id, url).await;
        }))
    }

    async fn run(&self, photo_id: String, url: String) {
        match self.mirror(&photo_id, &url).await {
            Ok(MirrorResult::Stored { key, bytes }) => {
                debug!(photo_id = %photo_id, key = %key, bytes, "Asset mirrored");
                self.event_bus
                    .emit(CoreEvent::Library(LibraryEvent::AssetMirrored {
                        photo_id,
                        key,
                        bytes,
                    }))
                    .ok();
            }
            Ok(MirrorResult::AlreadyPresent { key }) => {
                debug!(photo_id = %photo_id, key = %key, "Asset already mirrored");
            }
            Err(e) => {
                warn!(photo_id = %photo_id, url = %url, error = %e, "Asset mirroring failed");
                self.event_bus
                    .emit(CoreEvent::Library(LibraryEvent::AssetMirrorFailed {
                        photo_id,
                        message: e.to_string(),
                    }))
                    .ok();
            }
        }
    }

    /// Copy one asset, streaming it from `url` into the store.
    #[instrument(skip(self))]
    pub async fn mirror(&self, photo_id: &str, url: &str) -> Result<MirrorResult> {
        if photo_id.trim().is_empty() {
            return Err(BridgeError::InvalidKey(photo_id.to_string()));
        }
        let key = Self::object_key(photo_id);

        if self.store.exists(&key).await? {
            return Ok(MirrorResult::AlreadyPresent { key });
        }

        let body = self.http_client.download_stream(url.to_string()).await?;
        let bytes = self.store.put_stream(&key, body, Some(CONTENT_TYPE)).await?;

        Ok(MirrorResult::Stored { key, bytes })
    }
}

// ============================================================================
// Tests
// ============================================================================
