//! # Record Materializer
//!
//! Turns a fetched page of [`RemotePhoto`]s into `photos` rows.
//!
//! Each record is upserted independently by its natural key (last write
//! wins). Records without a key are skipped; a record whose upsert fails is
//! counted and logged. The page only fails when it had keyed records and
//! none of them could be written.
//!
//! Successfully written rows are handed to the [`AssetMirror`] as detached
//! background tasks.

use crate::error::{Result, SyncError};
use crate::mirror::AssetMirror;
use bridge_traits::source::RemotePhoto;
use bridge_traits::time::{Clock, SystemClock};
use core_library::{Photo, PhotoRepository};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-page materialization counts.
#[derive(Debug, Default)]
pub struct MaterializeOutcome {
    pub upserted: u64,
    /// Records without a natural key
    pub skipped: u64,
    pub failed: u64,
    /// Detached mirror tasks; dropping these does not cancel them
    pub mirror_tasks: Vec<JoinHandle<()>>,
}

impl MaterializeOutcome {
    pub fn total(&self) -> u64 {
        self.upserted + self.skipped + self.failed
    }
}

pub struct RecordMaterializer {
    repository: Arc<dyn PhotoRepository>,
    mirror: Option<Arc<AssetMirror>>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl RecordMaterializer {
    pub fn new(repository: Arc<dyn PhotoRepository>, event_bus: EventBus) -> Self {
        Self {
            repository,
            mirror: None,
            event_bus,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_mirror(mut self, mirror: Arc<AssetMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Upsert every record of `page`.
    ///
    /// # Errors
    ///
    /// `Materialize` when the batch had keyed records and every upsert failed.
    pub async fn materialize(
        &self,
        page: u64,
        records: Vec<RemotePhoto>,
    ) -> Result<MaterializeOutcome> {
        let mut outcome = MaterializeOutcome::default();
        let synced_at = self.clock.unix_timestamp_millis();
        let source_page = i64::try_from(page).map_err(|_| SyncError::Materialize {
            page,
            message: "page number out of range".to_string(),
        })?;
        let mut last_error = None;

        for record in records {
            let Some(photo) = to_photo(record, source_page, synced_at) else {
                debug!(page, "Skipping record without id");
                outcome.skipped += 1;
                continue;
            };

            match self.repository.upsert(&photo).await {
                Ok(()) => {
                    outcome.upserted += 1;
                    if let Some(task) = self.mirror.as_ref().and_then(|m| m.schedule(&photo)) {
                        outcome.mirror_tasks.push(task);
                    }
                }
                Err(e) => {
                    warn!(page, photo_id = %photo.id, error = %e, "Failed to upsert photo");
                    outcome.failed += 1;
                    last_error = Some(e.to_string());
                }
            }
        }

        if outcome.upserted == 0 && outcome.failed > 0 {
            return Err(SyncError::Materialize {
                page,
                message: last_error.unwrap_or_else(|| "all upserts failed".to_string()),
            });
        }

        info!(
            page,
            upserted = outcome.upserted,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "Page materialized"
        );
        self.event_bus
            .emit(CoreEvent::Library(LibraryEvent::PhotosUpserted {
                page,
                upserted: outcome.upserted,
                skipped: outcome.skipped,
                failed: outcome.failed,
            }))
            .ok();

        Ok(outcome)
    }
}

/// Flatten a remote record. `None` when it has no natural key.
fn to_photo(record: RemotePhoto, source_page: i64, synced_at: i64) -> Option<Photo> {
    let id = record.id.filter(|id| !id.trim().is_empty())?;

    let mut photo = Photo::new(id, source_page, synced_at);
    photo.description = record.description;
    photo.alt_description = record.alt_description;
    photo.width = record.width;
    photo.height = record.height;
    photo.color = record.color;
    photo.blur_hash = record.blur_hash;
    photo.likes = record.likes;
    photo.url_raw = record.urls.raw;
    photo.url_full = record.urls.full;
    photo.url_regular = record.urls.regular;
    photo.url_small = record.urls.small;
    photo.url_thumb = record.urls.thumb;
    photo.author_username = record.author_username;
    photo.author_name = record.author_name;
    photo.remote_created_at = record.created_at;
    photo.remote_updated_at = record.updated_at;

    Some(photo)
}

// ============================================================================
// Tests
// ============================================================================
