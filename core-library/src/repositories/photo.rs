//! Photo repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::Photo;
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Photo repository interface
#[async_trait]
pub trait PhotoRepository: Send + Sync {
    /// Insert the photo, or overwrite every mutable column if a row with the
    /// same id exists (last write wins).
    ///
    /// # Errors
    /// Returns `InvalidInput` if validation fails, `Database` otherwise.
    async fn upsert(&self, photo: &Photo) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Photo>>;

    /// Most recently synced first.
    async fn query(&self, page_request: PageRequest) -> Result<Page<Photo>>;

    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of PhotoRepository
pub struct SqlitePhotoRepository {
    pool: SqlitePool,
}

impl SqlitePhotoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PhotoRepository for SqlitePhotoRepository {
    async fn upsert(&self, photo: &Photo) -> Result<()> {
        photo.validate().map_err(|msg| LibraryError::InvalidInput {
            field: "photo".to_string(),
            message: msg,
        })?;

        query(
            r#"
            INSERT INTO photos (
                id, description, alt_description, width, height, color, blur_hash, likes,
                url_raw, url_full, url_regular, url_small, url_thumb,
                author_username, author_name, remote_created_at, remote_updated_at,
                source_page, synced_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                description = excluded.description,
                alt_description = excluded.alt_description,
                width = excluded.width,
                height = excluded.height,
                color = excluded.color,
                blur_hash = excluded.blur_hash,
                likes = excluded.likes,
                url_raw = excluded.url_raw,
                url_full = excluded.url_full,
                url_regular = excluded.url_regular,
                url_small = excluded.url_small,
                url_thumb = excluded.url_thumb,
                author_username = excluded.author_username,
                author_name = excluded.author_name,
                remote_created_at = excluded.remote_created_at,
                remote_updated_at = excluded.remote_updated_at,
                source_page = excluded.source_page,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(&photo.id)
        .bind(&photo.description)
        .bind(&photo.alt_description)
        .bind(photo.width)
        .bind(photo.height)
        .bind(&photo.color)
        .bind(&photo.blur_hash)
        .bind(photo.likes)
        .bind(&photo.url_raw)
        .bind(&photo.url_full)
        .bind(&photo.url_regular)
        .bind(&photo.url_small)
        .bind(&photo.url_thumb)
        .bind(&photo.author_username)
        .bind(&photo.author_name)
        .bind(&photo.remote_created_at)
        .bind(&photo.remote_updated_at)
        .bind(photo.source_page)
        .bind(photo.synced_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Photo>> {
        let photo = query_as::<_, Photo>("SELECT * FROM photos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(photo)
    }

    async fn query(&self, page_request: PageRequest) -> Result<Page<Photo>> {
        let photos = query_as::<_, Photo>(
            "SELECT * FROM photos ORDER BY synced_at DESC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(page_request.limit())
        .bind(page_request.offset())
        .fetch_all(&self.pool)
        .await?;

        let total = self.count().await?;
        Ok(Page::new(photos, total.max(0) as u64, page_request))
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM photos")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
