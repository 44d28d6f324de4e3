//! # Sync State Repository
//!
//! Persists the coordinator's single checkpoint row (`sync_state`, id = 1).
//! A missing row reads as the initial state, so a fresh database needs no
//! seeding.

use crate::state::{SyncState, SyncStatus};
use crate::{Result, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository trait for the sync checkpoint
#[async_trait]
pub trait SyncStateRepository: Send + Sync {
    /// Load the current state, or the initial state if none was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the stored row is
    /// corrupt
    async fn load(&self) -> Result<SyncState>;

    /// Replace the stored state.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn save(&self, state: &SyncState) -> Result<()>;

    /// Remove the stored state so the next load returns the initial state.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn clear(&self) -> Result<()>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of SyncStateRepository
pub struct SqliteSyncStateRepository {
    pool: SqlitePool,
}

impl SqliteSyncStateRepository {
    /// Create a new repository. The `sync_state` table comes from the library
    /// migrations.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SyncStateRow {
    status: String,
    last_processed_page: i64,
    last_run_start: Option<i64>,
    last_error: Option<String>,
    total_pages: Option<i64>,
}

impl TryFrom<SyncStateRow> for SyncState {
    type Error = SyncError;

    fn try_from(row: SyncStateRow) -> Result<Self> {
        let status: SyncStatus = row.status.parse()?;

        let last_processed_page = u64::try_from(row.last_processed_page).map_err(|_| {
            SyncError::Database(format!(
                "Invalid last_processed_page: {}",
                row.last_processed_page
            ))
        })?;

        let last_run_start = row
            .last_run_start
            .map(|millis| {
                DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
                    SyncError::Database(format!("Invalid last_run_start: {}", millis))
                })
            })
            .transpose()?;

        Ok(SyncState {
            status,
            last_processed_page,
            last_run_start,
            last_error: row.last_error,
            total_pages: row.total_pages.and_then(|t| u64::try_from(t).ok()),
        })
    }
}

fn to_db_int(value: u64, field: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| SyncError::Database(format!("{} out of range: {}", field, value)))
}

#[async_trait]
impl SyncStateRepository for SqliteSyncStateRepository {
    async fn load(&self) -> Result<SyncState> {
        let row = sqlx::query_as::<_, SyncStateRow>(
            r#"
            SELECT status, last_processed_page, last_run_start, last_error, total_pages
            FROM sync_state WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        match row {
            Some(row) => row.try_into(),
            None => Ok(SyncState::new()),
        }
    }

    async fn save(&self, state: &SyncState) -> Result<()> {
        let total_pages = state
            .total_pages
            .map(|t| to_db_int(t, "total_pages"))
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO sync_state (
                id, status, last_processed_page, last_run_start, last_error,
                total_pages, updated_at
            ) VALUES (1, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                last_processed_page = excluded.last_processed_page,
                last_run_start = excluded.last_run_start,
                last_error = excluded.last_error,
                total_pages = excluded.total_pages,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(state.status.as_str())
        .bind(to_db_int(state.last_processed_page, "last_processed_page")?)
        .bind(state.last_run_start.map(|t| t.timestamp_millis()))
        .bind(&state.last_error)
        .bind(total_pages)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM sync_state WHERE id = 1")
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
