//! # Database Connection Pool Module
//!
//! SQLite connection pooling for the photo metadata store.
//!
//! ## Features
//!
//! - **WAL Mode**: concurrent readers alongside the single writer
//! - **Automatic Migrations**: embedded with `sqlx::migrate!` and applied on start
//! - **Health Checks**: a `SELECT 1` before the pool is handed out
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_library::db::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("photos.db")).await?;
//! ```
//!
//! ## Testing
//!
//! `create_test_pool()` returns an in-memory database with migrations applied.
//! It is limited to one connection, because every SQLite `:memory:`
//! connection is a separate database.

use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Database configuration for SQLite connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `sqlite:` URL, or `sqlite::memory:`
    pub database_url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub max_lifetime: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    /// How long a writer waits on a locked database before failing
    pub busy_timeout: Duration,
}

impl DatabaseConfig {
    /// Configuration for the database file at `database_path`.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();

        Self {
            database_url: format!("sqlite:{}", path.display()),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: Some(Duration::from_secs(1800)),
            idle_timeout: Some(Duration::from_secs(600)),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: None,
            idle_timeout: None,
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

/// Create a configured SQLite pool, run migrations and verify it answers.
pub async fn create_pool(config: DatabaseConfig) -> Result<SqlitePool> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Creating database connection pool"
    );

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .create_if_missing(true)
        .busy_timeout(config.busy_timeout);

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create connection pool");
            LibraryError::Database(e)
        })?;

    run_migrations(&pool).await?;
    health_check(&pool).await?;

    info!(connections = pool.size(), "Database connection pool ready");
    Ok(pool)
}

/// In-memory pool with migrations applied, for tests.
pub async fn create_test_pool() -> Result<SqlitePool> {
    create_pool(DatabaseConfig::in_memory()).await
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    debug!("Running database migrations");

    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        warn!(error = %e, "Migration failed");
        LibraryError::Migration(e.to_string())
    })?;

    Ok(())
}

/// Verify the pool can serve a trivial query.
pub async fn health_check(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| {
        warn!(error = %e, "Database health check failed");
        LibraryError::Database(e)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_pool() {
        let pool = create_test_pool().await.unwrap();
        assert!(health_check(&pool).await.is_ok());
    }

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let pool = create_test_pool().await.unwrap();

        for table in ["photos", "sync_state"] {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();

            assert_eq!(count, 1, "{} table should exist", table);
        }
    }

    #[tokio::test]
    async fn test_sync_state_is_single_row() {
        let pool = create_test_pool().await.unwrap();

        sqlx::query("INSERT INTO sync_state (id, updated_at) VALUES (1, 0)")
            .execute(&pool)
            .await
            .unwrap();
        let second = sqlx::query("INSERT INTO sync_state (id, updated_at) VALUES (2, 0)")
            .execute(&pool)
            .await;

        assert!(second.is_err(), "only id = 1 is allowed");
    }

    #[tokio::test]
    async fn test_file_backed_pool() {
        let dir = std::env::temp_dir().join(format!(
            "core-library-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("photos.db");

        let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        pool.close().await;
        std::fs::remove_dir_all(&dir).ok();
    }
}
