//! # Photo Library Module
//!
//! Owns the relational metadata store.
//!
//! ## Overview
//!
//! - SQLite connection pool with embedded migrations ([`db`])
//! - The flattened [`Photo`](models::Photo) row
//! - [`PhotoRepository`](repositories::PhotoRepository): upsert by natural
//!   key and paginated listing for the public read API
//!
//! The `sync_state` table is created here as well so that a single migration
//! run prepares everything; `core-sync` owns its reads and writes.

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::Photo;
pub use repositories::{Page, PageRequest, PhotoRepository, SqlitePhotoRepository};
