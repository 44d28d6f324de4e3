//! Repository traits and their SQLite implementations

pub mod pagination;
pub mod photo;

pub use pagination::{Page, PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use photo::{PhotoRepository, SqlitePhotoRepository};
