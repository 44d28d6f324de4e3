//! # Photo API Provider
//!
//! Implements [`PhotoSource`](bridge_traits::PhotoSource) for a paginated
//! REST photo catalogue (Unsplash-compatible wire format).
//!
//! ## Overview
//!
//! - `GET {base}/photos?page=N&per_page=M` with `Authorization: Client-ID <key>`
//! - Total record count read from the `X-Total` response header when present
//! - Records are decoded one by one; a record that fails to decode is kept
//!   as a keyless entry so the materializer can skip and log it
//!
//! Transport retries belong to the injected `HttpClient`; page-level retries
//! belong to the sync worker.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::PhotoApiConnector;
pub use error::{PhotoApiError, Result};
