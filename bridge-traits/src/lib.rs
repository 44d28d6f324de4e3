//! # Host Bridge Traits
//!
//! Capability traits the sync core depends on but does not implement itself.
//!
//! ## Overview
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP requests and streamed downloads
//! - [`ObjectStore`](storage::ObjectStore) - Keyed binary object storage for mirrored assets
//! - [`PhotoSource`](source::PhotoSource) - Paginated remote photo catalogue
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! Native implementations live in `bridge-desktop`; the photo source is
//! implemented by `provider-photo-api`.
//!
//! ## Error Handling
//!
//! All traits return [`BridgeError`](error::BridgeError). Implementations
//! should convert their native errors and keep messages actionable
//! (include URLs, keys and status codes).
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync` so implementations can be shared as
//! `Arc<dyn Trait>` across tokio tasks.

pub mod error;
pub mod http;
pub mod source;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use source::{PhotoPage, PhotoSource, PhotoUrls, RemotePhoto};
pub use storage::{ObjectReader, ObjectStore};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
