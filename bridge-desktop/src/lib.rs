//! # Desktop Bridge Implementations
//!
//! Native implementations of the bridge traits for server and desktop hosts.
//!
//! - `HttpClient` using `reqwest`, with transport-level retry on 5xx/429
//! - `ObjectStore` backed by a local directory via `tokio::fs`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FsObjectStore, ReqwestHttpClient};
//!
//! let http_client = ReqwestHttpClient::new()?;
//! let store = FsObjectStore::new("/var/lib/photo-sync/assets");
//! ```

mod http;
mod object_store;

pub use http::ReqwestHttpClient;
pub use object_store::FsObjectStore;
