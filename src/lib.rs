//! Workspace umbrella crate.
//!
//! Re-exports the photo sync service so hosts can depend on a single crate
//! and pick native defaults (`desktop-shims`, the default) or bring their own
//! capabilities (`embedded`).

#[cfg(any(feature = "desktop-shims", feature = "embedded"))]
pub use core_service::*;
