//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the photo sync crates:
//! - Logging and tracing setup
//! - Configuration loading and validation
//! - Event bus for lifecycle notifications
//!
//! ## Overview
//!
//! Nothing in here knows about pages or photos beyond event payloads; the
//! sync semantics live in `core-sync`.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
