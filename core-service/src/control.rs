//! # Control Surface
//!
//! Framework-neutral handlers for the HTTP control endpoints. A router
//! (axum, hyper, a serverless handler) maps its requests onto these methods
//! and writes the returned [`ControlResponse`] verbatim.
//!
//! | endpoint        | method                         |
//! |-----------------|--------------------------------|
//! | `POST start`    | [`ControlSurface::start`]      |
//! | `POST stop`     | [`ControlSurface::stop`]       |
//! | `GET status`    | [`ControlSurface::status`]     |
//! | `POST report`   | [`ControlSurface::report`]     |
//! | `POST reset`    | [`ControlSurface::reset`]      |
//! | `GET images`    | [`ControlSurface::images`]     |
//!
//! Every body is JSON with a `success` flag. Failures carry a short
//! `message`; the underlying error is logged, never returned.

use crate::error::CoreError;
use core_library::{PageRequest, PhotoRepository};
use core_sync::{PageReport, ReportOutcome, StopOutcome, SyncCoordinator};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, warn};

/// Status code plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlResponse {
    pub status_code: u16,
    pub body: Value,
}

impl ControlResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            body: json!({ "success": true, "message": message.into() }),
        }
    }

    fn data(data: Value) -> Self {
        Self {
            status_code: 200,
            body: json!({ "success": true, "data": data }),
        }
    }

    fn failure(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            body: json!({ "success": false, "message": message.into() }),
        }
    }

    fn from_error(operation: &str, err: impl Into<CoreError>) -> Self {
        let err = err.into();
        let status_code = err.status_code();
        if status_code >= 500 {
            error!(operation, error = %err, "Control operation failed");
        } else {
            warn!(operation, error = %err, "Control operation rejected");
        }
        Self::failure(status_code, err.user_message())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[derive(Clone)]
pub struct ControlSurface {
    coordinator: Arc<SyncCoordinator>,
    photos: Arc<dyn PhotoRepository>,
}

impl ControlSurface {
    pub fn new(coordinator: Arc<SyncCoordinator>, photos: Arc<dyn PhotoRepository>) -> Self {
        Self {
            coordinator,
            photos,
        }
    }

    pub async fn start(&self) -> ControlResponse {
        match self.coordinator.start().await {
            Ok(outcome) if outcome.resumed => {
                ControlResponse::ok(format!("Sync resumed at page {}", outcome.page))
            }
            Ok(outcome) => ControlResponse::ok(format!("Sync started at page {}", outcome.page)),
            Err(e) => ControlResponse::from_error("start", e),
        }
    }

    pub async fn stop(&self) -> ControlResponse {
        match self.coordinator.stop().await {
            Ok(StopOutcome::Stopped) => ControlResponse::ok("Sync stopped"),
            Ok(StopOutcome::Draining) => {
                ControlResponse::ok("Sync stopping after the in-flight page")
            }
            Ok(StopOutcome::AlreadyStopped) => ControlResponse::ok("Sync already stopped"),
            Ok(StopOutcome::NotRunning) => ControlResponse::ok("Sync is not running"),
            Err(e) => ControlResponse::from_error("stop", e),
        }
    }

    pub async fn status(&self) -> ControlResponse {
        let state = match self.coordinator.status().await {
            Ok(state) => state,
            Err(e) => return ControlResponse::from_error("status", e),
        };

        match serde_json::to_value(&state) {
            Ok(data) => ControlResponse::data(data),
            Err(e) => ControlResponse::from_error("status", CoreError::Internal(e.to_string())),
        }
    }

    /// Worker → coordinator report endpoint.
    pub async fn report(&self, body: &[u8]) -> ControlResponse {
        let report = match PageReport::parse(body) {
            Ok(report) => report,
            Err(e) => return ControlResponse::from_error("report", e),
        };

        match self.coordinator.report(report).await {
            Ok(ReportOutcome::Advanced { page, .. }) => {
                ControlResponse::ok(format!("Page {} recorded", page))
            }
            Ok(ReportOutcome::Stale { page, .. }) => {
                ControlResponse::ok(format!("Page {} already recorded", page))
            }
            Ok(ReportOutcome::Finished { .. }) => ControlResponse::ok("Sync finished"),
            Ok(ReportOutcome::Halted { .. }) => ControlResponse::ok("Error recorded"),
            Ok(ReportOutcome::Discarded) => ControlResponse::ok("Report ignored"),
            Err(e) => ControlResponse::from_error("report", e),
        }
    }

    pub async fn reset(&self) -> ControlResponse {
        match self.coordinator.reset().await {
            Ok(()) => ControlResponse::ok("Sync progress reset"),
            Err(e) => ControlResponse::from_error("reset", e),
        }
    }

    /// Paginated listing of stored photos, newest first.
    pub async fn images(&self, page: Option<&str>, limit: Option<&str>) -> ControlResponse {
        let request = PageRequest::from_query(page, limit);

        match self.photos.query(request).await {
            Ok(result) => ControlResponse::data(json!({
                "images": result.items,
                "page": request.page,
                "limit": request.page_size,
            })),
            Err(e) => ControlResponse::from_error("images", e),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
