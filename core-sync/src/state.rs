//! # Sync State Machine
//!
//! The coordinator's entire durable state and the pure transition rules over
//! it. Nothing here performs I/O; the coordinator loads a [`SyncState`],
//! applies one of these methods under its lock, and persists the result.
//!
//! ## States
//!
//! ```text
//!            start()                 stop() [drain]
//!   idle ─────────────► running ─────────────────► stopping
//!    ▲  ▲                │  │                          │
//!    │  └────────────────┘  │ report error / enqueue   │ report success
//!    │     stop(),          │ failure                  │
//!    │     end of data      ▼                          │
//!    │                    error ◄──────────────────────┘ (report error)
//!    │                      │
//!    └──── reset() ─────────┘ (reset is allowed from every state)
//! ```
//!
//! `start()` is also valid from `error`, resuming from the checkpoint.

use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Coordinator status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Running,
    /// Stop requested; waiting for the in-flight page to report
    Stopping,
    Error,
}

impl SyncStatus {
    /// Whether a run currently owns the queue (start must be rejected).
    pub fn is_active(&self) -> bool {
        matches!(self, SyncStatus::Running | SyncStatus::Stopping)
    }

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Running => "running",
            SyncStatus::Stopping => "stopping",
            SyncStatus::Error => "error",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(SyncStatus::Idle),
            "running" => Ok(SyncStatus::Running),
            "stopping" => Ok(SyncStatus::Stopping),
            "error" => Ok(SyncStatus::Error),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Effect of a page completion on the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// `page` was exactly the next page.
    Contiguous { page: u64 },
    /// `page` skipped ahead of `expected`; the checkpoint moved anyway.
    Gap { expected: u64, page: u64 },
    /// `page` was already covered by the checkpoint; nothing changed.
    Stale { page: u64, last_processed_page: u64 },
}

impl Advance {
    pub fn moved(&self) -> bool {
        !matches!(self, Advance::Stale { .. })
    }
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopOutcome {
    /// Running → idle
    Stopped,
    /// Running → stopping; the in-flight page will settle the run
    Draining,
    /// Already idle or stopping; nothing changed
    AlreadyStopped,
    /// Halted in error; the error stays visible until the next start or reset
    NotRunning,
}

/// The coordinator's persisted checkpoint record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub status: SyncStatus,
    /// Highest page confirmed fully processed; 0 means none.
    pub last_processed_page: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Best-effort upper bound, not authoritative
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
}

impl SyncState {
    /// Initial state: idle at page 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Page a run should request next.
    pub fn next_page(&self) -> u64 {
        self.last_processed_page + 1
    }

    /// Whether a run has started since the state was created or last reset.
    ///
    /// Reports arriving before any run started belong to progress that was
    /// discarded and must not touch the checkpoint.
    pub fn has_run(&self) -> bool {
        self.last_run_start.is_some()
    }

    /// Whether the checkpoint has reached the known end of the data.
    pub fn reached_end(&self) -> bool {
        self.total_pages
            .is_some_and(|total| self.last_processed_page >= total)
    }

    /// Begin (or resume) a run. Returns the page to enqueue.
    ///
    /// # Errors
    /// `AlreadyRunning` when a run is active; the caller must not enqueue.
    pub fn begin_run(&mut self, now: DateTime<Utc>) -> Result<u64> {
        if self.status.is_active() {
            return Err(SyncError::AlreadyRunning {
                status: self.status.as_str().to_string(),
            });
        }

        self.transition_to(SyncStatus::Running)?;
        self.last_run_start = Some(now);
        Ok(self.next_page())
    }

    /// Request a stop. With `drain`, a running sync waits in `stopping` for
    /// its in-flight page.
    pub fn request_stop(&mut self, drain: bool) -> Result<StopOutcome> {
        match self.status {
            SyncStatus::Running if drain => {
                self.transition_to(SyncStatus::Stopping)?;
                Ok(StopOutcome::Draining)
            }
            SyncStatus::Running => {
                self.transition_to(SyncStatus::Idle)?;
                Ok(StopOutcome::Stopped)
            }
            SyncStatus::Idle | SyncStatus::Stopping => Ok(StopOutcome::AlreadyStopped),
            SyncStatus::Error => Ok(StopOutcome::NotRunning),
        }
    }

    /// Apply the advance rule for a completed page. Status is untouched.
    ///
    /// - `page == last + 1`: advance
    /// - `page <= last`: stale, ignore
    /// - `page > last + 1`: advance past the gap
    pub fn record_completion(&mut self, page: u64) -> Advance {
        let expected = self.next_page();

        if page <= self.last_processed_page {
            return Advance::Stale {
                page,
                last_processed_page: self.last_processed_page,
            };
        }

        self.last_processed_page = page;
        if page == expected {
            Advance::Contiguous { page }
        } else {
            Advance::Gap { expected, page }
        }
    }

    /// Halt with `message`. The checkpoint is not touched.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = SyncStatus::Error;
        self.last_error = Some(message.into());
    }

    /// End the current run normally (drain complete or end of data).
    pub fn finish_run(&mut self) -> Result<()> {
        self.transition_to(SyncStatus::Idle)
    }

    /// Discard all progress.
    pub fn reset(&mut self) {
        *self = SyncState::default();
    }

    /// Change status, enforcing the transition table. `last_error` is
    /// cleared whenever the status leaves `error`.
    fn transition_to(&mut self, to: SyncStatus) -> Result<()> {
        let from = self.status;
        let valid = match (from, to) {
            (SyncStatus::Idle, SyncStatus::Running) => true,
            (SyncStatus::Error, SyncStatus::Running) => true,

            (SyncStatus::Running, SyncStatus::Idle) => true,
            (SyncStatus::Running, SyncStatus::Stopping) => true,
            (SyncStatus::Stopping, SyncStatus::Idle) => true,

            (_, SyncStatus::Error) => true,
            _ => false,
        };

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!("Cannot transition from {} to {}", from, to),
            });
        }

        self.status = to;
        if to != SyncStatus::Error {
            self.last_error = None;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
