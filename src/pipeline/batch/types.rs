//! Types for the batch preparation stage.
//!
//! Lifecycle per region:
//! Idempotency check → Geometry → Segmentation (retry/poll) → Artifacts → Hygiene.

use serde::{Deserialize, Serialize};

use crate::time_estimation::RegionEstimate;

// ═══════════════════════════════════════════
// Region outcome
// ═══════════════════════════════════════════

/// How one region left the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegionStatus {
    /// Segmented and written.
    Prepared,
    /// A complete triple was already on disk; nothing was done.
    AlreadyComplete,
    /// Segmentation or artifact writing failed after all attempts.
    Failed { reason: String },
    /// Geometry check failed; segmentation was never attempted.
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionOutcome {
    pub index: usize,
    pub name: String,
    #[serde(flatten)]
    pub status: RegionStatus,
    /// Segmentation attempts used (0 when skipped or rejected).
    pub attempts: u32,
    pub duration_ms: u64,
}

// ═══════════════════════════════════════════
// Batch report
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: String,
    /// RFC 3339 timestamp.
    pub started_at: String,
    pub prepared: u32,
    pub already_complete: u32,
    pub failed: u32,
    pub rejected: u32,
    pub duration_ms: u64,
    pub outcomes: Vec<RegionOutcome>,
}

impl BatchReport {
    pub fn new(run_id: String, started_at: String) -> Self {
        Self {
            run_id,
            started_at,
            prepared: 0,
            already_complete: 0,
            failed: 0,
            rejected: 0,
            duration_ms: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: RegionOutcome) {
        match outcome.status {
            RegionStatus::Prepared => self.prepared += 1,
            RegionStatus::AlreadyComplete => self.already_complete += 1,
            RegionStatus::Failed { .. } => self.failed += 1,
            RegionStatus::Rejected { .. } => self.rejected += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn outcome(&self, name: &str) -> Option<&RegionOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }
}

// ═══════════════════════════════════════════
// Batch status events
// ═══════════════════════════════════════════

/// Progress events emitted while a batch runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BatchStatusEvent {
    Started {
        run_id: String,
        region_count: u32,
    },
    RegionStarted {
        index: usize,
        total: usize,
        name: String,
    },
    /// Periodic notice while a probability computation is outstanding.
    ComputeWaiting {
        name: String,
        attempt: u32,
        elapsed_ms: u64,
    },
    RegionFinished {
        outcome: RegionOutcome,
        /// `None` until at least one region has run segmentation.
        estimate: Option<RegionEstimate>,
    },
    Completed {
        prepared: u32,
        failed: u32,
        duration_ms: u64,
    },
}
