//! Rolling time-per-region estimate for batch preparation.
//!
//! Only regions that actually ran segmentation are sampled; skipped and
//! rejected regions take no measurable time and would skew the mean.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Snapshot reported after each completed region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionEstimate {
    /// Mean seconds per processed region so far.
    pub per_region_secs: f64,
    /// Projected seconds for the regions still to go.
    pub remaining_secs: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RollingEstimate {
    samples: u32,
    total: Duration,
}

// ═══════════════════════════════════════════════════════════
// Estimation
// ═══════════════════════════════════════════════════════════

impl RollingEstimate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, elapsed: Duration) {
        self.samples += 1;
        self.total += elapsed;
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn mean_secs(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.total.as_secs_f64() / f64::from(self.samples))
    }

    /// Projection for `regions_left` more regions, once at least one sample exists.
    pub fn project(&self, regions_left: usize) -> Option<RegionEstimate> {
        self.mean_secs().map(|mean| RegionEstimate {
            per_region_secs: mean,
            remaining_secs: mean * regions_left as f64,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
