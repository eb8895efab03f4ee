//! Errors raised while driving the external segmentation tool.
//!
//! All of them are transient from the batch's point of view: they are
//! retried per region and never abort a run.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentationError {
    #[error("Model load timed out after {waited_ms} ms")]
    LoadTimeout { waited_ms: u64 },

    #[error("Probability computation timed out after {waited_ms} ms")]
    ComputeTimeout { waited_ms: u64 },

    #[error("Model load failed: {0}")]
    LoadFailed(String),

    #[error("Probability computation failed: {0}")]
    ComputeFailed(String),

    #[error("Could not start segmentation instance: {0}")]
    Spawn(String),

    #[error("Segmentation request cancelled")]
    Cancelled,

    #[error("Segmentation gave up after {attempts} attempt(s); last error: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl SegmentationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::LoadTimeout { .. } | Self::ComputeTimeout { .. })
    }
}
