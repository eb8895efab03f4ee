//! Pipeline-level errors.
//!
//! Only `Configuration` and storage failures on the results table abort a
//! command. Everything else is region-scoped and is logged and contained
//! by the caller.

use thiserror::Error;

use super::batch::GeometryError;
use super::segmentation::SegmentationError;
use super::storage::StorageError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Artifacts missing for region {0}")]
    ArtifactMissing(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Segmentation error: {0}")]
    Segmentation(#[from] SegmentationError),
}
