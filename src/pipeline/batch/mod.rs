//! Batch preparation stage.
//!
//! ```text
//! RegionCatalog → BatchPreparer (+ SegmentationClient) → ArtifactStore
//! ```
//!
//! Checkpointed per region: the artifact store is the only record of
//! progress, so re-running a batch resumes where the last one stopped.

pub mod geometry;
pub mod runner;
pub mod types;

pub use geometry::{crop_geometry, CropGeometry, GeometryError};
pub use runner::{new_run_id, BatchPreparer};
pub use types::*;
