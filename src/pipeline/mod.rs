pub mod batch; // Phase 1: checkpointed segmentation batch
pub mod error;
pub mod peaks;
pub mod raster;
pub mod segmentation; // External classifier seam (typed async handles)
pub mod session; // Phase 2: interactive counting
pub mod storage;

pub use error::PipelineError;
