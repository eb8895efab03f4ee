use std::path::Path;

use image::DynamicImage;

use super::error::SegmentationError;
use super::handle::Pending;

/// Strength of a resource reclaim request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimLevel {
    /// After every region.
    Light,
    /// Every N regions.
    Heavy,
}

/// Factory for segmentation instances (allows mocking).
///
/// Every attempt starts from a fresh instance: nothing warmed up by a failed
/// attempt is reused.
pub trait SegmentationClient {
    fn start_instance(&mut self) -> Result<Box<dyn SegmentationInstance>, SegmentationError>;

    /// Tear down every instance or process this client still has alive.
    /// Returns how many were found.
    fn teardown_all(&mut self) -> usize;

    fn reclaim(&mut self, _level: ReclaimLevel) {}
}

/// One running copy of the segmentation tool.
pub trait SegmentationInstance {
    fn load_model(&mut self, model: &Path) -> Pending<()>;

    /// Must only be called after `load_model` resolved successfully.
    fn compute_probability(&mut self, image: &DynamicImage) -> Pending<DynamicImage>;

    fn shutdown(&mut self);
}
