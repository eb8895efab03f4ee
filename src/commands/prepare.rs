//! Prepare command: crop, segment and store every catalog region.

use std::path::PathBuf;

use image::GenericImageView;

use crate::pipeline::batch::{BatchPreparer, BatchReport, BatchStatusEvent};
use crate::pipeline::segmentation::SegmentationClient;
use crate::pipeline::storage::{ArtifactStore, ImageExtent, RegionCatalog};
use crate::pipeline::PipelineError;
use crate::pipeline_config::PrepareConfig;

#[derive(Debug, Clone)]
pub struct PrepareRequest {
    pub source_image: PathBuf,
    /// Region catalog archive (JSON).
    pub catalog: PathBuf,
    pub model: PathBuf,
    pub output_root: PathBuf,
}

/// Run batch preparation and save the catalog backup under the output root.
pub fn prepare(
    request: &PrepareRequest,
    client: &mut dyn SegmentationClient,
    config: &PrepareConfig,
    progress_fn: Option<&dyn Fn(BatchStatusEvent)>,
) -> Result<BatchReport, PipelineError> {
    let catalog = RegionCatalog::load(&request.catalog).map_err(|e| {
        PipelineError::Configuration(format!(
            "cannot read region catalog {}: {e}",
            request.catalog.display()
        ))
    })?;
    for reason in catalog.rejected() {
        tracing::warn!(%reason, "Catalog entry rejected");
    }

    let source = image::open(&request.source_image).map_err(|e| {
        PipelineError::Configuration(format!(
            "cannot read source image {}: {e}",
            request.source_image.display()
        ))
    })?;
    let (width, height) = source.dimensions();
    let extent = ImageExtent { width, height };
    if let Some(declared) = catalog.image() {
        if declared != extent {
            tracing::warn!(
                declared_width = declared.width,
                declared_height = declared.height,
                width,
                height,
                "Catalog was drawn on an image of different size"
            );
        }
    }

    let preparer = BatchPreparer::new(
        config.clone(),
        &request.model,
        ArtifactStore::open(&request.output_root),
    );
    let report = preparer.prepare(&source, &catalog, client, progress_fn)?;

    let backup = preparer.store().layout().catalog_backup();
    catalog.with_image(extent).save(&backup)?;
    tracing::info!(path = %backup.display(), "Region catalog backup saved");

    Ok(report)
}
