//! BatchPreparer: drives segmentation for every catalog region.
//!
//! Runs sequentially, one region in flight at a time. Completed regions are
//! detected from the artifact store and skipped, so an interrupted run can
//! simply be started again.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::{DynamicImage, GenericImageView};

use super::geometry::crop_geometry;
use super::types::*;
use crate::models::Region;
use crate::pipeline::error::PipelineError;
use crate::pipeline::raster::ProbabilityMap;
use crate::pipeline::segmentation::{
    ReclaimLevel, SegmentationClient, SegmentationError, SegmentationInstance,
};
use crate::pipeline::storage::{ArtifactMetadata, ArtifactStore, RegionCatalog};
use crate::pipeline_config::PrepareConfig;
use crate::time_estimation::RollingEstimate;

/// Identifier attached to every log line and report of one batch run.
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct BatchPreparer {
    config: PrepareConfig,
    model_path: PathBuf,
    store: ArtifactStore,
}

impl BatchPreparer {
    pub fn new(
        config: PrepareConfig,
        model_path: impl Into<PathBuf>,
        store: ArtifactStore,
    ) -> Self {
        Self {
            config,
            model_path: model_path.into(),
            store,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Fails before any region is touched if the run cannot succeed at all.
    pub fn check_configuration(&self, catalog: &RegionCatalog) -> Result<(), PipelineError> {
        if !self.model_path.is_file() {
            return Err(PipelineError::Configuration(format!(
                "model artifact not found: {}",
                self.model_path.display()
            )));
        }
        if catalog.is_empty() {
            return Err(PipelineError::Configuration("region catalog is empty".into()));
        }
        if self.config.max_attempts == 0 {
            return Err(PipelineError::Configuration(
                "max_attempts must be at least 1".into(),
            ));
        }
        self.store.ensure_layout().map_err(|e| {
            PipelineError::Configuration(format!(
                "output root {} is not writable: {e}",
                self.store.layout().root().display()
            ))
        })
    }

    /// Prepare every region of `catalog` from `source`.
    pub fn prepare(
        &self,
        source: &DynamicImage,
        catalog: &RegionCatalog,
        client: &mut dyn SegmentationClient,
        progress_fn: Option<&dyn Fn(BatchStatusEvent)>,
    ) -> Result<BatchReport, PipelineError> {
        self.check_configuration(catalog)?;

        let start = Instant::now();
        let run_id = new_run_id();
        let mut report = BatchReport::new(run_id.clone(), chrono::Utc::now().to_rfc3339());
        let total = catalog.len();

        tracing::info!(
            run_id = %run_id,
            regions = total,
            model = %self.model_path.display(),
            output = %self.store.layout().root().display(),
            "Batch preparation started"
        );
        emit(progress_fn, BatchStatusEvent::Started {
            run_id: run_id.clone(),
            region_count: total as u32,
        });

        let mut estimate = RollingEstimate::new();
        let mut touched: u32 = 0;

        for (index, region) in catalog.regions().iter().enumerate() {
            let span =
                tracing::info_span!("region", run_id = %run_id, region = %region.name, index);
            let _guard = span.enter();

            emit(progress_fn, BatchStatusEvent::RegionStarted {
                index,
                total,
                name: region.name.clone(),
            });

            let region_start = Instant::now();
            let (status, attempts) =
                self.prepare_region(index, region, source, client, progress_fn);
            let segmented = attempts > 0;

            if segmented {
                // Release everything this region opened, duplicates included.
                let leftover = client.teardown_all();
                if leftover > 0 {
                    tracing::debug!(leftover, "Tore down leftover instances");
                }
                client.reclaim(ReclaimLevel::Light);
                touched += 1;
                let every = self.config.heavy_reclaim_every;
                if every > 0 && touched % every == 0 {
                    tracing::debug!(touched, "Heavy reclaim");
                    client.reclaim(ReclaimLevel::Heavy);
                }
                estimate.record(region_start.elapsed());
            }

            let outcome = RegionOutcome {
                index,
                name: region.name.clone(),
                status,
                attempts,
                duration_ms: region_start.elapsed().as_millis() as u64,
            };

            let projection = estimate.project(total - index - 1);
            if segmented {
                if let Some(p) = &projection {
                    tracing::info!(
                        per_region_secs = format_args!("{:.1}", p.per_region_secs),
                        remaining_secs = format_args!("{:.0}", p.remaining_secs),
                        "Region finished ({}/{})",
                        index + 1,
                        total
                    );
                }
            }

            emit(progress_fn, BatchStatusEvent::RegionFinished {
                outcome: outcome.clone(),
                estimate: projection,
            });
            report.record(outcome);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            run_id = %run_id,
            prepared = report.prepared,
            already_complete = report.already_complete,
            failed = report.failed,
            rejected = report.rejected,
            duration_ms = report.duration_ms,
            "Batch preparation finished"
        );
        emit(progress_fn, BatchStatusEvent::Completed {
            prepared: report.prepared,
            failed: report.failed,
            duration_ms: report.duration_ms,
        });

        Ok(report)
    }

    /// Everything that can go wrong here is contained to the region.
    /// Returns the status and the number of segmentation attempts made.
    fn prepare_region(
        &self,
        index: usize,
        region: &Region,
        source: &DynamicImage,
        client: &mut dyn SegmentationClient,
        progress_fn: Option<&dyn Fn(BatchStatusEvent)>,
    ) -> (RegionStatus, u32) {
        // Step 1: Idempotency check
        if self.store.is_complete(&region.name) {
            tracing::debug!("Artifacts already complete, skipping");
            return (RegionStatus::AlreadyComplete, 0);
        }

        // Step 2: Geometry
        let (width, height) = source.dimensions();
        let geometry = match crop_geometry(region, self.config.padding, width, height) {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!(error = %e, "Region rejected");
                return (RegionStatus::Rejected { reason: e.to_string() }, 0);
            }
        };
        let crop = source.crop_imm(
            geometry.crop.x as u32,
            geometry.crop.y as u32,
            geometry.crop.width,
            geometry.crop.height,
        );

        // Step 3: Segmentation with retry
        let (result, attempts) = self.segment(&crop, &region.name, client, progress_fn);
        let probability = match result {
            Ok(image) => ProbabilityMap::from_image(&image),
            Err(e) => {
                tracing::warn!(error = %e, "Region failed");
                return (RegionStatus::Failed { reason: e.to_string() }, attempts);
            }
        };

        // Step 4: Persistence
        let metadata = ArtifactMetadata {
            offset_x: geometry.offset_x,
            offset_y: geometry.offset_y,
            roi_width: region.width,
            roi_height: region.height,
            roi_index: index,
        };
        match self.store.write(&region.name, &crop, &probability, &metadata) {
            Ok(()) => {
                tracing::debug!(attempts, "Region prepared");
                (RegionStatus::Prepared, attempts)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Writing artifacts failed");
                (RegionStatus::Failed { reason: e.to_string() }, attempts)
            }
        }
    }

    /// Up to `max_attempts` attempts, each on a fresh instance.
    fn segment(
        &self,
        crop: &DynamicImage,
        name: &str,
        client: &mut dyn SegmentationClient,
        progress_fn: Option<&dyn Fn(BatchStatusEvent)>,
    ) -> (Result<DynamicImage, SegmentationError>, u32) {
        let mut last_error = String::new();
        for attempt in 1..=self.config.max_attempts {
            let result = client.start_instance().and_then(|mut instance| {
                let result = self.run_attempt(instance.as_mut(), crop, name, attempt, progress_fn);
                instance.shutdown();
                result
            });
            match result {
                Ok(image) => return (Ok(image), attempt),
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "Segmentation attempt failed"
                    );
                    last_error = e.to_string();
                }
            }
        }
        let attempts = self.config.max_attempts;
        (Err(SegmentationError::Exhausted { attempts, last: last_error }), attempts)
    }

    fn run_attempt(
        &self,
        instance: &mut dyn SegmentationInstance,
        crop: &DynamicImage,
        name: &str,
        attempt: u32,
        progress_fn: Option<&dyn Fn(BatchStatusEvent)>,
    ) -> Result<DynamicImage, SegmentationError> {
        let poll = &self.config.poll;

        instance
            .load_model(&self.model_path)
            .wait(poll.load_timeout(), poll.poll_interval(), |_| {})?;

        let mut last_notice = Duration::ZERO;
        let image = instance.compute_probability(crop).wait(
            poll.compute_timeout(),
            poll.poll_interval(),
            |elapsed| {
                if elapsed.saturating_sub(last_notice) >= poll.progress_interval() {
                    last_notice = elapsed;
                    let elapsed_ms = elapsed.as_millis() as u64;
                    tracing::info!(attempt, elapsed_ms, "Still computing probability map");
                    emit(progress_fn, BatchStatusEvent::ComputeWaiting {
                        name: name.to_string(),
                        attempt,
                        elapsed_ms,
                    });
                }
            },
        )?;

        if (image.width(), image.height()) != (crop.width(), crop.height()) {
            return Err(SegmentationError::ComputeFailed(format!(
                "probability map is {}x{}, crop is {}x{}",
                image.width(),
                image.height(),
                crop.width(),
                crop.height()
            )));
        }
        Ok(image)
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

fn emit(progress_fn: Option<&dyn Fn(BatchStatusEvent)>, event: BatchStatusEvent) {
    if let Some(progress) = progress_fn {
        progress(event);
    }
}
