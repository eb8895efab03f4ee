//! Analyze command: interactive counting over prepared regions.

use std::path::PathBuf;

use crate::pipeline::session::{run_analysis, AnalysisSummary, Input, Output};
use crate::pipeline::storage::{ArtifactStore, RegionCatalog, ResultStore};
use crate::pipeline::PipelineError;
use crate::pipeline_config::AnalysisConfig;

#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    pub output_root: PathBuf,
    /// Catalog position to start at; defaults to just after the last
    /// recorded region.
    pub start_index: Option<usize>,
}

pub fn analyze(
    request: &AnalyzeRequest,
    config: &AnalysisConfig,
    input: &mut dyn Input,
    output: &mut dyn Output,
) -> Result<AnalysisSummary, PipelineError> {
    let artifacts = ArtifactStore::open(&request.output_root);
    let layout = artifacts.layout();

    let catalog_path = layout.catalog_backup();
    let catalog = RegionCatalog::load(&catalog_path).map_err(|e| {
        PipelineError::Configuration(format!(
            "cannot read region catalog {}: {e} (run prepare first)",
            catalog_path.display()
        ))
    })?;
    if catalog.is_empty() {
        return Err(PipelineError::Configuration("region catalog is empty".into()));
    }

    let mut results = ResultStore::open(layout.results_autosave())?;
    run_analysis(
        &catalog,
        &artifacts,
        &mut results,
        config,
        request.start_index,
        input,
        output,
    )
}
