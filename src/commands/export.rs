//! Export command: copy the autosaved results table to a chosen location.

use std::path::Path;

use crate::pipeline::storage::{OutputLayout, ResultStore};
use crate::pipeline::PipelineError;

/// Returns the number of rows written.
pub fn export(output_root: &Path, destination: &Path) -> Result<usize, PipelineError> {
    let autosave = OutputLayout::new(output_root).results_autosave();
    if !autosave.is_file() {
        return Err(PipelineError::Configuration(format!(
            "no results table at {}",
            autosave.display()
        )));
    }
    let results = ResultStore::load(autosave)?;
    results.export(destination)?;
    Ok(results.len())
}
