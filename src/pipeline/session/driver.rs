//! Region-to-region control loop for the interactive phase.
//!
//! Exactly one region is in flight. The results table is persisted after
//! every change, so quitting or crashing at any point loses at most the
//! region currently on screen.

use serde::Serialize;

use super::machine::{CountingSession, RegionVerdict};
use super::traits::{Input, Output};
use crate::models::Measurement;
use crate::pipeline::error::PipelineError;
use crate::pipeline::storage::{ArtifactStore, RegionCatalog, ResultStore};
use crate::pipeline_config::AnalysisConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisSummary {
    pub accepted: u32,
    pub skipped: u32,
    /// Regions without a complete artifact triple.
    pub missing: u32,
    pub rewound: u32,
    pub quit: bool,
    /// Rows in the results table when the loop stopped.
    pub rows: usize,
}

/// Catalog position after the last recorded row; 0 for an empty table.
pub fn resume_index(catalog: &RegionCatalog, results: &ResultStore) -> usize {
    results
        .last()
        .and_then(|row| catalog.position(&row.label))
        .map_or(0, |position| position + 1)
}

/// Walk the catalog from `start_index` (or the resume point) to the end or
/// until the user quits.
pub fn run_analysis(
    catalog: &RegionCatalog,
    artifacts: &ArtifactStore,
    results: &mut ResultStore,
    config: &AnalysisConfig,
    start_index: Option<usize>,
    input: &mut dyn Input,
    output: &mut dyn Output,
) -> Result<AnalysisSummary, PipelineError> {
    let mut summary = AnalysisSummary::default();
    let total = catalog.len();
    let mut cursor = start_index
        .unwrap_or_else(|| resume_index(catalog, results))
        .min(total);

    tracing::info!(regions = total, start = cursor, recorded = results.len(), "Analysis started");

    while let Some(region) = catalog.get(cursor) {
        let name = region.name.as_str();

        if results.contains(name) {
            tracing::debug!(region = name, "Already recorded, skipping");
            cursor += 1;
            continue;
        }

        let triple = match artifacts.load(name) {
            Ok(Some(triple)) => triple,
            Ok(None) => {
                let e = PipelineError::ArtifactMissing(name.to_string());
                tracing::warn!(region = name, error = %e, "Skipping region");
                summary.missing += 1;
                cursor += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(region = name, error = %e, "Unreadable artifacts, skipping region");
                summary.missing += 1;
                cursor += 1;
                continue;
            }
        };

        output.render_outline(region, &triple.metadata);
        let verdict =
            CountingSession::new(name, &triple.probability, config.peaks).run(input, output);

        match verdict {
            RegionVerdict::Accepted { count, length } => {
                let row = Measurement::new(name, region.area_px(), i64::from(count), length)
                    .map_err(|e| PipelineError::InvariantViolation(format!("{name}: {e}")))?;
                results.append(row)?;
                results.persist()?;
                summary.accepted += 1;
                tracing::info!(region = name, count, length, "Region accepted");
                cursor += 1;
            }
            RegionVerdict::Skipped => {
                let row = Measurement::skipped(name, region.area_px())
                    .map_err(|e| PipelineError::InvariantViolation(format!("{name}: {e}")))?;
                results.append(row)?;
                results.persist()?;
                summary.skipped += 1;
                tracing::info!(region = name, "Region skipped");
                cursor += 1;
            }
            RegionVerdict::GoBack => {
                if cursor == 0 || results.is_empty() {
                    output.notify("Nothing to go back to");
                    continue;
                }
                if let Some(removed) = results.remove_last() {
                    results.persist()?;
                    summary.rewound += 1;
                    // never moves forward, even when the removed row lies ahead
                    cursor = catalog
                        .position(&removed.label)
                        .filter(|&position| position < cursor)
                        .unwrap_or_else(|| cursor.saturating_sub(1));
                    tracing::info!(removed = %removed.label, cursor, "Went back one region");
                }
            }
            RegionVerdict::Quit => {
                results.persist()?;
                summary.quit = true;
                tracing::info!(region = name, "Analysis stopped by user");
                break;
            }
        }
    }

    summary.rows = results.len();
    tracing::info!(
        accepted = summary.accepted,
        skipped = summary.skipped,
        missing = summary.missing,
        rewound = summary.rewound,
        rows = summary.rows,
        "Analysis finished"
    );
    Ok(summary)
}
