//! Entry points for the two pipeline phases and the results export.
//!
//! Each command takes its immutable configuration at call time and reaches
//! the outside world only through the traits it is handed (segmentation
//! client, input, output), so the CLI and the tests share one code path.
//!
//! Commands:
//! - `prepare`: crop every catalog region, segment it, checkpoint artifacts
//! - `analyze`: interactive counting over the prepared regions
//! - `export`: copy the results table elsewhere

pub mod analyze;
pub mod export;
pub mod prepare;

pub use analyze::{analyze, AnalyzeRequest};
pub use export::export;
pub use prepare::{prepare, PrepareRequest};

#[cfg(test)]
mod tests {
    use std::path::Path;

    use image::{DynamicImage, ImageBuffer, Luma};

    use super::*;
    use crate::models::{Line, Region};
    use crate::pipeline::segmentation::ScriptedSegmentationClient;
    use crate::pipeline::session::testing::{RecordingOutput, ScriptedInput};
    use crate::pipeline::session::PreviewChoice;
    use crate::pipeline::storage::{OutputLayout, RegionCatalog, ResultStore};
    use crate::pipeline::PipelineError;
    use crate::pipeline_config::{AnalysisConfig, PrepareConfig};

    /// 200x150 source with two bright vertical stripes at x 30..33 and 43..46.
    fn write_source(path: &Path) {
        let buffer = ImageBuffer::from_fn(200, 150, |x, _| {
            if (30..33).contains(&x) || (43..46).contains(&x) {
                Luma([200u8])
            } else {
                Luma([0u8])
            }
        });
        DynamicImage::ImageLuma8(buffer).save(path).unwrap();
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        request: PrepareRequest,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("cell.png");
        write_source(&source);

        let catalog = dir.path().join("regions.json");
        RegionCatalog::from_regions(vec![Region::new("M1", 10, 10, 50, 50)])
            .save(&catalog)
            .unwrap();

        let model = dir.path().join("cristae.ilp");
        std::fs::write(&model, b"model").unwrap();

        let request = PrepareRequest {
            source_image: source,
            catalog,
            model,
            output_root: dir.path().join("out"),
        };
        Fixture { _dir: dir, request }
    }

    fn fast_config() -> PrepareConfig {
        let mut config = PrepareConfig::default();
        config.poll.load_timeout_ms = 1_000;
        config.poll.compute_timeout_ms = 1_000;
        config.poll.poll_interval_ms = 1;
        config
    }

    #[test]
    fn prepare_analyze_export_end_to_end() {
        let f = fixture();
        let mut client = ScriptedSegmentationClient::new();
        let report = prepare(&f.request, &mut client, &fast_config(), None).unwrap();
        assert_eq!(report.prepared, 1);

        let layout = OutputLayout::new(&f.request.output_root);
        assert!(layout.catalog_backup().is_file());

        // Crop origin is (0,0) after padding, so crop x equals source x.
        let mut input = ScriptedInput::new()
            .line(Line::new(20.0, 40.0, 60.0, 40.0))
            .choice(PreviewChoice::Accept)
            .default_number();
        let mut output = RecordingOutput::default();
        let request = AnalyzeRequest {
            output_root: f.request.output_root.clone(),
            start_index: None,
        };
        let summary =
            analyze(&request, &AnalysisConfig::default(), &mut input, &mut output).unwrap();
        assert_eq!(summary.accepted, 1);
        assert_eq!(input.prompts()[0].auto_count, 2);

        let results = ResultStore::load(layout.results_autosave()).unwrap();
        let row = &results.rows()[0];
        assert_eq!(row.label, "M1");
        assert_eq!(row.count, 2);
        assert_eq!(row.area_px2, 2500.0);
        assert!((row.line_length_px - 40.0).abs() < 1e-9);
        assert!((row.density() - 0.8).abs() < 1e-12);

        let dest = f.request.output_root.join("exported.csv");
        assert_eq!(export(&f.request.output_root, &dest).unwrap(), 1);
        let text = std::fs::read_to_string(&dest).unwrap();
        assert!(text.lines().any(|l| l == "M1,2500,2,40,0.8"));
    }

    #[test]
    fn second_prepare_reports_already_complete() {
        let f = fixture();
        let mut client = ScriptedSegmentationClient::new();
        prepare(&f.request, &mut client, &fast_config(), None).unwrap();

        let mut client = ScriptedSegmentationClient::new();
        let report = prepare(&f.request, &mut client, &fast_config(), None).unwrap();
        assert_eq!(report.already_complete, 1);
        assert_eq!(report.prepared, 0);
        assert_eq!(client.stats().computes, 0);
    }

    #[test]
    fn missing_model_is_a_configuration_error() {
        let mut f = fixture();
        f.request.model = f.request.output_root.join("absent.ilp");
        let mut client = ScriptedSegmentationClient::new();
        let err = prepare(&f.request, &mut client, &fast_config(), None).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(!f.request.output_root.exists());
    }

    #[test]
    fn analyze_without_prepare_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let request = AnalyzeRequest {
            output_root: dir.path().to_path_buf(),
            start_index: None,
        };
        let mut input = ScriptedInput::new();
        let mut output = RecordingOutput::default();
        let err =
            analyze(&request, &AnalysisConfig::default(), &mut input, &mut output).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn export_without_results_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = export(dir.path(), &dir.path().join("x.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
