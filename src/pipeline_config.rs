//! Immutable run configuration for both pipeline phases.
//!
//! Values are built once (defaults, settings file, command-line overrides)
//! and passed by reference into `prepare` / `analyze`. Nothing here is
//! mutated while a run is in progress.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config;
use crate::pipeline::storage::StorageError;

// ═══════════════════════════════════════════════════════════
// Batch preparation
// ═══════════════════════════════════════════════════════════

/// Bounded-wait policy for the external segmentation tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Hard limit for a model load, per attempt.
    pub load_timeout_ms: u64,
    /// Hard limit for one probability computation, per attempt.
    pub compute_timeout_ms: u64,
    /// Sleep between two state checks.
    pub poll_interval_ms: u64,
    /// How often a "still computing" notice is emitted.
    pub progress_interval_ms: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            load_timeout_ms: 10_000,
            compute_timeout_ms: 30_000,
            poll_interval_ms: 250,
            progress_interval_ms: 5_000,
        }
    }
}

impl PollPolicy {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn compute_timeout(&self) -> Duration {
        Duration::from_millis(self.compute_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Configuration for the checkpointed batch stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepareConfig {
    /// Context margin added around each region before cropping (px).
    pub padding: u32,
    /// Segmentation attempts per region before it is marked failed.
    pub max_attempts: u32,
    /// A heavy reclaim is requested every N regions.
    pub heavy_reclaim_every: u32,
    pub poll: PollPolicy,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            padding: 20,
            max_attempts: 2,
            heavy_reclaim_every: 50,
            poll: PollPolicy::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Interactive analysis
// ═══════════════════════════════════════════════════════════

/// Peak detection parameters.
///
/// `threshold` is on the 8-bit scale (0–255). It is converted to the
/// probability map's native range when a profile is analysed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakParams {
    pub threshold: f64,
    pub min_width: usize,
    pub min_distance: usize,
}

impl Default for PeakParams {
    fn default() -> Self {
        Self {
            threshold: 128.0,
            min_width: 2,
            min_distance: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub peaks: PeakParams,
}

// ═══════════════════════════════════════════════════════════
// External segmentation command
// ═══════════════════════════════════════════════════════════

/// Headless classifier invocation.
///
/// `args` may contain the placeholders `{model}`, `{input}` and `{output}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Default for SegmenterCommand {
    fn default() -> Self {
        Self {
            program: PathBuf::from("run_ilastik.sh"),
            args: vec![
                "--headless".into(),
                "--project={model}".into(),
                "--export_source=Probabilities".into(),
                "--output_format=png".into(),
                "--output_filename_format={output}".into(),
                "{input}".into(),
            ],
        }
    }
}

impl SegmenterCommand {
    /// Arguments with placeholders substituted.
    pub fn render_args(&self, model: &Path, input: &Path, output: &Path) -> Vec<String> {
        let model = model.to_string_lossy();
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{model}", &model)
                    .replace("{input}", &input)
                    .replace("{output}", &output)
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════
// Settings file
// ═══════════════════════════════════════════════════════════

/// Everything that can be set from the JSON settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub prepare: PrepareConfig,
    pub analysis: AnalysisConfig,
    pub segmenter: SegmenterCommand,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Explicit path if given (must exist), else the per-user settings file
    /// if present, else defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, StorageError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match config::default_settings_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "Loading user settings");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
