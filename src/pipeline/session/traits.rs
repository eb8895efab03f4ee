//! Host capabilities consumed by the counting session (allows scripting).

use crate::models::{Line, Region};
use crate::pipeline::storage::ArtifactMetadata;

/// Answer to "draw a line".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineResponse {
    Line(Line),
    /// Nothing drawn: skips a fresh region, accepts the running total otherwise.
    NoLine,
    Skip,
    GoBack,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewChoice {
    Accept,
    AddLine,
    Redraw,
    Skip,
    GoBack,
    Quit,
}

/// What the user is shown while confirming a line.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewPrompt {
    pub region: String,
    /// Lines drawn for this region, the one being previewed included.
    pub line_number: u32,
    /// Peaks detected on the line being previewed.
    pub auto_count: u32,
    /// Editable default: `auto_count`, plus the running total after ADD LINE.
    pub suggested: i64,
    pub line_length: f64,
}

pub trait Input {
    fn request_line(&mut self, region: &str, lines_so_far: u32) -> LineResponse;

    fn request_choice(&mut self, prompt: &PreviewPrompt) -> PreviewChoice;

    /// Editable integer with a default. Validation is the caller's job.
    fn request_number(&mut self, label: &str, default: i64) -> i64;
}

pub trait Output {
    fn render_outline(&mut self, region: &Region, metadata: &ArtifactMetadata);

    /// Markers accumulate until `clear_markers`.
    fn render_markers(&mut self, line: &Line, positions: &[f64]);

    fn clear_markers(&mut self);

    fn notify(&mut self, message: &str);
}
