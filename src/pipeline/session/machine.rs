//! Per-region counting state machine.
//!
//! ```text
//! AwaitLine ──line──→ PreviewConfirm ──ACCEPT──→ Accepted
//!    ↑  │                  │  │
//!    │  └─SKIP/BACK/QUIT   │  └─SKIP/BACK/QUIT──→ Skipped | GoBack | Quit
//!    └──ADD LINE / REDRAW──┘
//! ```
//!
//! One session handles exactly one region and ends in exactly one verdict.

use super::traits::{Input, LineResponse, Output, PreviewChoice, PreviewPrompt};
use crate::models::Line;
use crate::pipeline::peaks::detect_peaks;
use crate::pipeline::raster::ProbabilityMap;
use crate::pipeline_config::PeakParams;

/// Running totals accumulated through ADD LINE.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tally {
    pub count: u32,
    pub length: f64,
    pub lines: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegionVerdict {
    Accepted { count: u32, length: f64 },
    Skipped,
    GoBack,
    Quit,
}

/// Result of analysing one drawn line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineAnalysis {
    pub line: Line,
    pub length: f64,
    pub auto_count: u32,
    pub positions: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    AwaitLine,
    PreviewConfirm(LineAnalysis),
    Done(RegionVerdict),
}

pub struct CountingSession<'a> {
    region: &'a str,
    probability: &'a ProbabilityMap,
    params: PeakParams,
    tally: Tally,
    last_positions: Vec<f64>,
}

impl<'a> CountingSession<'a> {
    pub fn new(region: &'a str, probability: &'a ProbabilityMap, params: PeakParams) -> Self {
        Self {
            region,
            probability,
            params,
            tally: Tally::default(),
            last_positions: Vec::new(),
        }
    }

    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    /// Peak positions (0..1) along the most recently analysed line.
    pub fn last_positions(&self) -> &[f64] {
        &self.last_positions
    }

    /// Sample the probability map along `line` and count peaks.
    pub fn analyse(&self, line: &Line) -> LineAnalysis {
        let profile = self.probability.profile(line);
        let threshold = self.probability.scale().native_threshold(self.params.threshold);
        let detection = detect_peaks(
            &profile,
            threshold,
            self.params.min_width,
            self.params.min_distance,
        );
        LineAnalysis {
            line: *line,
            length: line.length(),
            auto_count: detection.count as u32,
            positions: detection.positions,
        }
    }

    /// Drive the machine to a verdict.
    pub fn run(&mut self, input: &mut dyn Input, output: &mut dyn Output) -> RegionVerdict {
        let mut state = SessionState::AwaitLine;
        loop {
            state = match self.step(state, input, output) {
                SessionState::Done(verdict) => {
                    tracing::debug!(region = self.region, ?verdict, "Region resolved");
                    return verdict;
                }
                next => next,
            };
        }
    }

    /// One transition.
    pub fn step(
        &mut self,
        state: SessionState,
        input: &mut dyn Input,
        output: &mut dyn Output,
    ) -> SessionState {
        match state {
            SessionState::AwaitLine => self.await_line(input, output),
            SessionState::PreviewConfirm(analysis) => self.confirm(analysis, input, output),
            done @ SessionState::Done(_) => done,
        }
    }

    fn await_line(&mut self, input: &mut dyn Input, output: &mut dyn Output) -> SessionState {
        match input.request_line(self.region, self.tally.lines) {
            LineResponse::Line(line) if !self.probability.covers(&line) => {
                let (width, height) = self.probability.dimensions();
                tracing::warn!(region = self.region, ?line, width, height, "Line outside crop");
                output.notify(&format!(
                    "Line ({}, {}) - ({}, {}) lies outside the {width}x{height} crop",
                    line.x1, line.y1, line.x2, line.y2
                ));
                SessionState::AwaitLine
            }
            LineResponse::Line(line) => {
                let analysis = self.analyse(&line);
                tracing::debug!(
                    region = self.region,
                    length = analysis.length,
                    auto_count = analysis.auto_count,
                    "Line analysed"
                );
                output.render_markers(&analysis.line, &analysis.positions);
                self.last_positions = analysis.positions.clone();
                SessionState::PreviewConfirm(analysis)
            }
            LineResponse::NoLine if self.tally.lines == 0 => {
                SessionState::Done(RegionVerdict::Skipped)
            }
            LineResponse::NoLine => SessionState::Done(RegionVerdict::Accepted {
                count: self.tally.count,
                length: self.tally.length,
            }),
            LineResponse::Skip => SessionState::Done(RegionVerdict::Skipped),
            LineResponse::GoBack => SessionState::Done(RegionVerdict::GoBack),
            LineResponse::Quit => SessionState::Done(RegionVerdict::Quit),
        }
    }

    fn confirm(
        &mut self,
        analysis: LineAnalysis,
        input: &mut dyn Input,
        output: &mut dyn Output,
    ) -> SessionState {
        let suggested = if self.tally.lines == 0 {
            i64::from(analysis.auto_count)
        } else {
            i64::from(self.tally.count) + i64::from(analysis.auto_count)
        };
        let prompt = PreviewPrompt {
            region: self.region.to_string(),
            line_number: self.tally.lines + 1,
            auto_count: analysis.auto_count,
            suggested,
            line_length: analysis.length,
        };

        let choice = input.request_choice(&prompt);
        match choice {
            PreviewChoice::Accept | PreviewChoice::AddLine => {
                let edited = input.request_number("Cristae count", suggested);
                let Ok(count) = u32::try_from(edited) else {
                    tracing::warn!(region = self.region, edited, "Rejected out-of-range count");
                    output.notify(&format!("Count must be a non-negative integer, got {edited}"));
                    return SessionState::PreviewConfirm(analysis);
                };
                if choice == PreviewChoice::Accept {
                    return SessionState::Done(RegionVerdict::Accepted {
                        count,
                        length: self.tally.length + analysis.length,
                    });
                }
                // the edited value is the new cumulative count
                self.tally.count = count;
                self.tally.length += analysis.length;
                self.tally.lines += 1;
                SessionState::AwaitLine
            }
            PreviewChoice::Redraw => {
                self.tally = Tally::default();
                self.last_positions.clear();
                output.clear_markers();
                SessionState::AwaitLine
            }
            PreviewChoice::Skip => SessionState::Done(RegionVerdict::Skipped),
            PreviewChoice::GoBack => SessionState::Done(RegionVerdict::GoBack),
            PreviewChoice::Quit => SessionState::Done(RegionVerdict::Quit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::raster::ProbabilityScale;
    use crate::pipeline::session::testing::{ScriptedInput, RecordingOutput};

    /// 100x20 byte map with 3-px vertical stripes (value 200) at x = 10, 20,
    /// 40 and 70; zero elsewhere.
    fn striped() -> ProbabilityMap {
        let (w, h) = (100u32, 20u32);
        let data = (0..h)
            .flat_map(|_| {
                (0..w).map(|x| {
                    let on = [10, 20, 40, 70].iter().any(|&s| x >= s && x < s + 3);
                    if on { 200.0 } else { 0.0 }
                })
            })
            .collect();
        ProbabilityMap::new(w, h, ProbabilityScale::Byte, data).unwrap()
    }

    fn params() -> PeakParams {
        PeakParams {
            threshold: 128.0,
            min_width: 2,
            min_distance: 3,
        }
    }

    /// Crosses the stripes at 10 and 20.
    fn left_line() -> Line {
        Line::new(5.0, 10.0, 30.0, 10.0)
    }

    /// Crosses the stripes at 40 and 70.
    fn right_line() -> Line {
        Line::new(35.0, 10.0, 80.0, 10.0)
    }

    #[test]
    fn analyse_counts_stripes() {
        let map = striped();
        let session = CountingSession::new("M1", &map, params());
        let analysis = session.analyse(&left_line());
        assert_eq!(analysis.auto_count, 2);
        assert_eq!(analysis.length, 25.0);
        assert_eq!(analysis.positions.len(), 2);
        assert!(analysis.positions[0] < analysis.positions[1]);
    }

    #[test]
    fn accept_uses_edited_count_and_line_length() {
        let map = striped();
        let mut input = ScriptedInput::new()
            .line(left_line())
            .choice(PreviewChoice::Accept)
            .number(5);
        let mut output = RecordingOutput::default();
        let verdict = CountingSession::new("M1", &map, params()).run(&mut input, &mut output);
        assert_eq!(verdict, RegionVerdict::Accepted { count: 5, length: 25.0 });
        assert_eq!(input.prompts()[0].suggested, 2);
        assert_eq!(output.markers.len(), 1);
    }

    #[test]
    fn add_line_replaces_running_total() {
        let map = striped();
        let mut input = ScriptedInput::new()
            .line(left_line())
            .choice(PreviewChoice::AddLine)
            .number(3)
            .line(right_line())
            .choice(PreviewChoice::Accept)
            .default_number();
        let mut output = RecordingOutput::default();
        let verdict = CountingSession::new("M1", &map, params()).run(&mut input, &mut output);

        // second preview suggests edited total (3) + new auto count (2)
        assert_eq!(input.prompts()[1].suggested, 5);
        assert_eq!(input.prompts()[1].line_number, 2);
        assert_eq!(verdict, RegionVerdict::Accepted { count: 5, length: 25.0 + 45.0 });
        assert_eq!(output.markers.len(), 2, "markers accumulate across ADD LINE");
    }

    #[test]
    fn no_line_after_add_line_accepts_running_total() {
        let map = striped();
        let mut input = ScriptedInput::new()
            .line(left_line())
            .choice(PreviewChoice::AddLine)
            .default_number()
            .no_line();
        let mut output = RecordingOutput::default();
        let verdict = CountingSession::new("M1", &map, params()).run(&mut input, &mut output);
        assert_eq!(verdict, RegionVerdict::Accepted { count: 2, length: 25.0 });
    }

    #[test]
    fn no_line_on_fresh_region_skips() {
        let map = striped();
        let mut input = ScriptedInput::new().no_line();
        let mut output = RecordingOutput::default();
        let verdict = CountingSession::new("M1", &map, params()).run(&mut input, &mut output);
        assert_eq!(verdict, RegionVerdict::Skipped);
    }

    #[test]
    fn line_outside_crop_is_refused_then_next_line_counts() {
        let map = striped();
        let mut input = ScriptedInput::new()
            .line(Line::new(0.0, 0.0, 1.0e15, 0.0))
            .line(left_line())
            .choice(PreviewChoice::Accept)
            .default_number();
        let mut output = RecordingOutput::default();
        let verdict = CountingSession::new("M1", &map, params()).run(&mut input, &mut output);

        assert_eq!(verdict, RegionVerdict::Accepted { count: 2, length: 25.0 });
        assert_eq!(output.notices.len(), 1);
        assert!(output.notices[0].contains("outside"));
        assert_eq!(input.prompts().len(), 1);
        assert_eq!(output.markers.len(), 1);
    }

    #[test]
    fn redraw_resets_everything() {
        let map = striped();
        let mut input = ScriptedInput::new()
            .line(left_line())
            .choice(PreviewChoice::AddLine)
            .number(7)
            .line(right_line())
            .choice(PreviewChoice::Redraw)
            .no_line();
        let mut output = RecordingOutput::default();
        let mut session = CountingSession::new("M1", &map, params());
        let verdict = session.run(&mut input, &mut output);

        assert_eq!(verdict, RegionVerdict::Skipped);
        assert_eq!(session.tally(), &Tally::default());
        assert_eq!(output.clears, 1);
        assert!(output.markers.is_empty());
    }

    #[test]
    fn negative_count_rejected_and_preview_repeated() {
        let map = striped();
        let mut input = ScriptedInput::new()
            .line(left_line())
            .choice(PreviewChoice::Accept)
            .number(-4)
            .choice(PreviewChoice::Accept)
            .number(1);
        let mut output = RecordingOutput::default();
        let verdict = CountingSession::new("M1", &map, params()).run(&mut input, &mut output);

        assert_eq!(verdict, RegionVerdict::Accepted { count: 1, length: 25.0 });
        assert_eq!(output.notices.len(), 1);
        assert_eq!(input.prompts().len(), 2);
        assert_eq!(input.prompts()[0], input.prompts()[1]);
    }

    #[test]
    fn abort_choices_from_both_states() {
        let map = striped();
        for (response, expected) in [
            (LineResponse::Skip, RegionVerdict::Skipped),
            (LineResponse::GoBack, RegionVerdict::GoBack),
            (LineResponse::Quit, RegionVerdict::Quit),
        ] {
            let mut input = ScriptedInput::new().respond(response);
            let verdict = CountingSession::new("M1", &map, params())
                .run(&mut input, &mut RecordingOutput::default());
            assert_eq!(verdict, expected);
        }
        for (choice, expected) in [
            (PreviewChoice::Skip, RegionVerdict::Skipped),
            (PreviewChoice::GoBack, RegionVerdict::GoBack),
            (PreviewChoice::Quit, RegionVerdict::Quit),
        ] {
            let mut input = ScriptedInput::new()
                .line(left_line())
                .choice(PreviewChoice::AddLine)
                .default_number()
                .line(right_line())
                .choice(choice);
            let verdict = CountingSession::new("M1", &map, params())
                .run(&mut input, &mut RecordingOutput::default());
            assert_eq!(verdict, expected, "totals are discarded on {choice:?}");
        }
    }

    #[test]
    fn unit_scale_map_uses_converted_threshold() {
        let byte = striped();
        let unit_data = (0..byte.height())
            .flat_map(|y| (0..byte.width()).map(move |x| (x, y)))
            .map(|(x, y)| byte.value(x, y) / 255.0)
            .collect();
        let (w, h) = byte.dimensions();
        let unit = ProbabilityMap::new(w, h, ProbabilityScale::Unit, unit_data).unwrap();
        let session = CountingSession::new("M1", &unit, params());
        assert_eq!(session.analyse(&left_line()).auto_count, 2);
    }
}
