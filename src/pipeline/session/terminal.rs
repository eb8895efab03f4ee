//! Line-oriented terminal front end for the counting session.
//!
//! End of input is treated as QUIT so a closed stdin never loses work.

use std::io::{BufRead, Write};

use super::traits::{Input, LineResponse, Output, PreviewChoice, PreviewPrompt};
use crate::models::{Line, Region};
use crate::pipeline::storage::ArtifactMetadata;

pub struct TerminalInput<R: BufRead, W: Write> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> TerminalInput<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Print `prompt` and read one trimmed reply. `None` on EOF or I/O error.
    fn ask(&mut self, prompt: &str) -> Option<String> {
        if write!(self.writer, "{prompt}").and_then(|_| self.writer.flush()).is_err() {
            return None;
        }
        let mut reply = String::new();
        match self.reader.read_line(&mut reply) {
            Ok(0) => None,
            Ok(_) => Some(reply.trim().to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "Reading terminal input failed");
                None
            }
        }
    }

    fn say(&mut self, message: &str) {
        let _ = writeln!(self.writer, "{message}");
    }
}

impl<R: BufRead, W: Write> Input for TerminalInput<R, W> {
    fn request_line(&mut self, region: &str, lines_so_far: u32) -> LineResponse {
        let finish = if lines_so_far == 0 { "skip" } else { "accept total" };
        let prompt = format!(
            "[{region}] line {}: x1 y1 x2 y2 | s=skip b=back q=quit | empty={finish}\n> ",
            lines_so_far + 1
        );
        loop {
            let Some(reply) = self.ask(&prompt) else {
                return LineResponse::Quit;
            };
            match parse_line_reply(&reply) {
                Some(response) => return response,
                None => self.say(&format!("Unrecognised input: {reply:?}")),
            }
        }
    }

    fn request_choice(&mut self, prompt: &PreviewPrompt) -> PreviewChoice {
        let text = format!(
            "[{}] line {}: {} peak(s) over {:.1} px, suggested count {}\n\
             a=accept l=add line r=redraw s=skip b=back q=quit [a]\n> ",
            prompt.region,
            prompt.line_number,
            prompt.auto_count,
            prompt.line_length,
            prompt.suggested
        );
        loop {
            let Some(reply) = self.ask(&text) else {
                return PreviewChoice::Quit;
            };
            match parse_choice(&reply) {
                Some(choice) => return choice,
                None => self.say(&format!("Unrecognised choice: {reply:?}")),
            }
        }
    }

    fn request_number(&mut self, label: &str, default: i64) -> i64 {
        let prompt = format!("{label} [{default}]: ");
        loop {
            let Some(reply) = self.ask(&prompt) else {
                return default;
            };
            if reply.is_empty() {
                return default;
            }
            match reply.parse::<i64>() {
                Ok(value) => return value,
                Err(_) => self.say(&format!("Not an integer: {reply:?}")),
            }
        }
    }
}

fn parse_line_reply(reply: &str) -> Option<LineResponse> {
    match reply.to_ascii_lowercase().as_str() {
        "" => return Some(LineResponse::NoLine),
        "s" | "skip" => return Some(LineResponse::Skip),
        "b" | "back" => return Some(LineResponse::GoBack),
        "q" | "quit" => return Some(LineResponse::Quit),
        _ => {}
    }
    let coords: Vec<f64> = reply
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match coords[..] {
        [x1, y1, x2, y2] if coords.iter().all(|v| v.is_finite()) => {
            Some(LineResponse::Line(Line::new(x1, y1, x2, y2)))
        }
        _ => None,
    }
}

fn parse_choice(reply: &str) -> Option<PreviewChoice> {
    match reply.to_ascii_lowercase().as_str() {
        "" | "a" | "accept" => Some(PreviewChoice::Accept),
        "l" | "add" | "add line" => Some(PreviewChoice::AddLine),
        "r" | "redraw" => Some(PreviewChoice::Redraw),
        "s" | "skip" => Some(PreviewChoice::Skip),
        "b" | "back" => Some(PreviewChoice::GoBack),
        "q" | "quit" => Some(PreviewChoice::Quit),
        _ => None,
    }
}

/// Feedback through the log instead of an image overlay.
#[derive(Debug, Default)]
pub struct LogOutput;

impl Output for LogOutput {
    fn render_outline(&mut self, region: &Region, metadata: &ArtifactMetadata) {
        tracing::info!(
            region = %region.name,
            index = metadata.roi_index,
            offset_x = metadata.offset_x,
            offset_y = metadata.offset_y,
            width = metadata.roi_width,
            height = metadata.roi_height,
            "Region outline"
        );
    }

    fn render_markers(&mut self, line: &Line, positions: &[f64]) {
        let points: Vec<String> = positions
            .iter()
            .map(|&t| {
                let (x, y) = line.point_at(t);
                format!("({x:.1}, {y:.1})")
            })
            .collect();
        tracing::info!(peaks = positions.len(), at = %points.join(" "), "Peak markers");
    }

    fn clear_markers(&mut self) {
        tracing::info!("Markers cleared");
    }

    fn notify(&mut self, message: &str) {
        tracing::warn!("{message}");
    }
}
