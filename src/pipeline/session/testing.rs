//! Scripted Input / recording Output for session tests.

use std::collections::VecDeque;

use super::traits::{Input, LineResponse, Output, PreviewChoice, PreviewPrompt};
use crate::models::{Line, Region};
use crate::pipeline::storage::ArtifactMetadata;

#[derive(Debug, Clone)]
enum Reply {
    Line(LineResponse),
    Choice(PreviewChoice),
    Number(Option<i64>),
}

/// Replays a fixed sequence of answers. Once exhausted it quits.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    replies: VecDeque<Reply>,
    prompts: Vec<PreviewPrompt>,
    regions: Vec<String>,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, response: LineResponse) -> Self {
        self.replies.push_back(Reply::Line(response));
        self
    }

    pub fn line(self, line: Line) -> Self {
        self.respond(LineResponse::Line(line))
    }

    pub fn no_line(self) -> Self {
        self.respond(LineResponse::NoLine)
    }

    pub fn choice(mut self, choice: PreviewChoice) -> Self {
        self.replies.push_back(Reply::Choice(choice));
        self
    }

    pub fn number(mut self, value: i64) -> Self {
        self.replies.push_back(Reply::Number(Some(value)));
        self
    }

    pub fn default_number(mut self) -> Self {
        self.replies.push_back(Reply::Number(None));
        self
    }

    /// Every preview shown, in order.
    pub fn prompts(&self) -> &[PreviewPrompt] {
        &self.prompts
    }

    /// Region name of every line request, in order.
    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn is_exhausted(&self) -> bool {
        self.replies.is_empty()
    }
}

impl Input for ScriptedInput {
    fn request_line(&mut self, region: &str, _lines_so_far: u32) -> LineResponse {
        self.regions.push(region.to_string());
        match self.replies.pop_front() {
            Some(Reply::Line(response)) => response,
            None => LineResponse::Quit,
            Some(other) => panic!("script expected a line reply, found {other:?}"),
        }
    }

    fn request_choice(&mut self, prompt: &PreviewPrompt) -> PreviewChoice {
        self.prompts.push(prompt.clone());
        match self.replies.pop_front() {
            Some(Reply::Choice(choice)) => choice,
            None => PreviewChoice::Quit,
            Some(other) => panic!("script expected a choice reply, found {other:?}"),
        }
    }

    fn request_number(&mut self, _label: &str, default: i64) -> i64 {
        match self.replies.pop_front() {
            Some(Reply::Number(value)) => value.unwrap_or(default),
            None => default,
            Some(other) => panic!("script expected a number reply, found {other:?}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingOutput {
    pub outlines: Vec<String>,
    pub markers: Vec<(Line, Vec<f64>)>,
    pub clears: usize,
    pub notices: Vec<String>,
}

impl Output for RecordingOutput {
    fn render_outline(&mut self, region: &Region, _metadata: &ArtifactMetadata) {
        self.outlines.push(region.name.clone());
    }

    fn render_markers(&mut self, line: &Line, positions: &[f64]) {
        self.markers.push((*line, positions.to_vec()));
    }

    fn clear_markers(&mut self) {
        self.markers.clear();
        self.clears += 1;
    }

    fn notify(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}
