//! Scripted segmentation client for testing.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;

use image::{DynamicImage, Rgb, RgbImage};

use super::error::SegmentationError;
use super::handle::{AsyncOperation, HandleState, Pending, Stage};
use super::traits::{ReclaimLevel, SegmentationClient, SegmentationInstance};

/// What one instance does when driven.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedBehavior {
    Succeed,
    /// Compute resolves only after this many polls.
    SlowCompute(u32),
    HangOnLoad,
    HangOnCompute,
    FailLoad(String),
    FailCompute(String),
}

/// Call counters shared between the client and its instances.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptStats {
    pub instances: usize,
    pub loads: usize,
    pub computes: usize,
    pub cancels: usize,
    pub shutdowns: usize,
    pub teardown_calls: usize,
    pub torn_down: usize,
    pub light_reclaims: usize,
    pub heavy_reclaims: usize,
    live: usize,
}

/// Mock client: instance N follows the N-th scripted behavior, then the
/// fallback once the script is exhausted.
///
/// The default output is an RGB raster whose first channel is the input's
/// luma, so the probability map mirrors the crop.
pub struct ScriptedSegmentationClient {
    script: VecDeque<ScriptedBehavior>,
    fallback: ScriptedBehavior,
    output: Option<DynamicImage>,
    stats: Rc<RefCell<ScriptStats>>,
}

impl ScriptedSegmentationClient {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            fallback: ScriptedBehavior::Succeed,
            output: None,
            stats: Rc::new(RefCell::new(ScriptStats::default())),
        }
    }

    pub fn with_script(mut self, script: Vec<ScriptedBehavior>) -> Self {
        self.script = script.into();
        self
    }

    pub fn with_fallback(mut self, behavior: ScriptedBehavior) -> Self {
        self.fallback = behavior;
        self
    }

    /// Return this raster from every successful compute.
    pub fn with_output(mut self, output: DynamicImage) -> Self {
        self.output = Some(output);
        self
    }

    pub fn stats(&self) -> ScriptStats {
        self.stats.borrow().clone()
    }
}

impl Default for ScriptedSegmentationClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentationClient for ScriptedSegmentationClient {
    fn start_instance(&mut self) -> Result<Box<dyn SegmentationInstance>, SegmentationError> {
        let behavior = self.script.pop_front().unwrap_or_else(|| self.fallback.clone());
        {
            let mut stats = self.stats.borrow_mut();
            stats.instances += 1;
            stats.live += 1;
        }
        Ok(Box::new(ScriptedInstance {
            behavior,
            output: self.output.clone(),
            stats: self.stats.clone(),
            running: true,
        }))
    }

    fn teardown_all(&mut self) -> usize {
        let mut stats = self.stats.borrow_mut();
        stats.teardown_calls += 1;
        let live = std::mem::take(&mut stats.live);
        stats.torn_down += live;
        live
    }

    fn reclaim(&mut self, level: ReclaimLevel) {
        let mut stats = self.stats.borrow_mut();
        match level {
            ReclaimLevel::Light => stats.light_reclaims += 1,
            ReclaimLevel::Heavy => stats.heavy_reclaims += 1,
        }
    }
}

struct ScriptedInstance {
    behavior: ScriptedBehavior,
    output: Option<DynamicImage>,
    stats: Rc<RefCell<ScriptStats>>,
    running: bool,
}

impl SegmentationInstance for ScriptedInstance {
    fn load_model(&mut self, _model: &Path) -> Pending<()> {
        self.stats.borrow_mut().loads += 1;
        match &self.behavior {
            ScriptedBehavior::HangOnLoad => Pending::new(
                Stage::LoadModel,
                Box::new(Never {
                    stats: self.stats.clone(),
                }),
            ),
            ScriptedBehavior::FailLoad(reason) => Pending::failed(Stage::LoadModel, reason.clone()),
            _ => Pending::ready(Stage::LoadModel, ()),
        }
    }

    fn compute_probability(&mut self, image: &DynamicImage) -> Pending<DynamicImage> {
        self.stats.borrow_mut().computes += 1;
        let stage = Stage::ComputeProbability;
        let output = self.output.clone().unwrap_or_else(|| mirror_luma(image));
        match &self.behavior {
            ScriptedBehavior::HangOnCompute => Pending::new(
                stage,
                Box::new(Never {
                    stats: self.stats.clone(),
                }),
            ),
            ScriptedBehavior::FailCompute(reason) => Pending::failed(stage, reason.clone()),
            ScriptedBehavior::SlowCompute(polls) => Pending::new(
                stage,
                Box::new(Delayed {
                    polls_left: *polls,
                    value: Some(output),
                }),
            ),
            _ => Pending::ready(stage, output),
        }
    }

    fn shutdown(&mut self) {
        if std::mem::take(&mut self.running) {
            let mut stats = self.stats.borrow_mut();
            stats.shutdowns += 1;
            stats.live = stats.live.saturating_sub(1);
        }
    }
}

fn mirror_luma(image: &DynamicImage) -> DynamicImage {
    let luma = image.to_luma8();
    let rgb = RgbImage::from_fn(luma.width(), luma.height(), |x, y| {
        Rgb([luma.get_pixel(x, y)[0], 0, 0])
    });
    DynamicImage::ImageRgb8(rgb)
}

struct Never {
    stats: Rc<RefCell<ScriptStats>>,
}

impl<T> AsyncOperation<T> for Never {
    fn poll(&mut self) -> HandleState<T> {
        HandleState::Pending
    }

    fn cancel(&mut self) {
        self.stats.borrow_mut().cancels += 1;
    }
}

struct Delayed<T> {
    polls_left: u32,
    value: Option<T>,
}

impl<T> AsyncOperation<T> for Delayed<T> {
    fn poll(&mut self) -> HandleState<T> {
        if self.polls_left > 0 {
            self.polls_left -= 1;
            return HandleState::Pending;
        }
        match self.value.take() {
            Some(value) => HandleState::Ready(value),
            None => HandleState::Failed("result already taken".into()),
        }
    }

    fn cancel(&mut self) {
        self.value = None;
    }
}
