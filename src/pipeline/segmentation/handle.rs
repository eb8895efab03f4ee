//! Typed handles for asynchronous segmentation requests.
//!
//! A request returns a [`Pending`] immediately. The caller resolves it with
//! a bounded [`Pending::wait`], which sleeps and re-checks the underlying
//! operation until it is ready, fails, or the timeout elapses. A timed-out
//! operation is cancelled before the error is returned.

use std::time::{Duration, Instant};

use super::error::SegmentationError;

/// Observable state of an in-flight operation.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleState<T> {
    Pending,
    Ready(T),
    Failed(String),
}

/// Backend side of a handle. Implemented by each client.
pub trait AsyncOperation<T> {
    /// Non-blocking state check. Once `Ready` or `Failed` has been returned
    /// the operation is not polled again.
    fn poll(&mut self) -> HandleState<T>;

    /// Abandon the operation and release what it holds.
    fn cancel(&mut self);
}

/// Which request a handle belongs to; selects the error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadModel,
    ComputeProbability,
}

impl Stage {
    fn timed_out(self, waited: Duration) -> SegmentationError {
        let waited_ms = waited.as_millis() as u64;
        match self {
            Self::LoadModel => SegmentationError::LoadTimeout { waited_ms },
            Self::ComputeProbability => SegmentationError::ComputeTimeout { waited_ms },
        }
    }

    fn failed(self, reason: String) -> SegmentationError {
        match self {
            Self::LoadModel => SegmentationError::LoadFailed(reason),
            Self::ComputeProbability => SegmentationError::ComputeFailed(reason),
        }
    }
}

pub struct Pending<T> {
    stage: Stage,
    operation: Box<dyn AsyncOperation<T>>,
}

impl<T: 'static> Pending<T> {
    pub fn new(stage: Stage, operation: Box<dyn AsyncOperation<T>>) -> Self {
        Self { stage, operation }
    }

    /// A handle that is already resolved.
    pub fn ready(stage: Stage, value: T) -> Self {
        Self::new(stage, Box::new(Resolved(Some(Ok(value)))))
    }

    /// A handle that has already failed, e.g. because the request could
    /// not even be issued.
    pub fn failed(stage: Stage, reason: impl Into<String>) -> Self {
        Self::new(stage, Box::new(Resolved(Some(Err(reason.into())))))
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Block until the operation resolves or `timeout` elapses.
    ///
    /// `on_tick` is called with the elapsed time before every sleep.
    pub fn wait(
        mut self,
        timeout: Duration,
        interval: Duration,
        mut on_tick: impl FnMut(Duration),
    ) -> Result<T, SegmentationError> {
        let started = Instant::now();
        loop {
            match self.operation.poll() {
                HandleState::Ready(value) => return Ok(value),
                HandleState::Failed(reason) => return Err(self.stage.failed(reason)),
                HandleState::Pending => {}
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                tracing::debug!(
                    stage = ?self.stage,
                    waited_ms = elapsed.as_millis() as u64,
                    "Handle timed out, cancelling"
                );
                self.operation.cancel();
                return Err(self.stage.timed_out(elapsed));
            }

            on_tick(elapsed);
            std::thread::sleep(interval.min(timeout - elapsed));
        }
    }

    pub fn cancel(mut self) {
        self.operation.cancel();
    }
}

struct Resolved<T>(Option<Result<T, String>>);

impl<T> AsyncOperation<T> for Resolved<T> {
    fn poll(&mut self) -> HandleState<T> {
        match self.0.take() {
            Some(Ok(value)) => HandleState::Ready(value),
            Some(Err(reason)) => HandleState::Failed(reason),
            None => HandleState::Failed("handle already consumed".into()),
        }
    }

    fn cancel(&mut self) {
        self.0 = None;
    }
}
