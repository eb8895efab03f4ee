//! Segmentation through a headless classifier executable.
//!
//! Each instance owns a scratch directory. `compute_probability` writes the
//! crop there, spawns the configured command and hands back a handle that
//! owns the child process and the path it was told to write. Every child is
//! also registered with the client so stragglers can be killed by
//! `teardown_all` even if their instance was never shut down.

use std::cell::RefCell;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, TryRecvError};

use image::{DynamicImage, ImageOutputFormat};
use tempfile::TempDir;

use super::error::SegmentationError;
use super::handle::{AsyncOperation, HandleState, Pending, Stage};
use super::traits::{ReclaimLevel, SegmentationClient, SegmentationInstance};
use crate::pipeline_config::SegmenterCommand;

type ChildSlot = Rc<RefCell<Option<Child>>>;
type Registry = Rc<RefCell<Vec<ChildSlot>>>;

pub struct ExternalCommandClient {
    command: SegmenterCommand,
    scratch: TempDir,
    registry: Registry,
    next_instance: usize,
}

impl ExternalCommandClient {
    pub fn new(command: SegmenterCommand) -> Result<Self, SegmentationError> {
        let scratch = tempfile::Builder::new()
            .prefix("cristae-seg-")
            .tempdir()
            .map_err(|e| SegmentationError::Spawn(format!("scratch directory: {e}")))?;
        Ok(Self {
            command,
            scratch,
            registry: Rc::new(RefCell::new(Vec::new())),
            next_instance: 0,
        })
    }

    /// Number of registered child processes that have not been reaped.
    pub fn live_processes(&self) -> usize {
        self.registry
            .borrow()
            .iter()
            .filter(|slot| slot.borrow().is_some())
            .count()
    }
}

impl SegmentationClient for ExternalCommandClient {
    fn start_instance(&mut self) -> Result<Box<dyn SegmentationInstance>, SegmentationError> {
        self.next_instance += 1;
        let dir = self.scratch.path().join(format!("instance-{}", self.next_instance));
        std::fs::create_dir_all(&dir)
            .map_err(|e| SegmentationError::Spawn(format!("{}: {e}", dir.display())))?;

        tracing::debug!(instance = self.next_instance, "Segmentation instance started");
        Ok(Box::new(CommandInstance {
            command: self.command.clone(),
            dir,
            model: None,
            registry: self.registry.clone(),
            own: Vec::new(),
            requests: 0,
        }))
    }

    fn teardown_all(&mut self) -> usize {
        let mut killed = 0;
        for slot in self.registry.borrow().iter() {
            if let Some(child) = slot.borrow_mut().take() {
                kill_and_reap(child);
                killed += 1;
            }
        }
        if killed > 0 {
            tracing::debug!(killed, "Tore down leftover segmentation processes");
        }
        killed
    }

    fn reclaim(&mut self, level: ReclaimLevel) {
        self.registry.borrow_mut().retain(|slot| slot.borrow().is_some());

        if level == ReclaimLevel::Heavy {
            let entries = match std::fs::read_dir(self.scratch.path()) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot list scratch directory");
                    return;
                }
            };
            for entry in entries.flatten() {
                if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                    tracing::debug!(
                        path = %entry.path().display(),
                        error = %e,
                        "Scratch cleanup skipped"
                    );
                }
            }
        }
    }
}

impl Drop for ExternalCommandClient {
    fn drop(&mut self) {
        self.teardown_all();
    }
}

struct CommandInstance {
    command: SegmenterCommand,
    dir: PathBuf,
    model: Option<PathBuf>,
    registry: Registry,
    own: Vec<ChildSlot>,
    requests: usize,
}

impl SegmentationInstance for CommandInstance {
    fn load_model(&mut self, model: &Path) -> Pending<()> {
        let (tx, rx) = mpsc::channel();
        let path = model.to_path_buf();
        let spawned = std::thread::Builder::new()
            .name("cristae-model-load".into())
            .spawn(move || {
                let result = match std::fs::read(&path) {
                    Ok(bytes) if bytes.is_empty() => Err(format!("{} is empty", path.display())),
                    Ok(_) => Ok(()),
                    Err(e) => Err(format!("{}: {e}", path.display())),
                };
                // receiver may already be gone after a timeout
                let _ = tx.send(result);
            });

        match spawned {
            Ok(_) => {
                self.model = Some(model.to_path_buf());
                Pending::new(Stage::LoadModel, Box::new(ChannelOperation { rx }))
            }
            Err(e) => Pending::failed(Stage::LoadModel, format!("loader thread: {e}")),
        }
    }

    fn compute_probability(&mut self, image: &DynamicImage) -> Pending<DynamicImage> {
        let stage = Stage::ComputeProbability;
        let Some(model) = self.model.clone() else {
            return Pending::failed(stage, "no model loaded");
        };

        self.requests += 1;
        let input = self.dir.join(format!("input-{}.png", self.requests));
        let output = self.dir.join(format!("output-{}.png", self.requests));

        let mut bytes = Vec::new();
        if let Err(e) = image.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png) {
            return Pending::failed(stage, format!("encode input: {e}"));
        }
        if let Err(e) = std::fs::write(&input, &bytes) {
            return Pending::failed(stage, format!("{}: {e}", input.display()));
        }

        let args = self.command.render_args(&model, &input, &output);
        let child = match Command::new(&self.command.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return Pending::failed(
                    stage,
                    format!("spawn {}: {e}", self.command.program.display()),
                )
            }
        };
        tracing::debug!(pid = child.id(), input = %input.display(), "Classifier process spawned");

        let slot: ChildSlot = Rc::new(RefCell::new(Some(child)));
        self.registry.borrow_mut().push(slot.clone());
        self.own.push(slot.clone());

        Pending::new(stage, Box::new(ChildOperation { slot, output }))
    }

    fn shutdown(&mut self) {
        for slot in self.own.drain(..) {
            if let Some(child) = slot.borrow_mut().take() {
                kill_and_reap(child);
            }
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            tracing::debug!(
                path = %self.dir.display(),
                error = %e,
                "Instance directory not removed"
            );
        }
    }
}

/// Result delivered once over a channel by a worker thread.
struct ChannelOperation<T> {
    rx: Receiver<Result<T, String>>,
}

impl<T> AsyncOperation<T> for ChannelOperation<T> {
    fn poll(&mut self) -> HandleState<T> {
        match self.rx.try_recv() {
            Ok(Ok(value)) => HandleState::Ready(value),
            Ok(Err(reason)) => HandleState::Failed(reason),
            Err(TryRecvError::Empty) => HandleState::Pending,
            Err(TryRecvError::Disconnected) => {
                HandleState::Failed("worker exited without a result".into())
            }
        }
    }

    fn cancel(&mut self) {}
}

/// A classifier process writing one probability image.
struct ChildOperation {
    slot: ChildSlot,
    output: PathBuf,
}

impl AsyncOperation<DynamicImage> for ChildOperation {
    fn poll(&mut self) -> HandleState<DynamicImage> {
        let mut guard = self.slot.borrow_mut();
        let Some(child) = guard.as_mut() else {
            return HandleState::Failed("process was torn down".into());
        };
        let status = match child.try_wait() {
            Ok(Some(status)) => status,
            Ok(None) => return HandleState::Pending,
            Err(e) => return HandleState::Failed(format!("wait: {e}")),
        };
        *guard = None;

        if !status.success() {
            return HandleState::Failed(format!("classifier exited with {status}"));
        }
        match image::open(&self.output) {
            Ok(image) => HandleState::Ready(image),
            Err(e) => HandleState::Failed(format!("{}: {e}", self.output.display())),
        }
    }

    fn cancel(&mut self) {
        if let Some(child) = self.slot.borrow_mut().take() {
            kill_and_reap(child);
        }
    }
}

fn kill_and_reap(mut child: Child) {
    if let Err(e) = child.kill() {
        tracing::debug!(pid = child.id(), error = %e, "Kill failed (already exited?)");
    }
    let _ = child.wait();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use image::GenericImageView;
    use std::time::Duration;

    fn shell(script: &str) -> SegmenterCommand {
        SegmenterCommand {
            program: PathBuf::from("/bin/sh"),
            args: vec![
                "-c".into(),
                script.into(),
                "sh".into(),
                "{model}".into(),
                "{input}".into(),
                "{output}".into(),
            ],
        }
    }

    fn model_file(dir: &Path) -> PathBuf {
        let path = dir.join("model.ilp");
        std::fs::write(&path, b"project").unwrap();
        path
    }

    fn gray(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(image::GrayImage::new(width, height))
    }

    fn wait<T: 'static>(handle: Pending<T>, ms: u64) -> Result<T, SegmentationError> {
        handle.wait(Duration::from_millis(ms), Duration::from_millis(5), |_| {})
    }

    #[test]
    fn copy_command_produces_probability() {
        let dir = tempfile::tempdir().unwrap();
        let model = model_file(dir.path());
        let mut client = ExternalCommandClient::new(shell("cp \"$2\" \"$3\"")).unwrap();

        let mut instance = client.start_instance().unwrap();
        wait(instance.load_model(&model), 5_000).unwrap();
        let output = wait(instance.compute_probability(&gray(6, 4)), 5_000).unwrap();
        assert_eq!((output.width(), output.height()), (6, 4));
        instance.shutdown();
        assert_eq!(client.live_processes(), 0);
    }

    #[test]
    fn missing_model_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = ExternalCommandClient::new(shell("true")).unwrap();
        let mut instance = client.start_instance().unwrap();
        let err = wait(instance.load_model(&dir.path().join("absent.ilp")), 5_000).unwrap_err();
        assert!(matches!(err, SegmentationError::LoadFailed(_)));
    }

    #[test]
    fn nonzero_exit_is_compute_failure() {
        let dir = tempfile::tempdir().unwrap();
        let model = model_file(dir.path());
        let mut client = ExternalCommandClient::new(shell("exit 3")).unwrap();
        let mut instance = client.start_instance().unwrap();
        wait(instance.load_model(&model), 5_000).unwrap();
        let err = wait(instance.compute_probability(&gray(2, 2)), 5_000).unwrap_err();
        assert!(matches!(err, SegmentationError::ComputeFailed(_)));
    }

    #[test]
    fn hung_process_times_out_and_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let model = model_file(dir.path());
        let mut client = ExternalCommandClient::new(shell("sleep 30")).unwrap();
        let mut instance = client.start_instance().unwrap();
        wait(instance.load_model(&model), 5_000).unwrap();
        let err = wait(instance.compute_probability(&gray(2, 2)), 50).unwrap_err();
        assert!(matches!(err, SegmentationError::ComputeTimeout { .. }));
        assert_eq!(client.live_processes(), 0);
    }

    #[test]
    fn teardown_kills_orphaned_children() {
        let dir = tempfile::tempdir().unwrap();
        let model = model_file(dir.path());
        let mut client = ExternalCommandClient::new(shell("sleep 30")).unwrap();
        let mut instance = client.start_instance().unwrap();
        wait(instance.load_model(&model), 5_000).unwrap();
        let handle = instance.compute_probability(&gray(2, 2));
        drop(instance);

        assert_eq!(client.live_processes(), 1);
        assert_eq!(client.teardown_all(), 1);
        assert_eq!(client.live_processes(), 0);
        assert!(wait(handle, 10).is_err());

        client.reclaim(ReclaimLevel::Heavy);
        assert_eq!(std::fs::read_dir(client.scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn compute_before_load_fails() {
        let mut client = ExternalCommandClient::new(shell("true")).unwrap();
        let mut instance = client.start_instance().unwrap();
        assert!(wait(instance.compute_probability(&gray(2, 2)), 100).is_err());
    }
}
