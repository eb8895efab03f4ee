//! Durable stores: region catalog, per-region artifacts and the results table.
//!
//! Every file is written through [`write_atomic`], so a crash leaves either
//! the previous version or the complete new one on disk, never a torn file.

pub mod artifacts;
pub mod catalog;
pub mod results;

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config;

pub use artifacts::{ArtifactMetadata, ArtifactStore, RegionArtifacts};
pub use catalog::{ImageExtent, RegionCatalog};
pub use results::ResultStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Atomic replace failed: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Malformed results table, line {line}: {reason}")]
    MalformedCsv { line: usize, reason: String },

    #[error("Malformed metadata record {}: {reason}", .path.display())]
    MalformedMetadata { path: PathBuf, reason: String },

    #[error("Artifact mismatch for {name}: {reason}")]
    ArtifactMismatch { name: String, reason: String },

    #[error("Duplicate label in results table: {0}")]
    DuplicateLabel(String),
}

/// Replace `path` with `bytes` via a temp file in the same directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

/// Paths of everything under one output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join(config::RAW_DIR)
    }

    pub fn probability_dir(&self) -> PathBuf {
        self.root.join(config::PROBABILITY_DIR)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(config::METADATA_DIR)
    }

    pub fn raw_path(&self, name: &str) -> PathBuf {
        self.raw_dir().join(format!("{name}.png"))
    }

    pub fn probability_path(&self, name: &str) -> PathBuf {
        self.probability_dir().join(format!("{name}.png"))
    }

    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.metadata_dir().join(format!("{name}.txt"))
    }

    pub fn catalog_backup(&self) -> PathBuf {
        self.root.join(config::CATALOG_BACKUP_FILE)
    }

    pub fn results_autosave(&self) -> PathBuf {
        self.root.join(config::RESULTS_AUTOSAVE_FILE)
    }

    /// Create the three sibling artifact directories.
    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        for dir in [self.raw_dir(), self.probability_dir(), self.metadata_dir()] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Fails if the root cannot be created or written to.
    pub fn check_writable(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.root)?;
        let probe = tempfile::NamedTempFile::new_in(&self.root)?;
        probe.close()?;
        Ok(())
    }
}
