//! Per-region artifact triples: raw crop, probability map, metadata record.
//!
//! A region counts as complete when both rasters exist. The probability map
//! is written last, so its presence implies the other two files.

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, GenericImageView, ImageOutputFormat};

use super::{write_atomic, OutputLayout, StorageError};
use crate::pipeline::raster::ProbabilityMap;

// ═══════════════════════════════════════════
// Metadata record
// ═══════════════════════════════════════════

/// Crop-space placement of a region, stored as `key=value` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactMetadata {
    pub offset_x: u32,
    pub offset_y: u32,
    pub roi_width: u32,
    pub roi_height: u32,
    pub roi_index: usize,
}

impl ArtifactMetadata {
    pub fn to_record(&self) -> String {
        format!(
            "offset_x={}\noffset_y={}\nroi_width={}\nroi_height={}\nroi_index={}\n",
            self.offset_x, self.offset_y, self.roi_width, self.roi_height, self.roi_index
        )
    }

    /// Parse a record. Unknown keys and blank lines are ignored; every
    /// known key must be present exactly once.
    pub fn parse(text: &str, path: &Path) -> Result<Self, StorageError> {
        let malformed = |reason: String| StorageError::MalformedMetadata {
            path: path.to_path_buf(),
            reason,
        };

        let mut fields: [Option<u64>; 5] = [None; 5];
        const KEYS: [&str; 5] = ["offset_x", "offset_y", "roi_width", "roi_height", "roi_index"];

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| malformed(format!("expected key=value, got {line:?}")))?;
            let Some(slot) = KEYS.iter().position(|k| *k == key.trim()) else {
                continue;
            };
            if fields[slot].is_some() {
                return Err(malformed(format!("duplicate key {}", KEYS[slot])));
            }
            let parsed = value
                .trim()
                .parse::<u64>()
                .map_err(|e| malformed(format!("{}: {e}", KEYS[slot])))?;
            fields[slot] = Some(parsed);
        }

        let mut values = [0u64; 5];
        for (slot, field) in fields.iter().enumerate() {
            values[slot] = field.ok_or_else(|| malformed(format!("missing key {}", KEYS[slot])))?;
        }

        let narrow = |slot: usize| {
            u32::try_from(values[slot])
                .map_err(|_| malformed(format!("{} out of range", KEYS[slot])))
        };
        Ok(Self {
            offset_x: narrow(0)?,
            offset_y: narrow(1)?,
            roi_width: narrow(2)?,
            roi_height: narrow(3)?,
            roi_index: usize::try_from(values[4])
                .map_err(|_| malformed("roi_index out of range".into()))?,
        })
    }
}

// ═══════════════════════════════════════════
// Store
// ═══════════════════════════════════════════

/// A loaded, mutually consistent artifact triple.
#[derive(Debug, Clone)]
pub struct RegionArtifacts {
    pub raw: DynamicImage,
    pub probability: ProbabilityMap,
    pub metadata: ArtifactMetadata,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    layout: OutputLayout,
}

impl ArtifactStore {
    pub fn open(root: impl AsRef<Path>) -> Self {
        Self {
            layout: OutputLayout::new(root.as_ref()),
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn ensure_layout(&self) -> Result<(), StorageError> {
        self.layout.check_writable()?;
        self.layout.ensure_dirs()
    }

    /// True iff both the raw crop and the probability map exist.
    pub fn is_complete(&self, name: &str) -> bool {
        self.layout.raw_path(name).is_file() && self.layout.probability_path(name).is_file()
    }

    /// Write a triple. Order: raw, metadata, probability (completion marker).
    pub fn write(
        &self,
        name: &str,
        raw: &DynamicImage,
        probability: &ProbabilityMap,
        metadata: &ArtifactMetadata,
    ) -> Result<(), StorageError> {
        if raw.width() != probability.width() || raw.height() != probability.height() {
            return Err(StorageError::ArtifactMismatch {
                name: name.to_string(),
                reason: format!(
                    "raw crop is {}x{}, probability map is {}x{}",
                    raw.width(),
                    raw.height(),
                    probability.width(),
                    probability.height()
                ),
            });
        }

        write_atomic(&self.layout.raw_path(name), &encode_png(raw)?)?;
        write_atomic(
            &self.layout.metadata_path(name),
            metadata.to_record().as_bytes(),
        )?;
        write_atomic(
            &self.layout.probability_path(name),
            &encode_png(&probability.to_image())?,
        )?;

        let (width, height) = raw.dimensions();
        tracing::debug!(region = name, width, height, "Artifacts written");
        Ok(())
    }

    /// Load a triple. `Ok(None)` when the region is not complete.
    pub fn load(&self, name: &str) -> Result<Option<RegionArtifacts>, StorageError> {
        if !self.is_complete(name) {
            return Ok(None);
        }

        let metadata_path = self.layout.metadata_path(name);
        let text = std::fs::read_to_string(&metadata_path).map_err(|e| {
            StorageError::MalformedMetadata {
                path: metadata_path.clone(),
                reason: e.to_string(),
            }
        })?;
        let metadata = ArtifactMetadata::parse(&text, &metadata_path)?;

        let raw = image::open(self.layout.raw_path(name))?;
        let probability =
            ProbabilityMap::from_image(&image::open(self.layout.probability_path(name))?);

        if (raw.width(), raw.height()) != probability.dimensions() {
            return Err(StorageError::ArtifactMismatch {
                name: name.to_string(),
                reason: format!(
                    "raw crop is {}x{}, probability map is {}x{}",
                    raw.width(),
                    raw.height(),
                    probability.width(),
                    probability.height()
                ),
            });
        }

        Ok(Some(RegionArtifacts {
            raw,
            probability,
            metadata,
        }))
    }
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)?;
    Ok(bytes)
}
