//! Region catalog: ordered, uniquely named regions plus the source image extent.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{write_atomic, StorageError};
use crate::models::{validate_name, Region};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageExtent {
    pub width: u32,
    pub height: u32,
}

/// On-disk shape of the catalog archive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogArchive {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<ImageExtent>,
    regions: Vec<Region>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionCatalog {
    image: Option<ImageExtent>,
    regions: Vec<Region>,
    rejected: Vec<String>,
}

impl RegionCatalog {
    /// Build a catalog, rejecting malformed and duplicate names.
    /// The first occurrence of a name wins; order is otherwise preserved.
    pub fn from_regions(regions: Vec<Region>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(regions.len());
        let mut rejected = Vec::new();

        for region in regions {
            if let Err(reason) = validate_name(&region.name) {
                tracing::warn!(region = %region.name, %reason, "Rejecting malformed region name");
                rejected.push(format!("{:?}: {reason}", region.name));
                continue;
            }
            if !seen.insert(region.name.clone()) {
                tracing::warn!(region = %region.name, "Rejecting duplicate region name");
                rejected.push(format!("{:?}: duplicate name", region.name));
                continue;
            }
            kept.push(region);
        }

        Self {
            image: None,
            regions: kept,
            rejected,
        }
    }

    pub fn with_image(mut self, extent: ImageExtent) -> Self {
        self.image = Some(extent);
        self
    }

    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let text = std::fs::read_to_string(path)?;
        let archive: CatalogArchive = serde_json::from_str(&text)?;
        let mut catalog = Self::from_regions(archive.regions);
        catalog.image = archive.image;
        tracing::debug!(
            path = %path.display(),
            regions = catalog.len(),
            rejected = catalog.rejected.len(),
            "Region catalog loaded"
        );
        Ok(catalog)
    }

    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        let archive = CatalogArchive {
            image: self.image,
            regions: self.regions.clone(),
        };
        let json = serde_json::to_vec_pretty(&archive)?;
        write_atomic(path, &json)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn get(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.regions.iter().position(|r| r.name == name)
    }

    pub fn image(&self) -> Option<ImageExtent> {
        self.image
    }

    /// Human-readable reasons for entries dropped at construction.
    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
