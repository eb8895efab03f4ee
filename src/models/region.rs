use serde::{Deserialize, Serialize};

use super::geometry::BoundingBox;

/// A named region of interest, in source-image coordinates.
///
/// `area` is only present when the region was measured upstream (for
/// example a freehand outline); otherwise the bounding box area is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
}

impl Region {
    pub fn new(name: &str, x: i64, y: i64, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            x,
            y,
            width,
            height,
            area: None,
        }
    }

    pub fn with_area(mut self, area: f64) -> Self {
        self.area = Some(area);
        self
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(self.x, self.y, self.width, self.height)
    }

    /// Area in px², measured if known, otherwise width × height.
    pub fn area_px(&self) -> f64 {
        self.area
            .unwrap_or_else(|| f64::from(self.width) * f64::from(self.height))
    }

    pub fn is_degenerate(&self) -> bool {
        let area = self.area_px();
        self.width == 0 || self.height == 0 || !area.is_finite() || area <= 0.0
    }
}

/// Region names double as artifact file stems and CSV labels.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name is empty".into());
    }
    if name != name.trim() {
        return Err(format!("name {name:?} has leading or trailing whitespace"));
    }
    if name == "." || name == ".." {
        return Err(format!("name {name:?} is reserved"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| matches!(c, '/' | '\\' | ':') || c.is_control())
    {
        return Err(format!("name {name:?} contains forbidden character {c:?}"));
    }
    Ok(())
}
