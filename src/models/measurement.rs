use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::region::validate_name;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasurementError {
    #[error("invalid label: {0}")]
    Label(String),

    #[error("area must be finite and positive, got {0}")]
    Area(f64),

    #[error("count must be a non-negative 32-bit integer, got {0}")]
    Count(i64),

    #[error("line length must be finite and non-negative, got {0}")]
    Length(f64),
}

/// One row of the results table.
///
/// Density is never stored: it is derived from count and area on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub label: String,
    pub area_px2: f64,
    pub count: u32,
    pub line_length_px: f64,
}

impl Measurement {
    /// Build a validated row. `count` is signed so that user-edited values
    /// can be rejected here instead of being clamped.
    pub fn new(
        label: &str,
        area_px2: f64,
        count: i64,
        line_length_px: f64,
    ) -> Result<Self, MeasurementError> {
        validate_name(label).map_err(MeasurementError::Label)?;
        if !area_px2.is_finite() || area_px2 <= 0.0 {
            return Err(MeasurementError::Area(area_px2));
        }
        let count = u32::try_from(count).map_err(|_| MeasurementError::Count(count))?;
        if !line_length_px.is_finite() || line_length_px < 0.0 {
            return Err(MeasurementError::Length(line_length_px));
        }
        Ok(Self {
            label: label.to_string(),
            area_px2,
            count,
            line_length_px,
        })
    }

    /// Zero row recorded for a skipped region.
    pub fn skipped(label: &str, area_px2: f64) -> Result<Self, MeasurementError> {
        Self::new(label, area_px2, 0, 0.0)
    }

    /// Crossings per 1000 px².
    pub fn density(&self) -> f64 {
        f64::from(self.count) * 1000.0 / self.area_px2
    }
}
