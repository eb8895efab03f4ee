//! Crop geometry: padded, clipped bounding box plus region offset.

use thiserror::Error;

use crate::models::{BoundingBox, Region};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Region {0} has zero width, height or area")]
    ZeroSize(String),

    #[error("Region {name} lies outside the {width}x{height} source image")]
    OutsideImage {
        name: String,
        width: u32,
        height: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropGeometry {
    /// Crop rectangle in source-image coordinates.
    pub crop: BoundingBox,
    /// Region origin relative to the crop origin.
    pub offset_x: u32,
    pub offset_y: u32,
}

/// Expand the region by `padding` on every side and clip to the image.
///
/// The region itself must lie inside the image, so the offset is never
/// negative.
pub fn crop_geometry(
    region: &Region,
    padding: u32,
    image_width: u32,
    image_height: u32,
) -> Result<CropGeometry, GeometryError> {
    if region.is_degenerate() {
        return Err(GeometryError::ZeroSize(region.name.clone()));
    }

    let bounds = region.bounds();
    if bounds.x < 0
        || bounds.y < 0
        || bounds.right() > i64::from(image_width)
        || bounds.bottom() > i64::from(image_height)
    {
        return Err(GeometryError::OutsideImage {
            name: region.name.clone(),
            width: image_width,
            height: image_height,
        });
    }

    let pad = i64::from(padding);
    let left = (bounds.x - pad).max(0);
    let top = (bounds.y - pad).max(0);
    let right = (bounds.right() + pad).min(i64::from(image_width));
    let bottom = (bounds.bottom() + pad).min(i64::from(image_height));

    // all four edges are within [0, image extent] here
    Ok(CropGeometry {
        crop: BoundingBox::new(left, top, (right - left) as u32, (bottom - top) as u32),
        offset_x: (bounds.x - left) as u32,
        offset_y: (bounds.y - top) as u32,
    })
}
