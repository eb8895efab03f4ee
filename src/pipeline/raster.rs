//! Single-channel probability maps and line profiles.
//!
//! The classifier may hand back any colour layout; only the first channel
//! (probability of the target class) is kept. 8-bit rasters stay on the
//! 0–255 scale, 16-bit rasters are normalised to 0–1.

use image::{DynamicImage, GenericImageView, ImageBuffer, Luma, Pixel};
use serde::{Deserialize, Serialize};

use crate::models::Line;

/// Native value range of a probability map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbabilityScale {
    /// 0–255 (8-bit export).
    Byte,
    /// 0–1 (16-bit or floating-point export).
    Unit,
}

impl ProbabilityScale {
    pub fn max_value(self) -> f64 {
        match self {
            Self::Byte => 255.0,
            Self::Unit => 1.0,
        }
    }

    /// Convert a threshold given on the 8-bit scale to this scale.
    pub fn native_threshold(self, byte_threshold: f64) -> f64 {
        byte_threshold * self.max_value() / 255.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMap {
    width: u32,
    height: u32,
    scale: ProbabilityScale,
    data: Vec<f32>,
}

impl ProbabilityMap {
    /// Row-major samples; `data.len()` must equal `width * height`.
    pub fn new(
        width: u32,
        height: u32,
        scale: ProbabilityScale,
        data: Vec<f32>,
    ) -> Result<Self, String> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(format!(
                "{width}x{height} map needs {expected} samples, got {}",
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            scale,
            data,
        })
    }

    /// Reduce an arbitrary raster to its first channel.
    pub fn from_image(image: &DynamicImage) -> Self {
        let (width, height) = image.dimensions();
        let (scale, data) = match image {
            DynamicImage::ImageLuma8(b) => (ProbabilityScale::Byte, first_channel(b, f32::from)),
            DynamicImage::ImageLumaA8(b) => (ProbabilityScale::Byte, first_channel(b, f32::from)),
            DynamicImage::ImageRgb8(b) => (ProbabilityScale::Byte, first_channel(b, f32::from)),
            DynamicImage::ImageRgba8(b) => (ProbabilityScale::Byte, first_channel(b, f32::from)),
            DynamicImage::ImageLuma16(b) => (ProbabilityScale::Unit, first_channel(b, u16_unit)),
            DynamicImage::ImageLumaA16(b) => (ProbabilityScale::Unit, first_channel(b, u16_unit)),
            DynamicImage::ImageRgb16(b) => (ProbabilityScale::Unit, first_channel(b, u16_unit)),
            DynamicImage::ImageRgba16(b) => (ProbabilityScale::Unit, first_channel(b, u16_unit)),
            #[allow(unreachable_patterns)]
            other => (ProbabilityScale::Byte, first_channel(&other.to_luma8(), f32::from)),
        };
        Self {
            width,
            height,
            scale,
            data,
        }
    }

    /// Encode for storage: L8 for byte maps, L16 for unit maps.
    pub fn to_image(&self) -> DynamicImage {
        match self.scale {
            ProbabilityScale::Byte => {
                let buffer = ImageBuffer::from_fn(self.width, self.height, |x, y| {
                    Luma([self.value(x, y).round().clamp(0.0, 255.0) as u8])
                });
                DynamicImage::ImageLuma8(buffer)
            }
            ProbabilityScale::Unit => {
                let buffer = ImageBuffer::from_fn(self.width, self.height, |x, y| {
                    Luma([(self.value(x, y).clamp(0.0, 1.0) * 65535.0).round() as u16])
                });
                DynamicImage::ImageLuma16(buffer)
            }
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn scale(&self) -> ProbabilityScale {
        self.scale
    }

    pub fn value(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Bilinear sample; coordinates outside the map are clamped to its edge.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let max_x = f64::from(self.width - 1);
        let max_y = f64::from(self.height - 1);
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);

        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - f64::from(x0);
        let fy = y - f64::from(y0);

        let lerp = |a: f32, b: f32| f64::from(a) * (1.0 - fx) + f64::from(b) * fx;
        let top = lerp(self.value(x0, y0), self.value(x1, y0));
        let bottom = lerp(self.value(x0, y1), self.value(x1, y1));
        top * (1.0 - fy) + bottom * fy
    }

    /// Both endpoints finite and within `[0, width] x [0, height]`.
    pub fn covers(&self, line: &Line) -> bool {
        let (w, h) = (f64::from(self.width), f64::from(self.height));
        let inside = |x: f64, y: f64| (0.0..=w).contains(&x) && (0.0..=h).contains(&y);
        inside(line.x1, line.y1) && inside(line.x2, line.y2)
    }

    /// Intensity profile along `line`: round(length) steps, both endpoints
    /// included. A zero-length line gives a single sample.
    ///
    /// Lines that do not lie on the map are clipped to its diagonal length
    /// so the sample count stays bounded; callers check [`Self::covers`]
    /// first.
    pub fn profile(&self, line: &Line) -> Vec<f64> {
        let diagonal = f64::from(self.width).hypot(f64::from(self.height));
        let length = line.length();
        if !length.is_finite() {
            return Vec::new();
        }
        let steps = length.min(diagonal).round() as usize;
        if steps == 0 {
            return vec![self.sample(line.x1, line.y1)];
        }
        (0..=steps)
            .map(|i| {
                let (x, y) = line.point_at(i as f64 / steps as f64);
                self.sample(x, y)
            })
            .collect()
    }
}

fn u16_unit(v: u16) -> f32 {
    f32::from(v) / 65535.0
}

fn first_channel<P, F>(buffer: &ImageBuffer<P, Vec<P::Subpixel>>, convert: F) -> Vec<f32>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
    F: Fn(P::Subpixel) -> f32,
{
    buffer.pixels().map(|p| convert(p.channels()[0])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Rgb, RgbImage};

    fn ramp(width: u32, height: u32) -> ProbabilityMap {
        let data = (0..height)
            .flat_map(|_| (0..width).map(|x| x as f32 * 10.0))
            .collect();
        ProbabilityMap::new(width, height, ProbabilityScale::Byte, data).unwrap()
    }

    #[test]
    fn new_rejects_wrong_length() {
        assert!(ProbabilityMap::new(2, 2, ProbabilityScale::Byte, vec![0.0; 3]).is_err());
    }

    #[test]
    fn multi_channel_keeps_first_channel() {
        let img = RgbImage::from_fn(3, 2, |x, _| Rgb([x as u8 * 100, 7, 9]));
        let map = ProbabilityMap::from_image(&DynamicImage::ImageRgb8(img));
        assert_eq!(map.dimensions(), (3, 2));
        assert_eq!(map.scale(), ProbabilityScale::Byte);
        assert_eq!(map.value(2, 1), 200.0);
        assert_eq!(map.value(0, 0), 0.0);
    }

    #[test]
    fn sixteen_bit_maps_are_unit_scale() {
        let buffer = ImageBuffer::from_fn(2, 1, |x, _| Luma([if x == 0 { 0u16 } else { 65535 }]));
        let map = ProbabilityMap::from_image(&DynamicImage::ImageLuma16(buffer));
        assert_eq!(map.scale(), ProbabilityScale::Unit);
        assert_eq!(map.value(1, 0), 1.0);
    }

    #[test]
    fn byte_map_survives_encoding() {
        let gray = GrayImage::from_fn(4, 3, |x, y| Luma([(x * 40 + y) as u8]));
        let map = ProbabilityMap::from_image(&DynamicImage::ImageLuma8(gray));
        let back = ProbabilityMap::from_image(&map.to_image());
        assert_eq!(back, map);
    }

    #[test]
    fn native_threshold_conversion() {
        assert_eq!(ProbabilityScale::Byte.native_threshold(128.0), 128.0);
        assert!((ProbabilityScale::Unit.native_threshold(255.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn bilinear_sample_interpolates() {
        let map = ramp(5, 2);
        assert!((map.sample(1.5, 0.0) - 15.0).abs() < 1e-9);
        assert!((map.sample(-3.0, 0.0) - 0.0).abs() < 1e-9);
        assert!((map.sample(99.0, 5.0) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn horizontal_profile_has_length_plus_one_samples() {
        let map = ramp(11, 3);
        let profile = map.profile(&Line::new(0.0, 1.0, 10.0, 1.0));
        assert_eq!(profile.len(), 11);
        assert!((profile[0] - 0.0).abs() < 1e-9);
        assert!((profile[10] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn zero_length_profile_is_single_sample() {
        let map = ramp(4, 4);
        assert_eq!(map.profile(&Line::new(2.0, 2.0, 2.0, 2.0)), vec![20.0]);
    }

    #[test]
    fn covers_accepts_edges_and_rejects_outside() {
        let map = ramp(4, 4);
        assert!(map.covers(&Line::new(0.0, 0.0, 4.0, 4.0)));
        assert!(!map.covers(&Line::new(0.0, 0.0, 4.5, 1.0)));
        assert!(!map.covers(&Line::new(-0.1, 0.0, 1.0, 1.0)));
        assert!(!map.covers(&Line::new(f64::NAN, 0.0, 1.0, 1.0)));
    }

    #[test]
    fn huge_line_profile_is_bounded() {
        let map = ramp(4, 4);
        let profile = map.profile(&Line::new(0.0, 0.0, 1.0e15, 0.0));
        // round(hypot(4, 4)) steps.
        assert_eq!(profile.len(), 7);
        assert!(map.profile(&Line::new(0.0, 0.0, f64::INFINITY, 0.0)).is_empty());
    }
}
