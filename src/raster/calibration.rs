//! Physical pixel calibration.

use serde::{Deserialize, Serialize};

/// Physical size of one pixel.
///
/// Every area reported by roiquant is a pixel count multiplied by
/// [`Calibration::pixel_area`]. The value is `Copy` and never mutated once a
/// run has been configured.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Width of a pixel in microns.
    pub pixel_width: f64,

    /// Height of a pixel in microns.
    pub pixel_height: f64,
}

impl Calibration {
    /// Unit label used in reports and the results header.
    pub const UNIT: &'static str = "µm";

    /// Creates a calibration with independent pixel width and height.
    #[inline]
    pub fn new(pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            pixel_width,
            pixel_height,
        }
    }

    /// Creates a calibration with square pixels.
    #[inline]
    pub fn isotropic(pixel_size: f64) -> Self {
        Self::new(pixel_size, pixel_size)
    }

    /// Creates the identity calibration (1 pixel = 1 unit²).
    #[inline]
    pub fn unit() -> Self {
        Self::isotropic(1.0)
    }

    /// Area covered by one pixel.
    #[inline]
    pub fn pixel_area(&self) -> f64 {
        self.pixel_width * self.pixel_height
    }

    /// Converts a pixel count into calibrated area.
    #[inline]
    pub fn area_of(&self, pixel_count: u64) -> f64 {
        pixel_count as f64 * self.pixel_area()
    }

    /// Returns true if both sizes are finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        self.pixel_width.is_finite()
            && self.pixel_height.is_finite()
            && self.pixel_width > 0.0
            && self.pixel_height > 0.0
    }
}

impl Default for Calibration {
    /// 0.1625 µm square pixels (60x objective on the spinning-disk setup).
    fn default() -> Self {
        Self::isotropic(0.1625)
    }
}
