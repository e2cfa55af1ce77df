use serde::{Deserialize, Serialize};

use crate::error::QuantError;
use crate::raster::Gray16Image;

/// Inclusive pixel bounds of an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBounds {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl PixelBounds {
    #[inline]
    pub fn width(&self) -> u32 {
        self.x_max - self.x_min + 1
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.y_max - self.y_min + 1
    }
}

/// One detected object: a label and the pixels carrying it.
#[derive(Clone, Debug, PartialEq)]
pub struct LabeledObject {
    label: u32,
    pixels: Vec<(u32, u32)>,
    bounds: Option<PixelBounds>,
}

impl LabeledObject {
    /// Creates an object from its `(x, y)` pixel coordinates.
    pub fn new(label: u32, pixels: Vec<(u32, u32)>) -> Self {
        let bounds = pixels.iter().fold(None, |acc: Option<PixelBounds>, &(x, y)| {
            Some(match acc {
                None => PixelBounds {
                    x_min: x,
                    y_min: y,
                    x_max: x,
                    y_max: y,
                },
                Some(b) => PixelBounds {
                    x_min: b.x_min.min(x),
                    y_min: b.y_min.min(y),
                    x_max: b.x_max.max(x),
                    y_max: b.y_max.max(y),
                },
            })
        });

        Self {
            label,
            pixels,
            bounds,
        }
    }

    #[inline]
    pub fn label(&self) -> u32 {
        self.label
    }

    #[inline]
    pub fn pixels(&self) -> &[(u32, u32)] {
        &self.pixels
    }

    #[inline]
    pub fn pixel_count(&self) -> u64 {
        self.pixels.len() as u64
    }

    /// Bounds of the object, `None` if it has no pixels.
    #[inline]
    pub fn bounds(&self) -> Option<PixelBounds> {
        self.bounds
    }

    /// Mean value of `image` over the object's pixels. An object without
    /// pixels has mean 0.
    ///
    /// # Errors
    /// Returns [`QuantError::DimensionMismatch`] if a pixel lies outside
    /// `image`.
    pub fn mean_intensity(&self, image: &Gray16Image) -> Result<f64, QuantError> {
        if self.pixels.is_empty() {
            return Ok(0.0);
        }
        let (width, height) = image.dimensions();
        let mut sum = 0u64;
        for &(x, y) in &self.pixels {
            if x >= width || y >= height {
                return Err(QuantError::DimensionMismatch(format!(
                    "object {} pixel ({}, {}) is outside the {}x{} intensity image",
                    self.label, x, y, width, height
                )));
            }
            sum += image.get_pixel(x, y)[0] as u64;
        }
        Ok(sum as f64 / self.pixels.len() as f64)
    }

    pub(crate) fn relabeled(&self, label: u32) -> Self {
        Self {
            label,
            pixels: self.pixels.clone(),
            bounds: self.bounds,
        }
    }
}
