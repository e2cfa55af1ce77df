//! Calibrated single-channel rasters and per-ROI channel preparation.

use image::imageops;

use super::{Calibration, Gray16Image, Roi};
use crate::error::QuantError;

/// A 16-bit raster together with the physical size of its pixels.
#[derive(Clone, Debug)]
pub struct CalibratedImage {
    raster: Gray16Image,
    calibration: Calibration,
}

impl CalibratedImage {
    /// Pairs a raster with its calibration.
    pub fn new(raster: Gray16Image, calibration: Calibration) -> Self {
        Self {
            raster,
            calibration,
        }
    }

    /// Borrows the pixel data.
    #[inline]
    pub fn raster(&self) -> &Gray16Image {
        &self.raster
    }

    /// Returns the calibration.
    #[inline]
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }

    /// Releases the pixel data.
    pub fn into_raster(self) -> Gray16Image {
        self.raster
    }

    /// Returns a copy where every pixel outside `roi` is set to 0.
    pub fn cleared_outside(&self, roi: &Roi) -> Self {
        let mask = roi.rasterize(self.width(), self.height());
        let mut raster = self.raster.clone();
        for (x, y, pixel) in raster.enumerate_pixels_mut() {
            if !mask.contains(x, y) {
                pixel[0] = 0;
            }
        }
        Self::new(raster, self.calibration)
    }
}

/// Crops a full-frame channel to the bounding box of `roi`.
///
/// Returns the cropped raster (same calibration) and the region translated
/// into crop coordinates. Fails with [`QuantError::DimensionMismatch`] when
/// the region does not overlap the raster.
pub fn prepare_channel(
    image: &CalibratedImage,
    roi: &Roi,
) -> Result<(CalibratedImage, Roi), QuantError> {
    let (width, height) = image.dimensions();
    let bbox = roi.bounding_box();

    let x0 = bbox.min().x.floor().max(0.0);
    let y0 = bbox.min().y.floor().max(0.0);
    let x1 = bbox.max().x.ceil().min(width as f64);
    let y1 = bbox.max().y.ceil().min(height as f64);

    if x1 <= x0 || y1 <= y0 {
        return Err(QuantError::DimensionMismatch(format!(
            "ROI '{}' does not overlap the {}x{} raster",
            roi.name(),
            width,
            height
        )));
    }

    let (x0, y0) = (x0 as u32, y0 as u32);
    let crop = imageops::crop_imm(image.raster(), x0, y0, x1 as u32 - x0, y1 as u32 - y0)
        .to_image();

    Ok((
        CalibratedImage::new(crop, image.calibration()),
        roi.translate(-(x0 as f64), -(y0 as f64)),
    ))
}
