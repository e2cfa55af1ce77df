//! Density-based nucleus counting.
//!
//! Nuclei are not segmented one by one. The nucleus channel is smoothed,
//! binarized with Otsu's method, cleaned with a median filter and restricted
//! to the ROI; the calibrated foreground area divided by the area of an
//! average nucleus gives the count. Touching and overlapping nuclei are
//! therefore handled for free, at the cost of per-object measurements.

mod otsu;

pub use otsu::{otsu_level_u16, Histogram256};

use image::{GrayImage, Luma};
use imageproc::filter::{gaussian_blur_f32, median_filter};
use tracing::debug;

use crate::error::QuantError;
use crate::raster::{CalibratedImage, Roi};

/// Standard deviation (px) of the denoising Gaussian.
pub const GAUSSIAN_SIGMA: f32 = 4.0;

/// Radius (px) of the square median filter applied to the binary mask.
pub const MEDIAN_RADIUS: u32 = 4;

const FOREGROUND: u8 = 255;

/// Estimates the number of nuclei inside `roi`.
///
/// `mean_nucleus_area` is in the same calibrated units as the image
/// (µm² for µm pixels). An image without foreground yields 0.
///
/// # Errors
/// Returns [`QuantError::DimensionMismatch`] if `roi` misses the raster entirely
/// and [`QuantError::Configuration`] for a non-positive mean area.
pub fn estimate_nuclei_count(
    image: &CalibratedImage,
    roi: &Roi,
    mean_nucleus_area: f64,
) -> Result<u64, QuantError> {
    if !(mean_nucleus_area.is_finite() && mean_nucleus_area > 0.0) {
        return Err(QuantError::Configuration(format!(
            "mean nucleus area must be positive, got {}",
            mean_nucleus_area
        )));
    }

    let area = foreground_area(image, roi)?;
    let count = nuclei_count_from_area(area, mean_nucleus_area);
    debug!(roi = roi.name(), area, count, "estimated nuclei");
    Ok(count)
}

/// Converts a calibrated foreground area into a nucleus count.
///
/// Non-decreasing in `area`; rounds half away from zero.
#[inline]
pub fn nuclei_count_from_area(area: f64, mean_nucleus_area: f64) -> u64 {
    if area <= 0.0 {
        return 0;
    }
    (area / mean_nucleus_area).round() as u64
}

/// Calibrated area of the nucleus foreground inside `roi`.
pub fn foreground_area(image: &CalibratedImage, roi: &Roi) -> Result<f64, QuantError> {
    let mask = foreground_mask(image, roi)?;
    let pixels = mask.pixels().filter(|p| p[0] == FOREGROUND).count() as u64;
    Ok(image.calibration().area_of(pixels))
}

/// Binary nucleus mask (255 = foreground) restricted to `roi`.
pub fn foreground_mask(image: &CalibratedImage, roi: &Roi) -> Result<GrayImage, QuantError> {
    let (width, height) = image.dimensions();
    roi.check_overlaps(width, height)?;

    let smoothed = gaussian_blur_f32(image.raster(), GAUSSIAN_SIGMA);
    let histogram = Histogram256::of(&smoothed);
    let binary = match otsu_level_u16(&histogram) {
        Some(level) => GrayImage::from_fn(width, height, |x, y| {
            if histogram.bin_of(smoothed.get_pixel(x, y)[0]) > level {
                Luma([FOREGROUND])
            } else {
                Luma([0])
            }
        }),
        // flat image: nothing stands out from the background
        None => GrayImage::new(width, height),
    };
    drop(smoothed);

    let mut cleaned = median_filter(&binary, MEDIAN_RADIUS, MEDIAN_RADIUS);
    let inside = roi.rasterize(width, height);
    for (x, y, pixel) in cleaned.enumerate_pixels_mut() {
        if !inside.contains(x, y) {
            pixel[0] = 0;
        }
    }
    Ok(cleaned)
}
