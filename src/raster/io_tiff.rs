//! TIFF reading and writing for channel rasters and overlays.
//!
//! Channel files are single-plane grayscale TIFFs. Whatever bit depth the
//! file stores is widened (or narrowed) to 16 bits, the working depth of the
//! pipeline. Multi-plane stacks are not supported: only the first plane is
//! read.

use std::path::Path;

use image::{ImageBuffer, ImageFormat, Pixel, PixelWithColorType};

use super::{CalibratedImage, Calibration, Gray16Image};
use crate::error::QuantError;

/// Reads one channel file and attaches `calibration` to it.
///
/// # Errors
/// Returns [`QuantError::MissingInput`] if the file does not exist and
/// [`QuantError::ImageRead`] if it cannot be decoded.
pub fn read_channel(path: &Path, calibration: Calibration) -> Result<CalibratedImage, QuantError> {
    if !path.is_file() {
        return Err(QuantError::MissingInput(format!(
            "channel file {} not found",
            path.display()
        )));
    }

    let raster = image::open(path)
        .map_err(|source| QuantError::ImageRead {
            path: path.to_path_buf(),
            source,
        })?
        .into_luma16();

    Ok(CalibratedImage::new(raster, calibration))
}

/// Writes a 16-bit grayscale raster as TIFF.
pub fn write_gray16(path: &Path, raster: &Gray16Image) -> Result<(), QuantError> {
    write_tiff(path, raster)
}

/// Writes any raster the TIFF encoder supports.
pub fn write_tiff<P>(path: &Path, raster: &ImageBuffer<P, Vec<P::Subpixel>>) -> Result<(), QuantError>
where
    P: Pixel + PixelWithColorType,
    [P::Subpixel]: image::EncodableLayout,
{
    raster
        .save_with_format(path, ImageFormat::Tiff)
        .map_err(|source| QuantError::ImageWrite {
            path: path.to_path_buf(),
            source,
        })
}
