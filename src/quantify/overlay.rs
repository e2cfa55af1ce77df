//! Overlay rendering for visual checks of a segmentation.

use image::{ImageBuffer, Rgb};

use crate::error::QuantError;
use crate::population::LabeledObjectPopulation;
use crate::raster::CalibratedImage;

/// 16-bit RGB overlay raster.
pub type OverlayImage = ImageBuffer<Rgb<u16>, Vec<u16>>;

/// Renders kept objects over the nucleus channel.
///
/// Red is empty, green carries the object labels (saturating at
/// `u16::MAX`) and blue the nucleus intensities.
pub fn render_overlay(
    population: &LabeledObjectPopulation,
    nucleus: &CalibratedImage,
) -> Result<OverlayImage, QuantError> {
    if population.dimensions() != nucleus.dimensions() {
        let (pw, ph) = population.dimensions();
        let (nw, nh) = nucleus.dimensions();
        return Err(QuantError::DimensionMismatch(format!(
            "overlay objects are {}x{} but the nucleus channel is {}x{}",
            pw, ph, nw, nh
        )));
    }

    let (width, height) = nucleus.dimensions();
    let mut overlay = OverlayImage::from_fn(width, height, |x, y| {
        Rgb([0, 0, nucleus.raster().get_pixel(x, y)[0]])
    });
    for object in population.iter() {
        let green = u16::try_from(object.label()).unwrap_or(u16::MAX);
        for &(x, y) in object.pixels() {
            overlay.get_pixel_mut(x, y)[1] = green;
        }
    }
    Ok(overlay)
}
