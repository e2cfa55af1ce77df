//! Size and intensity filters.
//!
//! Both filters are pure: they return a new population whose survivors are
//! relabeled `1..=N` in their original order. Applying the same filter twice
//! gives the same result as applying it once.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::LabeledObjectPopulation;
use crate::error::QuantError;
use crate::raster::CalibratedImage;

/// Inclusive calibrated area range an object must fall into.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AreaBounds {
    pub min_area: f64,
    pub max_area: f64,
}

impl AreaBounds {
    pub fn new(min_area: f64, max_area: f64) -> Self {
        Self { min_area, max_area }
    }

    #[inline]
    pub fn contains(&self, area: f64) -> bool {
        area >= self.min_area && area <= self.max_area
    }

    /// Returns an error unless `0 <= min <= max` and both are finite.
    pub fn validate(&self) -> Result<(), QuantError> {
        if !(self.min_area.is_finite() && self.max_area.is_finite()) {
            return Err(QuantError::Configuration(format!(
                "area bounds must be finite, got [{}, {}]",
                self.min_area, self.max_area
            )));
        }
        if self.min_area < 0.0 || self.min_area > self.max_area {
            return Err(QuantError::Configuration(format!(
                "invalid area bounds [{}, {}]",
                self.min_area, self.max_area
            )));
        }
        Ok(())
    }
}

/// Keeps objects whose calibrated area lies within `bounds`.
pub fn filter_by_size(
    population: &LabeledObjectPopulation,
    bounds: AreaBounds,
) -> LabeledObjectPopulation {
    let kept = population.retain_relabeled(|o| bounds.contains(population.area_of(o)));
    debug!(
        before = population.len(),
        after = kept.len(),
        min_area = bounds.min_area,
        max_area = bounds.max_area,
        "size filter"
    );
    kept
}

/// Keeps objects whose mean value in `intensity` is at least `min_mean`.
///
/// # Errors
/// Returns [`QuantError::DimensionMismatch`] if `intensity` does not have the
/// population's dimensions.
pub fn filter_by_intensity(
    population: &LabeledObjectPopulation,
    intensity: &CalibratedImage,
    min_mean: f64,
) -> Result<LabeledObjectPopulation, QuantError> {
    if intensity.dimensions() != population.dimensions() {
        let (pw, ph) = population.dimensions();
        let (iw, ih) = intensity.dimensions();
        return Err(QuantError::DimensionMismatch(format!(
            "intensity image is {}x{} but objects live on a {}x{} grid",
            iw, ih, pw, ph
        )));
    }

    let mut keep = Vec::with_capacity(population.len());
    for object in population.iter() {
        keep.push(object.mean_intensity(intensity.raster())? >= min_mean);
    }

    let mut verdicts = keep.into_iter();
    let kept = population.retain_relabeled(|_| verdicts.next().unwrap_or(false));
    debug!(
        before = population.len(),
        after = kept.len(),
        min_mean,
        "intensity filter"
    );
    Ok(kept)
}

/// Size filter followed by intensity filter.
///
/// Survivors carry contiguous labels `1..=N`.
pub fn filter_population(
    population: &LabeledObjectPopulation,
    bounds: AreaBounds,
    intensity: &CalibratedImage,
    min_mean: f64,
) -> Result<LabeledObjectPopulation, QuantError> {
    let sized = filter_by_size(population, bounds);
    filter_by_intensity(&sized, intensity, min_mean)
}
