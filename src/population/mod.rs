//! Labeled object populations.
//!
//! A [`LabeledObjectPopulation`] is the set of objects found in one label
//! raster: every distinct non-zero pixel value becomes one
//! [`LabeledObject`]. Objects are kept in ascending order of the label they
//! were read with, and that order is what "original relative order" means
//! when survivors of a filter are relabeled.
//!
//! Populations are values: filtering builds a new population and never
//! touches its input.

mod filter;
mod object;

pub use filter::{filter_by_intensity, filter_by_size, filter_population, AreaBounds};
pub use object::{LabeledObject, PixelBounds};

use std::collections::{BTreeMap, HashSet};

use image::Luma;

use crate::error::QuantError;
use crate::raster::{Calibration, LabelImage};

/// All objects detected in one raster, plus the calibration of that raster.
#[derive(Clone, Debug, PartialEq)]
pub struct LabeledObjectPopulation {
    objects: Vec<LabeledObject>,
    calibration: Calibration,
    width: u32,
    height: u32,
}

impl LabeledObjectPopulation {
    /// Builds a population from explicit objects.
    ///
    /// # Errors
    /// Fails if a label is 0, a label repeats, or an object pixel lies
    /// outside the `width × height` grid.
    pub fn new(
        objects: Vec<LabeledObject>,
        calibration: Calibration,
        width: u32,
        height: u32,
    ) -> Result<Self, QuantError> {
        let mut seen = HashSet::with_capacity(objects.len());
        for object in &objects {
            if object.label() == 0 {
                return Err(QuantError::DimensionMismatch(
                    "object label 0 is reserved for background".into(),
                ));
            }
            if !seen.insert(object.label()) {
                return Err(QuantError::DimensionMismatch(format!(
                    "duplicate object label {}",
                    object.label()
                )));
            }
            if let Some(bounds) = object.bounds() {
                if bounds.x_max >= width || bounds.y_max >= height {
                    return Err(QuantError::DimensionMismatch(format!(
                        "object {} extends to ({}, {}) outside the {}x{} grid",
                        object.label(),
                        bounds.x_max,
                        bounds.y_max,
                        width,
                        height
                    )));
                }
            }
        }

        Ok(Self {
            objects,
            calibration,
            width,
            height,
        })
    }

    /// Builds a population from a label raster.
    ///
    /// Labels keep their raster values; objects are ordered by label.
    pub fn from_label_image(labels: &LabelImage, calibration: Calibration) -> Self {
        let mut pixels_by_label: BTreeMap<u32, Vec<(u32, u32)>> = BTreeMap::new();
        for (x, y, pixel) in labels.enumerate_pixels() {
            let label = pixel[0];
            if label != 0 {
                pixels_by_label.entry(label).or_default().push((x, y));
            }
        }

        let objects = pixels_by_label
            .into_iter()
            .map(|(label, pixels)| LabeledObject::new(label, pixels))
            .collect();

        Self {
            objects,
            calibration,
            width: labels.width(),
            height: labels.height(),
        }
    }

    /// An empty population over a `width × height` grid.
    pub fn empty(calibration: Calibration, width: u32, height: u32) -> Self {
        Self {
            objects: Vec::new(),
            calibration,
            width,
            height,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects in population order.
    pub fn objects(&self) -> &[LabeledObject] {
        &self.objects
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabeledObject> {
        self.objects.iter()
    }

    /// Labels in population order.
    pub fn labels(&self) -> Vec<u32> {
        self.objects.iter().map(LabeledObject::label).collect()
    }

    #[inline]
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Grid dimensions `(width, height)` the objects live on.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Calibrated area of `object` in this population's units.
    #[inline]
    pub fn area_of(&self, object: &LabeledObject) -> f64 {
        self.calibration.area_of(object.pixel_count())
    }

    /// Returns true if labels are exactly `1..=len` in population order.
    pub fn is_contiguous(&self) -> bool {
        self.objects
            .iter()
            .enumerate()
            .all(|(i, o)| o.label() as usize == i + 1)
    }

    /// Keeps the objects for which `keep` returns true and relabels the
    /// survivors `1..=N` in their current order.
    pub(crate) fn retain_relabeled(&self, mut keep: impl FnMut(&LabeledObject) -> bool) -> Self {
        let objects = self
            .objects
            .iter()
            .filter(|o| keep(o))
            .enumerate()
            .map(|(i, o)| o.relabeled(i as u32 + 1))
            .collect();

        Self {
            objects,
            calibration: self.calibration,
            width: self.width,
            height: self.height,
        }
    }

    /// Renders the population back into a label raster.
    pub fn to_label_image(&self) -> LabelImage {
        let mut image = LabelImage::new(self.width, self.height);
        for object in &self.objects {
            for &(x, y) in object.pixels() {
                image.put_pixel(x, y, Luma([object.label()]));
            }
        }
        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_label_image_groups_by_value() {
        let mut labels = LabelImage::new(6, 4);
        labels.put_pixel(0, 0, Luma([7]));
        labels.put_pixel(1, 0, Luma([7]));
        labels.put_pixel(5, 3, Luma([2]));
        labels.put_pixel(3, 2, Luma([40]));

        let population = LabeledObjectPopulation::from_label_image(&labels, Calibration::unit());
        assert_eq!(population.labels(), vec![2, 7, 40]);
        assert_eq!(population.objects()[1].pixel_count(), 2);
        assert_eq!(population.dimensions(), (6, 4));
        assert!(!population.is_contiguous());
    }

    #[test]
    fn test_label_image_roundtrip() {
        let mut labels = LabelImage::new(5, 5);
        labels.put_pixel(1, 1, Luma([3]));
        labels.put_pixel(4, 4, Luma([9]));
        let population = LabeledObjectPopulation::from_label_image(&labels, Calibration::unit());
        assert_eq!(population.to_label_image(), labels);
    }

    #[test]
    fn test_new_rejects_duplicates_and_out_of_grid() {
        let a = LabeledObject::new(1, vec![(0, 0)]);
        let b = LabeledObject::new(1, vec![(1, 1)]);
        assert!(LabeledObjectPopulation::new(vec![a.clone(), b], Calibration::unit(), 4, 4).is_err());

        let far = LabeledObject::new(2, vec![(10, 0)]);
        assert!(LabeledObjectPopulation::new(vec![a.clone(), far], Calibration::unit(), 4, 4).is_err());

        let zero = LabeledObject::new(0, vec![(0, 0)]);
        assert!(LabeledObjectPopulation::new(vec![zero], Calibration::unit(), 4, 4).is_err());

        assert!(LabeledObjectPopulation::new(vec![a], Calibration::unit(), 4, 4).is_ok());
    }
}
