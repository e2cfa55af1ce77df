//! Otsu thresholding for 16-bit rasters.
//!
//! `imageproc::contrast::otsu_level` only handles 8-bit images, so 16-bit
//! data is binned into 256 bins spanning its own min..max range first.

use crate::raster::Gray16Image;

const BINS: usize = 256;

/// A 256-bin intensity histogram over the value range of one image.
#[derive(Clone, Debug)]
pub struct Histogram256 {
    counts: [u64; BINS],
    min: u16,
    max: u16,
}

impl Histogram256 {
    /// Builds the histogram of `image`.
    pub fn of(image: &Gray16Image) -> Self {
        let (min, max) = image
            .pixels()
            .fold((u16::MAX, u16::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));

        let mut histogram = Self {
            counts: [0; BINS],
            min,
            max,
        };
        for p in image.pixels() {
            let bin = histogram.bin_of(p[0]);
            histogram.counts[bin] += 1;
        }
        histogram
    }

    /// Bin that `value` falls into. Values outside the range are clamped.
    #[inline]
    pub fn bin_of(&self, value: u16) -> usize {
        if self.max <= self.min {
            return 0;
        }
        let value = value.clamp(self.min, self.max);
        let offset = (value - self.min) as u64 * (BINS as u64 - 1);
        (offset / (self.max - self.min) as u64) as usize
    }

    #[inline]
    pub fn counts(&self) -> &[u64; BINS] {
        &self.counts
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Smallest and largest value seen, if the image was non-empty.
    pub fn range(&self) -> Option<(u16, u16)> {
        (self.total() > 0).then_some((self.min, self.max))
    }
}

/// Otsu's threshold as a bin index: bins `<= level` are background.
///
/// Returns `None` when the image is empty or flat, i.e. when there is no
/// split that separates two classes.
pub fn otsu_level_u16(histogram: &Histogram256) -> Option<usize> {
    let total = histogram.total() as f64;
    match histogram.range() {
        Some((min, max)) if max > min => {}
        _ => return None,
    }

    let sum: f64 = histogram
        .counts()
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_b = 0.0;
    let mut weight_b = 0.0;
    let mut max_variance = 0.0;
    let mut level = None;

    for (i, &count) in histogram.counts().iter().enumerate() {
        weight_b += count as f64;
        if weight_b == 0.0 {
            continue;
        }
        let weight_f = total - weight_b;
        if weight_f == 0.0 {
            break;
        }

        sum_b += i as f64 * count as f64;
        let mean_b = sum_b / weight_b;
        let mean_f = (sum - sum_b) / weight_f;
        let variance = weight_b * weight_f * (mean_b - mean_f).powi(2);

        if variance > max_variance {
            max_variance = variance;
            level = Some(i);
        }
    }

    level
}
