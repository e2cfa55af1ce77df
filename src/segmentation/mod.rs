//! Orchestration of the external instance segmenter.
//!
//! The segmenter itself is a black box that reads every `.tif` in a
//! directory and writes a `<stem>_cp_masks.tif` label mask next to each one.
//! [`Segmenter`] prepares that directory, runs a [`SegmentationBackend`] on
//! it and turns the mask back into a [`LabeledObjectPopulation`] at the
//! original scale.
//!
//! # Protocol
//!
//! 1. Pixels outside the ROI are zeroed on a private copy.
//! 2. Rasters larger than [`MAX_SEGMENTATION_DIM`] on either side are
//!    halved (nearest neighbour).
//! 3. A fresh scratch directory is created (stale ones are swept first).
//! 4. The raster is saved as `<stem>.tif` and the backend runs.
//! 5. `<stem>_cp_masks.tif` is decoded, upsampled back if needed and turned
//!    into a population carrying the input's calibration.
//! 6. The scratch directory is deleted on every exit path.

mod labels;
mod process;
mod scratch;
mod settings;

#[cfg(feature = "fuzzing")]
pub use labels::fuzz_decode_label_mask;
pub use labels::read_label_mask;
pub use process::{run_command, CellposeCli, DRAIN_GRACE};
pub use scratch::{create_scratch_dir, SCRATCH_PREFIX, STALE_AFTER};
pub use settings::{
    CellposeVersion, CommandLine, EnvKind, SegmentationConfig, ValidatedSegmentationConfig,
};

use std::path::{Path, PathBuf};

use image::{ImageBuffer, Pixel};
use tracing::{debug, info};

use crate::error::QuantError;
use crate::population::LabeledObjectPopulation;
use crate::raster::io_tiff::write_gray16;
use crate::raster::{CalibratedImage, Roi};

/// Rasters with a side longer than this are downsampled before segmentation.
pub const MAX_SEGMENTATION_DIM: u32 = 1024;

/// Scale applied to oversized rasters.
pub const DOWNSAMPLE_FACTOR: f64 = 0.5;

/// Suffix the segmenter appends to the input stem for its label mask.
pub const MASK_SUFFIX: &str = "_cp_masks.tif";

/// Something that segments every TIFF in a directory.
///
/// Implementations write `<stem>_cp_masks.tif` for each `<stem>.tif` they
/// process. Returning `Ok` does not promise that a mask was written.
pub trait SegmentationBackend {
    fn run(&self, dir: &Path) -> Result<(), QuantError>;
}

impl<B: SegmentationBackend + ?Sized> SegmentationBackend for &B {
    fn run(&self, dir: &Path) -> Result<(), QuantError> {
        (**self).run(dir)
    }
}

/// Runs one segmentation per (image, ROI).
#[derive(Debug)]
pub struct Segmenter<B = CellposeCli> {
    backend: B,
    scratch_root: PathBuf,
}

impl Segmenter<CellposeCli> {
    /// A segmenter backed by a real Cellpose installation.
    pub fn cellpose(config: ValidatedSegmentationConfig) -> Self {
        let scratch_root = config.scratch_root();
        Self {
            backend: CellposeCli::new(config),
            scratch_root,
        }
    }
}

impl<B: SegmentationBackend> Segmenter<B> {
    pub fn with_backend(backend: B, scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            scratch_root: scratch_root.into(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Segments the part of `image` inside `roi`.
    ///
    /// # Errors
    /// - [`QuantError::DimensionMismatch`] if `roi` misses `image` entirely
    ///   or the mask has unexpected dimensions
    /// - [`QuantError::ExternalProcess`] if the backend could not run
    /// - [`QuantError::MissingOutput`] if no mask was written
    pub fn segment(
        &self,
        image: &CalibratedImage,
        roi: &Roi,
    ) -> Result<LabeledObjectPopulation, QuantError> {
        let (width, height) = image.dimensions();
        roi.check_overlaps(width, height)?;

        let masked = image.cleared_outside(roi).into_raster();
        let (sent, downsampled) = if width.max(height) > MAX_SEGMENTATION_DIM {
            let w = ((width as f64 * DOWNSAMPLE_FACTOR) as u32).max(1);
            let h = ((height as f64 * DOWNSAMPLE_FACTOR) as u32).max(1);
            debug!(from = ?(width, height), to = ?(w, h), "downsampling for segmentation");
            (resize_nearest(&masked, w, h), true)
        } else {
            (masked, false)
        };

        let scratch = create_scratch_dir(&self.scratch_root)?;
        let stem = file_stem_for(roi.name());
        write_gray16(&scratch.path().join(format!("{}.tif", stem)), &sent)?;
        let sent_dims = sent.dimensions();
        drop(sent);

        self.backend.run(scratch.path())?;

        let labels = read_label_mask(&scratch.path().join(format!("{}{}", stem, MASK_SUFFIX)))?;
        if labels.dimensions() != sent_dims {
            return Err(QuantError::DimensionMismatch(format!(
                "label mask is {}x{} but {}x{} was segmented",
                labels.width(),
                labels.height(),
                sent_dims.0,
                sent_dims.1
            )));
        }
        let labels = if downsampled {
            resize_nearest(&labels, width, height)
        } else {
            labels
        };

        let population = LabeledObjectPopulation::from_label_image(&labels, image.calibration());
        info!(roi = roi.name(), objects = population.len(), "segmented");
        Ok(population)
    }
}

/// Nearest-neighbour resampling that never blends values, so labels
/// survive unchanged.
pub fn resize_nearest<P: Pixel>(
    source: &ImageBuffer<P, Vec<P::Subpixel>>,
    width: u32,
    height: u32,
) -> ImageBuffer<P, Vec<P::Subpixel>> {
    let (sw, sh) = source.dimensions();
    if sw == 0 || sh == 0 {
        return ImageBuffer::new(width, height);
    }
    ImageBuffer::from_fn(width, height, |x, y| {
        let sx = (x as u64 * sw as u64 / width as u64) as u32;
        let sy = (y as u64 * sh as u64 / height as u64) as u32;
        *source.get_pixel(sx.min(sw - 1), sy.min(sh - 1))
    })
}

/// File stem for a ROI name: characters outside `[A-Za-z0-9_-]` become `_`.
pub(crate) fn file_stem_for(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "roi".to_string()
    } else {
        stem
    }
}
