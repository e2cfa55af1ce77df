//! Calibrated rasters and regions of interest.
//!
//! This module defines the values every pipeline stage exchanges: a 16-bit
//! single-channel raster paired with its physical [`Calibration`], and a
//! named polygonal [`Roi`] expressed in the same pixel coordinates.
//!
//! # Design Principles
//!
//! 1. **Explicit calibration**: the pixel size travels with the raster as an
//!    immutable value instead of living in shared mutable state, so every
//!    measurement can be traced back to the scale it used.
//!
//! 2. **Owned buffers**: a stage takes or borrows a [`CalibratedImage`] and
//!    returns fresh buffers; nothing is retained across stage boundaries.
//!
//! 3. **Thin I/O**: reading channel TIFFs and ROI sets is deliberately
//!    minimal. The pipeline only needs a cropped raster and a boundary.
//!
//! # Example
//!
//! ```
//! use roiquant::raster::{Calibration, CalibratedImage, Gray16Image, Roi, prepare_channel};
//!
//! let full = CalibratedImage::new(Gray16Image::new(64, 64), Calibration::isotropic(0.5));
//! let roi = Roi::new("cortex", vec![(10.0, 10.0), (30.0, 10.0), (30.0, 40.0), (10.0, 40.0)])?;
//! let (crop, local_roi) = prepare_channel(&full, &roi)?;
//! assert_eq!(crop.dimensions(), (20, 30));
//! assert_eq!(local_roi.name(), "cortex");
//! # Ok::<(), roiquant::QuantError>(())
//! ```

mod calibrated;
mod calibration;
pub mod io_geojson;
pub mod io_tiff;
mod roi;

use image::{ImageBuffer, Luma};

// Re-export core types for convenient access
pub use calibrated::{prepare_channel, CalibratedImage};
pub use calibration::Calibration;
pub use roi::{Roi, RoiMask};

/// A single-channel 16-bit raster, the native depth of the channel files.
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

/// A label raster: each pixel holds the label of the object it belongs to,
/// or 0 for background.
pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;
