//! Per-ROI quantification.
//!
//! [`quantify_roi`] runs the whole pipeline for one (image, ROI) pair:
//! both channels are cropped to the ROI, nuclei are estimated on one,
//! marker cells are segmented and filtered on the other, and the counts
//! are combined with the ROI area into a [`ResultRecord`].

pub mod overlay;
mod report;

pub use overlay::{render_overlay, OverlayImage};
pub use report::{ResultRecord, ResultSink, RESULT_HEADER};

use tracing::debug;

use crate::config::ValidatedRunConfig;
use crate::error::QuantError;
use crate::nuclei::estimate_nuclei_count;
use crate::population::{filter_by_intensity, filter_by_size, AreaBounds, LabeledObjectPopulation};
use crate::raster::{prepare_channel, CalibratedImage, Roi};
use crate::segmentation::{SegmentationBackend, Segmenter};

/// Calibrated area of `roi` clipped to `image`.
///
/// # Errors
/// Returns [`QuantError::DimensionMismatch`] if the ROI does not overlap the
/// raster at all.
pub fn roi_area(roi: &Roi, image: &CalibratedImage) -> Result<f64, QuantError> {
    let (width, height) = image.dimensions();
    let pixels = roi.rasterize(width, height).pixel_count();
    if pixels == 0 {
        return Err(QuantError::DimensionMismatch(format!(
            "ROI '{}' covers no pixel of the {}x{} raster",
            roi.name(),
            width,
            height
        )));
    }
    Ok(image.calibration().area_of(pixels))
}

/// Thresholds applied to every (image, ROI) pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuantifyParams {
    pub mean_nucleus_area: f64,
    pub cell_bounds: AreaBounds,
    pub min_cell_intensity: f64,
    pub render_overlay: bool,
}

impl From<&ValidatedRunConfig> for QuantifyParams {
    fn from(config: &ValidatedRunConfig) -> Self {
        Self {
            mean_nucleus_area: config.mean_nucleus_area(),
            cell_bounds: config.cell_area_bounds(),
            min_cell_intensity: config.min_cell_intensity(),
            render_overlay: config.config().overlay,
        }
    }
}

/// Everything produced for one (image, ROI) pair.
#[derive(Debug)]
pub struct RoiOutcome {
    pub record: ResultRecord,
    /// Marker cells that survived filtering, in crop coordinates.
    pub cells: LabeledObjectPopulation,
    pub overlay: Option<OverlayImage>,
}

/// Quantifies `roi` on a pair of full-frame channels.
///
/// # Errors
/// Fails if the channels differ in size, the ROI misses them entirely, or
/// segmentation fails. None of these concern other ROIs.
pub fn quantify_roi<B: SegmentationBackend>(
    image_name: &str,
    nucleus: &CalibratedImage,
    marker: &CalibratedImage,
    roi: &Roi,
    params: &QuantifyParams,
    segmenter: &Segmenter<B>,
) -> Result<RoiOutcome, QuantError> {
    if nucleus.dimensions() != marker.dimensions() {
        return Err(QuantError::DimensionMismatch(format!(
            "nucleus channel is {:?} but marker channel is {:?}",
            nucleus.dimensions(),
            marker.dimensions()
        )));
    }

    let (nucleus_crop, local_roi) = prepare_channel(nucleus, roi)?;
    let area = roi_area(&local_roi, &nucleus_crop)?;
    let nuclei = estimate_nuclei_count(&nucleus_crop, &local_roi, params.mean_nucleus_area)?;

    let (marker_crop, _) = prepare_channel(marker, roi)?;
    let detected = segmenter.segment(&marker_crop, &local_roi)?;
    let sized = filter_by_size(&detected, params.cell_bounds);
    drop(detected);
    let cells = filter_by_intensity(&sized, &marker_crop, params.min_cell_intensity)?;
    drop(sized);
    drop(marker_crop);

    debug!(
        image = image_name,
        roi = roi.name(),
        area,
        nuclei,
        cells = cells.len(),
        "quantified"
    );

    let overlay = if params.render_overlay {
        Some(render_overlay(&cells, &nucleus_crop)?)
    } else {
        None
    };

    Ok(RoiOutcome {
        record: ResultRecord {
            image: image_name.to_string(),
            roi: roi.name().to_string(),
            roi_area: area,
            nuclei,
            marker_cells: cells.len() as u64,
        },
        cells,
        overlay,
    })
}
