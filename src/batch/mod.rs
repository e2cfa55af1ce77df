//! Batch discovery and execution.
//!
//! A batch is one directory. Every file with the configured image
//! extension (`.nd` by default) names an image; its channels and ROI set
//! are found next to it by suffix:
//!
//! ```text
//! <root>.nd                 marks the image
//! <root>_w1CSU_405_t1.tif   nucleus channel
//! <root>_w4CSU_642_t1.tif   marker channel
//! <root>.geojson            ROI set
//! ```
//!
//! Images are processed in file-name order, ROIs in file order. A failure
//! on one image or ROI is logged and recorded in the [`BatchSummary`]; only
//! errors that make the whole output untrustworthy stop the batch.

mod report;

pub use report::{BatchPlan, BatchSummary, PlanEntry, SkippedItem};

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::{RunConfig, ValidatedRunConfig};
use crate::error::QuantError;
use crate::quantify::{quantify_roi, QuantifyParams, ResultSink};
use crate::raster::io_geojson::read_roi_set;
use crate::raster::io_tiff::{read_channel, write_tiff};
use crate::raster::Roi;
use crate::segmentation::{file_stem_for, SegmentationBackend, Segmenter};

/// File name of the results table inside the output directory.
pub const RESULTS_FILE: &str = "results.tsv";

/// The files belonging to one image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchItem {
    /// Image root name (file name without the image extension).
    pub name: String,
    pub nucleus: PathBuf,
    pub marker: PathBuf,
    pub rois: PathBuf,
}

impl BatchItem {
    fn for_root(dir: &Path, name: &str, config: &RunConfig) -> Self {
        Self {
            name: name.to_string(),
            nucleus: dir.join(format!("{}{}", name, config.nucleus_suffix)),
            marker: dir.join(format!("{}{}", name, config.marker_suffix)),
            rois: dir.join(format!("{}.{}", name, config.roi_extension)),
        }
    }
}

/// Finds the images in `dir`, sorted by file name.
///
/// # Errors
/// Returns [`QuantError::MissingInput`] if `dir` is not a directory or holds
/// no image.
pub fn discover_images(dir: &Path, config: &RunConfig) -> Result<Vec<BatchItem>, QuantError> {
    if !dir.is_dir() {
        return Err(QuantError::MissingInput(format!(
            "image directory {} not found",
            dir.display()
        )));
    }

    let mut items = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| QuantError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == config.image_extension);
        if !matches_ext {
            continue;
        }
        if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
            items.push(BatchItem::for_root(dir, name, config));
        }
    }

    if items.is_empty() {
        return Err(QuantError::MissingInput(format!(
            "no .{} images in {}",
            config.image_extension,
            dir.display()
        )));
    }
    Ok(items)
}

/// Builds the dry-run report for a batch over `dir`.
pub fn plan_batch(dir: &Path, config: &ValidatedRunConfig) -> Result<BatchPlan, QuantError> {
    let items = discover_images(dir, config.config())?;
    let entries = items.iter().map(PlanEntry::inspect).collect();
    Ok(BatchPlan {
        image_dir: dir.to_path_buf(),
        output_dir: config.output_dir(dir),
        entries,
    })
}

/// Runs the full batch over `dir` and writes the results table.
///
/// # Errors
/// Fails only for batch-level problems: no images, an unusable output
/// directory, a failed write to the results table, or any error for which
/// [`QuantError::is_batch_fatal`] holds. Rows written before the failure stay
/// on disk.
pub fn run_batch<B: SegmentationBackend>(
    dir: &Path,
    config: &ValidatedRunConfig,
    segmenter: &Segmenter<B>,
) -> Result<BatchSummary, QuantError> {
    let items = discover_images(dir, config.config())?;
    let output_dir = config.output_dir(dir);
    fs::create_dir_all(&output_dir).map_err(|e| QuantError::ResultSink {
        path: output_dir.clone(),
        source: e.into(),
    })?;
    let results_path = output_dir.join(RESULTS_FILE);
    let mut sink = ResultSink::create(&results_path)?;
    let params = QuantifyParams::from(config);

    info!(images = items.len(), output = %output_dir.display(), "starting batch");
    let mut summary = BatchSummary::new(results_path);

    for item in &items {
        summary.images += 1;
        if let Err(e) = run_image(item, config, &params, segmenter, &output_dir, &mut sink, &mut summary) {
            if e.is_batch_fatal() {
                return Err(e);
            }
            warn!(image = %item.name, error = %e, "skipping image");
            summary.skip(&item.name, None, &e);
        }
    }

    summary.rows_written = sink.rows();
    info!(rows = summary.rows_written, skipped = summary.skipped.len(), "batch finished");
    Ok(summary)
}

/// Processes every ROI of one image. Errors returned from here concern the
/// whole image; per-ROI failures are recorded in `summary`.
fn run_image<B: SegmentationBackend>(
    item: &BatchItem,
    config: &ValidatedRunConfig,
    params: &QuantifyParams,
    segmenter: &Segmenter<B>,
    output_dir: &Path,
    sink: &mut ResultSink,
    summary: &mut BatchSummary,
) -> Result<(), QuantError> {
    let rois = read_roi_set(&item.rois)?;
    if rois.is_empty() {
        return Err(QuantError::MissingInput(format!(
            "ROI file {} holds no region",
            item.rois.display()
        )));
    }
    let nucleus = read_channel(&item.nucleus, config.calibration())?;
    let marker = read_channel(&item.marker, config.calibration())?;
    info!(image = %item.name, rois = rois.len(), "processing image");

    let overlay_names = overlay_file_names(&item.name, &rois);
    for (roi, overlay_name) in rois.iter().zip(&overlay_names) {
        match quantify_roi(&item.name, &nucleus, &marker, roi, params, segmenter) {
            Ok(outcome) => {
                sink.append(&outcome.record)?;
                if let Some(overlay) = outcome.overlay {
                    let path = output_dir.join(overlay_name);
                    if let Err(e) = write_tiff(&path, &overlay) {
                        warn!(error = %e, "could not write overlay");
                        summary.overlay_failures += 1;
                    }
                }
            }
            Err(e) if e.is_batch_fatal() => return Err(e),
            Err(e) => {
                warn!(image = %item.name, roi = roi.name(), error = %e, "skipping ROI");
                summary.skip(&item.name, Some(roi.name()), &e);
            }
        }
    }
    Ok(())
}

/// Overlay file names for the ROIs of one image, in ROI order.
///
/// Names are `<image>_<roi>.tif` with the ROI name made file-safe. When two
/// ROIs map to the same name, later ones get `_2`, `_3`, ... appended.
pub fn overlay_file_names(image: &str, rois: &[Roi]) -> Vec<String> {
    let mut taken = HashSet::new();
    rois.iter()
        .map(|roi| {
            let base = format!("{}_{}", image, file_stem_for(roi.name()));
            let mut name = base.clone();
            let mut n = 1;
            while !taken.insert(name.clone()) {
                n += 1;
                name = format!("{}_{}", base, n);
            }
            format!("{}.tif", name)
        })
        .collect()
}
