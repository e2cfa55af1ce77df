//! Batch plan and summary reports.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::BatchItem;
use crate::error::QuantError;
use crate::raster::io_geojson::read_roi_set;

/// What a batch would do, without running anything.
#[derive(Clone, Debug, Serialize)]
pub struct BatchPlan {
    pub image_dir: PathBuf,
    pub output_dir: PathBuf,
    pub entries: Vec<PlanEntry>,
}

/// Input status of one image.
#[derive(Clone, Debug, Serialize)]
pub struct PlanEntry {
    pub image: String,
    pub nucleus: PathBuf,
    pub nucleus_found: bool,
    pub marker: PathBuf,
    pub marker_found: bool,
    pub rois: PathBuf,
    /// ROI names in file order, when the set could be read.
    pub roi_names: Vec<String>,
    /// Why the ROI set could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roi_error: Option<String>,
}

impl PlanEntry {
    pub(crate) fn inspect(item: &BatchItem) -> Self {
        let (roi_names, roi_error) = match read_roi_set(&item.rois) {
            Ok(rois) => (rois.iter().map(|r| r.name().to_string()).collect(), None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };
        Self {
            image: item.name.clone(),
            nucleus: item.nucleus.clone(),
            nucleus_found: item.nucleus.is_file(),
            marker: item.marker.clone(),
            marker_found: item.marker.is_file(),
            rois: item.rois.clone(),
            roi_names,
            roi_error,
        }
    }

    /// Returns true if every input of this image is present and readable.
    pub fn is_ready(&self) -> bool {
        self.nucleus_found && self.marker_found && self.roi_error.is_none() && !self.roi_names.is_empty()
    }
}

impl BatchPlan {
    pub fn ready_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_ready()).count()
    }

    /// Number of (image, ROI) rows a fully successful run would write.
    pub fn planned_rows(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.is_ready())
            .map(|e| e.roi_names.len())
            .sum()
    }
}

impl fmt::Display for BatchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch plan for {}", self.image_dir.display())?;
        writeln!(f, "Output directory: {}", self.output_dir.display())?;
        writeln!(
            f,
            "{} image(s), {} ready, {} row(s) planned",
            self.entries.len(),
            self.ready_count(),
            self.planned_rows()
        )?;
        writeln!(f)?;

        for entry in &self.entries {
            let status = if entry.is_ready() { "ok  " } else { "FAIL" };
            writeln!(f, "  [{}] {}", status, entry.image)?;
            if !entry.nucleus_found {
                writeln!(f, "         missing nucleus channel {}", entry.nucleus.display())?;
            }
            if !entry.marker_found {
                writeln!(f, "         missing marker channel {}", entry.marker.display())?;
            }
            match &entry.roi_error {
                Some(e) => writeln!(f, "         {}", e)?,
                None => writeln!(f, "         ROIs: {}", entry.roi_names.join(", "))?,
            }
        }
        Ok(())
    }
}

/// One (image, ROI) pair, or a whole image, that produced no row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedItem {
    pub image: String,
    pub roi: Option<String>,
    pub reason: String,
}

impl fmt::Display for SkippedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.roi {
            Some(roi) => write!(f, "{} / {}: {}", self.image, roi, self.reason),
            None => write!(f, "{}: {}", self.image, self.reason),
        }
    }
}

/// Outcome of a finished batch.
#[derive(Clone, Debug, Serialize)]
pub struct BatchSummary {
    pub results_path: PathBuf,
    pub images: usize,
    pub rows_written: usize,
    pub skipped: Vec<SkippedItem>,
    pub overlay_failures: usize,
}

impl BatchSummary {
    pub(crate) fn new(results_path: PathBuf) -> Self {
        Self {
            results_path,
            images: 0,
            rows_written: 0,
            skipped: Vec::new(),
            overlay_failures: 0,
        }
    }

    pub(crate) fn skip(&mut self, image: &str, roi: Option<&str>, error: &QuantError) {
        self.skipped.push(SkippedItem {
            image: image.to_string(),
            roi: roi.map(str::to_string),
            reason: error.to_string(),
        });
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    /// Returns true if nothing was skipped.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.overlay_failures == 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Processed {} image(s): {} row(s) written to {}",
            self.images,
            self.rows_written,
            self.results_path.display()
        )?;
        if !self.skipped.is_empty() {
            writeln!(f, "Skipped {} item(s):", self.skipped.len())?;
            for item in &self.skipped {
                writeln!(f, "  {}", item)?;
            }
        }
        if self.overlay_failures > 0 {
            writeln!(f, "{} overlay(s) could not be written", self.overlay_failures)?;
        }
        Ok(())
    }
}
