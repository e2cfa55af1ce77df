//! Run configuration.
//!
//! A [`RunConfig`] is read from an optional YAML file, patched with command
//! line overrides and then validated once into a [`ValidatedRunConfig`],
//! which is what the batch consumes. Every field has a default, so an empty
//! file (or no file) is a complete configuration.
//!
//! ```yaml
//! pixel_size: 0.1625
//! mean_nucleus_area: 50
//! min_cell_area: 20
//! max_cell_area: 100
//! min_cell_intensity: 200
//! segmentation:
//!   model: cyto
//!   diameter: 25
//!   env_path: /opt/miniconda3/envs/cellpose
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::QuantError;
use crate::population::AreaBounds;
use crate::raster::Calibration;
use crate::segmentation::{SegmentationConfig, ValidatedSegmentationConfig};

/// Default name of the output directory, created next to the images.
pub const DEFAULT_OUTPUT_DIR: &str = "Results";

/// Everything a batch run can be configured with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Side of a (square) pixel in µm.
    pub pixel_size: f64,

    /// Area of an average nucleus in µm².
    pub mean_nucleus_area: f64,

    /// Smallest marker cell kept, in µm².
    pub min_cell_area: f64,

    /// Largest marker cell kept, in µm².
    pub max_cell_area: f64,

    /// Minimum mean marker intensity of a kept cell.
    pub min_cell_intensity: f64,

    /// Extension (without dot) of the file marking one image.
    pub image_extension: String,

    /// Suffix appended to the image root to find the nucleus channel.
    pub nucleus_suffix: String,

    /// Suffix appended to the image root to find the marker channel.
    pub marker_suffix: String,

    /// Extension (without dot) of the ROI set next to each image.
    pub roi_extension: String,

    /// Output directory; `Results/` inside the image directory when unset.
    pub output_dir: Option<PathBuf>,

    /// Write an overlay TIFF for every (image, ROI).
    pub overlay: bool,

    pub segmentation: SegmentationConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            pixel_size: 0.1625,
            mean_nucleus_area: 50.0,
            min_cell_area: 20.0,
            max_cell_area: 100.0,
            min_cell_intensity: 200.0,
            image_extension: "nd".to_string(),
            nucleus_suffix: "_w1CSU_405_t1.tif".to_string(),
            marker_suffix: "_w4CSU_642_t1.tif".to_string(),
            roi_extension: "geojson".to_string(),
            output_dir: None,
            overlay: true,
            segmentation: SegmentationConfig::default(),
        }
    }
}

impl RunConfig {
    /// Reads a configuration file.
    ///
    /// # Errors
    /// Returns [`QuantError::MissingInput`] if the file does not exist and
    /// [`QuantError::ConfigParse`] if it is not valid YAML for this type.
    pub fn from_yaml_file(path: &Path) -> Result<Self, QuantError> {
        if !path.is_file() {
            return Err(QuantError::MissingInput(format!(
                "config file {} not found",
                path.display()
            )));
        }
        let text = fs::read_to_string(path)?;
        Self::parse_yaml(&text, path)
    }

    /// Parses a configuration from a YAML string.
    pub fn from_yaml_str(text: &str) -> Result<Self, QuantError> {
        Self::parse_yaml(text, Path::new("<string>"))
    }

    fn parse_yaml(text: &str, path: &Path) -> Result<Self, QuantError> {
        // an empty document is "all defaults", not an error
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|source| QuantError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks every value once, before any image is touched.
    pub fn validate(self) -> Result<ValidatedRunConfig, QuantError> {
        let calibration = Calibration::isotropic(self.pixel_size);
        if !calibration.is_valid() {
            return Err(QuantError::Configuration(format!(
                "pixel size must be positive, got {}",
                self.pixel_size
            )));
        }
        if !(self.mean_nucleus_area.is_finite() && self.mean_nucleus_area > 0.0) {
            return Err(QuantError::Configuration(format!(
                "mean nucleus area must be positive, got {}",
                self.mean_nucleus_area
            )));
        }
        let bounds = AreaBounds::new(self.min_cell_area, self.max_cell_area);
        bounds.validate()?;
        if !self.min_cell_intensity.is_finite() {
            return Err(QuantError::Configuration(
                "minimum cell intensity must be finite".into(),
            ));
        }
        for (name, value) in [
            ("image_extension", &self.image_extension),
            ("nucleus_suffix", &self.nucleus_suffix),
            ("marker_suffix", &self.marker_suffix),
            ("roi_extension", &self.roi_extension),
        ] {
            if value.is_empty() {
                return Err(QuantError::Configuration(format!("{} is empty", name)));
            }
        }
        if self.nucleus_suffix == self.marker_suffix {
            return Err(QuantError::Configuration(
                "nucleus and marker channels use the same suffix".into(),
            ));
        }

        let segmentation = self.segmentation.clone().validate()?;
        Ok(ValidatedRunConfig {
            config: self,
            calibration,
            bounds,
            segmentation,
        })
    }
}

/// A configuration that passed [`RunConfig::validate`].
#[derive(Clone, Debug)]
pub struct ValidatedRunConfig {
    config: RunConfig,
    calibration: Calibration,
    bounds: AreaBounds,
    segmentation: ValidatedSegmentationConfig,
}

impl ValidatedRunConfig {
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn cell_area_bounds(&self) -> AreaBounds {
        self.bounds
    }

    pub fn mean_nucleus_area(&self) -> f64 {
        self.config.mean_nucleus_area
    }

    pub fn min_cell_intensity(&self) -> f64 {
        self.config.min_cell_intensity
    }

    pub fn segmentation(&self) -> &ValidatedSegmentationConfig {
        &self.segmentation
    }

    /// Output directory for a batch over `image_dir`.
    pub fn output_dir(&self, image_dir: &Path) -> PathBuf {
        self.config
            .output_dir
            .clone()
            .unwrap_or_else(|| image_dir.join(DEFAULT_OUTPUT_DIR))
    }
}
