use std::path::PathBuf;
use thiserror::Error;

/// The main error type for roiquant operations.
///
/// Variants fall into two groups. Per-item failures (missing inputs,
/// segmenter failures, decode errors) abort only the current (image, ROI)
/// pair; see [`QuantError::is_batch_fatal`] for the ones that end a run.
#[derive(Debug, Error)]
pub enum QuantError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Failed to parse configuration from {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Segmenter process {program} failed: {message}")]
    ExternalProcess { program: String, message: String },

    #[error("Segmenter produced no label image at {path}")]
    MissingOutput { path: PathBuf },

    #[error("Failed to write results to {path}: {source}")]
    ResultSink {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write image {path}: {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to decode label image {path}: {message}")]
    LabelDecode { path: PathBuf, message: String },

    #[error("Invalid ROI '{name}': {message}")]
    InvalidRoi { name: String, message: String },

    #[error("Failed to parse ROI file {path}: {message}")]
    RoiParse { path: PathBuf, message: String },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl QuantError {
    /// Returns true for errors that must abort the remaining batch.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            QuantError::Configuration(_)
                | QuantError::ConfigParse { .. }
                | QuantError::ResultSink { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(QuantError::Configuration("bad env".into()).is_batch_fatal());
        assert!(!QuantError::MissingInput("no roi".into()).is_batch_fatal());
        assert!(!QuantError::MissingOutput {
            path: PathBuf::from("x_cp_masks.tif")
        }
        .is_batch_fatal());
    }
}
