//! ROI sets stored as GeoJSON feature collections.
//!
//! This is the format QuPath exports annotations in: one feature per region,
//! the geometry in image pixel coordinates (y pointing down) and an optional
//! `name` property.
//!
//! # Naming Policy
//!
//! - Named features keep their name verbatim.
//! - Unnamed features are called `ROI<n>`, `n` being the 1-based position
//!   in the file.
//!
//! ROIs are returned in file order, which is the order rows appear in the
//! results file.

use std::fs::read_to_string;
use std::path::Path;

use geo::Area;
use serde::Deserialize;

use super::Roi;
use crate::error::QuantError;

/// Parts of a multi-polygon smaller than this (in px²) are treated as
/// stray clicks and dropped.
const MIN_PART_AREA: f64 = 16.0;

#[derive(Deserialize)]
struct NamedFeature {
    #[serde(deserialize_with = "geojson::de::deserialize_geometry")]
    geometry: geo_types::Geometry<f64>,
    #[serde(default)]
    name: Option<String>,
}

/// Reads every ROI from a GeoJSON file.
///
/// # Errors
/// Returns [`QuantError::MissingInput`] if the file does not exist and
/// [`QuantError::RoiParse`] if it is not a feature collection of polygons.
pub fn read_roi_set(path: &Path) -> Result<Vec<Roi>, QuantError> {
    if !path.is_file() {
        return Err(QuantError::MissingInput(format!(
            "ROI file {} not found",
            path.display()
        )));
    }
    let text = read_to_string(path)?;
    parse_roi_set(&text, path)
}

/// Parses ROIs from a GeoJSON string.
///
/// Useful for testing without file I/O.
pub fn from_geojson_str(text: &str) -> Result<Vec<Roi>, QuantError> {
    parse_roi_set(text, Path::new("<string>"))
}

/// Parses ROIs from raw bytes.
///
/// Useful for fuzzing; invalid UTF-8 is reported as a parse error.
pub fn from_geojson_slice(bytes: &[u8]) -> Result<Vec<Roi>, QuantError> {
    let path = Path::new("<bytes>");
    let text = std::str::from_utf8(bytes).map_err(|e| QuantError::RoiParse {
        path: path.to_path_buf(),
        message: format!("invalid UTF-8: {}", e),
    })?;
    parse_roi_set(text, path)
}

fn parse_roi_set(text: &str, path: &Path) -> Result<Vec<Roi>, QuantError> {
    let features: Vec<NamedFeature> =
        geojson::de::deserialize_feature_collection_str_to_vec(text).map_err(|e| {
            QuantError::RoiParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        })?;

    features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| {
            let name = feature
                .name
                .unwrap_or_else(|| format!("ROI{}", index + 1));
            let polygon = match feature.geometry {
                geo_types::Geometry::Polygon(polygon) => polygon,
                geo_types::Geometry::MultiPolygon(multi) => {
                    let mut parts: Vec<_> = multi
                        .into_iter()
                        .filter(|p| p.unsigned_area() > MIN_PART_AREA)
                        .collect();
                    if parts.len() != 1 {
                        return Err(QuantError::RoiParse {
                            path: path.to_path_buf(),
                            message: format!(
                                "ROI '{}' is a multi-polygon with {} significant parts",
                                name,
                                parts.len()
                            ),
                        });
                    }
                    parts.remove(0)
                }
                other => {
                    return Err(QuantError::RoiParse {
                        path: path.to_path_buf(),
                        message: format!("ROI '{}' has unsupported geometry {:?}", name, other),
                    })
                }
            };
            Roi::from_polygon(name, polygon)
        })
        .collect()
}
