//! Fuzz target for GeoJSON ROI parsing.
//!
//! Feeds arbitrary bytes to the ROI set parser and, for every ROI that
//! parses, rasterizes it onto a small grid.
//!
//! Run with:
//!   cargo +nightly fuzz run roi_geojson_parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use roiquant::raster::io_geojson::from_geojson_slice;

fuzz_target!(|data: &[u8]| {
    // ROI files are small; skip huge inputs.
    if data.len() > 1024 * 1024 {
        return;
    }

    if let Ok(rois) = from_geojson_slice(data) {
        for roi in &rois {
            let _ = roi.rasterize(64, 64);
        }
    }
});
