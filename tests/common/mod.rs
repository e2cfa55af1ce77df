#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use image::Luma;
use roiquant::raster::io_tiff::write_gray16;
use roiquant::raster::Gray16Image;

pub const NUCLEUS_SUFFIX: &str = "_w1CSU_405_t1.tif";
pub const MARKER_SUFFIX: &str = "_w4CSU_642_t1.tif";

/// A square cell of constant intensity on the marker channel.
#[derive(Clone, Copy, Debug)]
pub struct Block {
    pub x: u32,
    pub y: u32,
    pub side: u32,
    pub value: u16,
}

/// Marker cells inside the `ok` ROI of [`write_image_set`]:
/// two survive the default filters (area 20..=100, mean >= 200).
pub const MARKER_BLOCKS: [Block; 5] = [
    // 25 px, bright: kept
    Block { x: 30, y: 30, side: 5, value: 300 },
    // 16 px: too small
    Block { x: 45, y: 30, side: 4, value: 350 },
    // 36 px, dim: dropped by intensity
    Block { x: 60, y: 30, side: 6, value: 150 },
    // 64 px, bright: kept
    Block { x: 30, y: 60, side: 8, value: 500 },
    // 144 px: too large
    Block { x: 60, y: 60, side: 12, value: 600 },
];

/// Rectangular ROI `(name, x0, y0, x1, y1)` in pixel corner coordinates.
pub type RectRoi<'a> = (&'a str, f64, f64, f64, f64);

pub fn write_channel(path: &Path, width: u32, height: u32, f: impl Fn(u32, u32) -> u16) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    let raster = Gray16Image::from_fn(width, height, |x, y| Luma([f(x, y)]));
    write_gray16(path, &raster).expect("write channel tiff");
}

pub fn geojson_for(rois: &[RectRoi<'_>]) -> String {
    let features: Vec<String> = rois
        .iter()
        .map(|(name, x0, y0, x1, y1)| {
            format!(
                r#"{{"type":"Feature","geometry":{{"type":"Polygon","coordinates":[[[{x0},{y0}],[{x1},{y0}],[{x1},{y1}],[{x0},{y1}],[{x0},{y0}]]]}},"properties":{{"name":"{name}"}}}}"#
            )
        })
        .collect();
    format!(
        r#"{{"type":"FeatureCollection","features":[{}]}}"#,
        features.join(",")
    )
}

pub fn write_rois(path: &Path, rois: &[RectRoi<'_>]) {
    fs::write(path, geojson_for(rois)).expect("write geojson");
}

/// Writes `<name>.nd`, both channels (200 x 200) and a ROI set.
///
/// The nucleus channel is bright left of x = 70, dark right of it. The
/// marker channel carries [`MARKER_BLOCKS`].
pub fn write_image_set(dir: &Path, name: &str, rois: &[RectRoi<'_>]) {
    fs::write(dir.join(format!("{name}.nd")), b"NDInfoFile\n").expect("write nd");
    write_channel(&dir.join(format!("{name}{NUCLEUS_SUFFIX}")), 200, 200, |x, _| {
        if x < 70 {
            4000
        } else {
            100
        }
    });
    write_channel(&dir.join(format!("{name}{MARKER_SUFFIX}")), 200, 200, |x, y| {
        MARKER_BLOCKS
            .iter()
            .find(|b| x >= b.x && x < b.x + b.side && y >= b.y && y < b.y + b.side)
            .map_or(0, |b| b.value)
    });
    write_rois(&dir.join(format!("{name}.geojson")), rois);
}

/// How the fake segmenter behaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FakeSegmenter {
    /// Copies every input to its mask: each distinct intensity is one
    /// object. Inputs whose name contains `FAIL` make it exit 1 without
    /// writing anything.
    CopyInput,
    /// Always exits 1.
    AlwaysFail,
}

/// Creates a conda-style environment whose `bin/python` is a shell script.
#[cfg(unix)]
pub fn fake_conda_env(root: &Path, mode: FakeSegmenter) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let env = root.join("envs").join("cp");
    let bin = env.join("bin");
    fs::create_dir_all(&bin).expect("create env");

    let body = match mode {
        FakeSegmenter::CopyInput => {
            r#"dir=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--dir" ]; then dir="$2"; shift; fi
  shift
done
for f in "$dir"/*.tif; do
  case "$(basename "$f")" in
    *_cp_masks.tif) continue ;;
    *FAIL*) echo "model crashed on $f" >&2; exit 1 ;;
  esac
  echo "segmenting $f"
  cp "$f" "${f%.tif}_cp_masks.tif"
done
"#
        }
        FakeSegmenter::AlwaysFail => "echo 'no GPU found' >&2\nexit 1\n",
    };

    let python = bin.join("python");
    fs::write(&python, format!("#!/bin/sh\n{body}")).expect("write fake python");
    fs::set_permissions(&python, fs::Permissions::from_mode(0o755)).expect("chmod");
    env
}

/// Parses the results table into rows of cells (header excluded).
pub fn read_results(path: &Path) -> Vec<Vec<String>> {
    let text = fs::read_to_string(path).expect("read results");
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("Image name\tROI name\tRoi area (µm2)\tNb nuclei\tNb c-Fos cells")
    );
    lines
        .map(|l| l.split('\t').map(str::to_string).collect())
        .collect()
}
