//! End-to-end batch runs against a fake Cellpose environment.

#![cfg(unix)]

mod common;

use std::fs;
use std::path::Path;

use common::{fake_conda_env, read_results, write_image_set, FakeSegmenter};
use roiquant::batch::{run_batch, RESULTS_FILE};
use roiquant::config::{RunConfig, ValidatedRunConfig};
use roiquant::segmentation::{EnvKind, Segmenter};
use roiquant::QuantError;

fn config_for(work: &Path, mode: FakeSegmenter) -> ValidatedRunConfig {
    let mut config = RunConfig {
        pixel_size: 1.0,
        ..Default::default()
    };
    config.segmentation.env_path = fake_conda_env(work, mode);
    config.segmentation.scratch_root = Some(work.join("scratch"));
    config.segmentation.timeout_secs = Some(60);
    config.validate().expect("valid config")
}

fn scratch_is_clean(work: &Path) -> bool {
    match fs::read_dir(work.join("scratch")) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

#[test]
fn failing_roi_is_skipped_and_batch_continues() {
    let work = tempfile::tempdir().unwrap();
    let data = work.path().join("data");
    fs::create_dir(&data).unwrap();
    write_image_set(
        &data,
        "img1",
        &[
            ("ok", 20.0, 20.0, 120.0, 120.0),
            ("FAIL_roi", 130.0, 130.0, 180.0, 180.0),
        ],
    );
    write_image_set(&data, "img2", &[("whole", 0.0, 0.0, 200.0, 200.0)]);
    // an image whose channels were never exported
    fs::write(data.join("img3.nd"), b"").unwrap();

    let config = config_for(work.path(), FakeSegmenter::CopyInput);
    let segmenter = Segmenter::cellpose(config.segmentation().clone());
    let summary = run_batch(&data, &config, &segmenter).expect("batch runs");

    assert_eq!(summary.images, 3);
    assert_eq!(summary.rows_written, 2);
    assert_eq!(summary.skipped.len(), 2);
    assert_eq!(summary.skipped[0].image, "img1");
    assert_eq!(summary.skipped[0].roi.as_deref(), Some("FAIL_roi"));
    assert!(summary.skipped[0].reason.contains("no label image"));
    assert_eq!(summary.skipped[1].image, "img3");
    assert_eq!(summary.skipped[1].roi, None);

    let rows = read_results(&data.join("Results").join(RESULTS_FILE));
    assert_eq!(rows.len(), 2);

    assert_eq!(rows[0][0], "img1");
    assert_eq!(rows[0][1], "ok");
    assert_eq!(rows[0][2].parse::<f64>().unwrap(), 10_000.0);
    assert_eq!(rows[0][3], "100");
    assert_eq!(rows[0][4], "2");

    assert_eq!(rows[1][0], "img2");
    assert_eq!(rows[1][1], "whole");
    assert_eq!(rows[1][2].parse::<f64>().unwrap(), 40_000.0);
    assert_eq!(rows[1][4], "2");

    assert!(scratch_is_clean(work.path()));
}

#[test]
fn overlay_carries_labels_and_nucleus_channel() {
    let work = tempfile::tempdir().unwrap();
    let data = work.path().join("data");
    fs::create_dir(&data).unwrap();
    write_image_set(&data, "img1", &[("ok", 20.0, 20.0, 120.0, 120.0)]);

    let config = config_for(work.path(), FakeSegmenter::CopyInput);
    let segmenter = Segmenter::cellpose(config.segmentation().clone());
    run_batch(&data, &config, &segmenter).expect("batch runs");

    let overlay = image::open(data.join("Results").join("img1_ok.tif"))
        .expect("overlay written")
        .into_rgb16();
    assert_eq!(overlay.dimensions(), (100, 100));
    // first kept cell starts at (30, 30) in the full frame
    assert_eq!(overlay.get_pixel(10, 10).0, [0, 1, 4000]);
    // second kept cell starts at (30, 60)
    assert_eq!(overlay.get_pixel(10, 40).0, [0, 2, 4000]);
    // the oversized cell at (60, 60) was dropped
    assert_eq!(overlay.get_pixel(40, 40).0, [0, 0, 4000]);
    // background right of the nucleus edge
    assert_eq!(overlay.get_pixel(80, 80).0, [0, 0, 100]);
}

#[test]
fn rois_with_clashing_file_names_keep_separate_overlays() {
    let work = tempfile::tempdir().unwrap();
    let data = work.path().join("data");
    fs::create_dir(&data).unwrap();
    write_image_set(
        &data,
        "img1",
        &[
            ("DG left", 20.0, 20.0, 120.0, 120.0),
            ("DG_left", 20.0, 20.0, 50.0, 50.0),
        ],
    );

    let config = config_for(work.path(), FakeSegmenter::CopyInput);
    let segmenter = Segmenter::cellpose(config.segmentation().clone());
    let summary = run_batch(&data, &config, &segmenter).expect("batch runs");
    assert_eq!(summary.rows_written, 2);

    let results = data.join("Results");
    let first = image::open(results.join("img1_DG_left.tif")).unwrap();
    let second = image::open(results.join("img1_DG_left_2.tif")).unwrap();
    assert_eq!((first.width(), first.height()), (100, 100));
    assert_eq!((second.width(), second.height()), (30, 30));
}

#[test]
fn roi_running_off_the_image_still_gets_a_row() {
    let work = tempfile::tempdir().unwrap();
    let data = work.path().join("data");
    fs::create_dir(&data).unwrap();
    write_image_set(&data, "img1", &[("edge", -10.0, -10.0, 120.0, 120.0)]);

    let config = config_for(work.path(), FakeSegmenter::CopyInput);
    let segmenter = Segmenter::cellpose(config.segmentation().clone());
    let summary = run_batch(&data, &config, &segmenter).expect("batch runs");
    assert!(summary.skipped.is_empty(), "{:?}", summary.skipped);

    let rows = read_results(&data.join("Results").join(RESULTS_FILE));
    assert_eq!(rows.len(), 1);
    // clipped to the 120 x 120 part inside the image
    assert_eq!(rows[0][2].parse::<f64>().unwrap(), 14_400.0);
    assert_eq!(rows[0][4], "2");
}

#[test]
fn segmenter_exit_code_one_everywhere_leaves_header_only() {
    let work = tempfile::tempdir().unwrap();
    let data = work.path().join("data");
    fs::create_dir(&data).unwrap();
    write_image_set(&data, "img1", &[("a", 0.0, 0.0, 50.0, 50.0), ("b", 50.0, 50.0, 100.0, 100.0)]);

    let config = config_for(work.path(), FakeSegmenter::AlwaysFail);
    let segmenter = Segmenter::cellpose(config.segmentation().clone());
    let summary = run_batch(&data, &config, &segmenter).expect("batch still succeeds");

    assert_eq!(summary.rows_written, 0);
    assert_eq!(summary.skipped.len(), 2);
    assert!(read_results(&data.join("Results").join(RESULTS_FILE)).is_empty());
    assert!(scratch_is_clean(work.path()));
}

#[test]
fn unusable_output_directory_is_fatal() {
    let work = tempfile::tempdir().unwrap();
    let data = work.path().join("data");
    fs::create_dir(&data).unwrap();
    write_image_set(&data, "img1", &[("a", 0.0, 0.0, 50.0, 50.0)]);
    let blocker = work.path().join("not_a_dir");
    fs::write(&blocker, b"").unwrap();

    let mut config = RunConfig {
        output_dir: Some(blocker.join("Results")),
        ..Default::default()
    };
    config.segmentation.env_path = fake_conda_env(work.path(), FakeSegmenter::CopyInput);
    let config = config.validate().unwrap();
    let segmenter = Segmenter::cellpose(config.segmentation().clone());

    let err = run_batch(&data, &config, &segmenter).unwrap_err();
    assert!(matches!(err, QuantError::ResultSink { .. }));
}

#[test]
fn venv_is_rejected_before_any_image() {
    let mut config = RunConfig::default();
    config.segmentation.env_kind = EnvKind::Venv;
    assert!(matches!(
        config.validate(),
        Err(QuantError::Configuration(_))
    ));
}
