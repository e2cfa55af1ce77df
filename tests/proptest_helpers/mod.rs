#![allow(dead_code)]

use image::Luma;
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

use roiquant::population::{LabeledObject, LabeledObjectPopulation};
use roiquant::raster::{CalibratedImage, Calibration, Gray16Image};

/// Width of the grid objects are laid out on.
pub const GRID_WIDTH: u32 = 160;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// One generated object: its pixel count and the intensity under it.
#[derive(Clone, Copy, Debug)]
pub struct ObjectSeed {
    pub label: u32,
    pub pixels: u32,
    pub intensity: u16,
}

/// A population plus the intensity image it is measured on.
#[derive(Clone, Debug)]
pub struct Scene {
    pub population: LabeledObjectPopulation,
    pub intensity: CalibratedImage,
    pub seeds: Vec<ObjectSeed>,
}

/// Populations of up to `max_objects` horizontal strips, one per row, with
/// strictly increasing but gappy labels.
pub fn arb_scene(max_objects: usize) -> BoxedStrategy<Scene> {
    (
        proptest::collection::vec((1u32..=5, 1u32..=GRID_WIDTH, any::<u16>()), 0..=max_objects),
        prop_oneof![Just(1.0f64), Just(0.5f64), Just(0.1625f64)],
    )
        .prop_map(|(raw, pixel_size)| {
            let mut label = 0u32;
            let seeds: Vec<ObjectSeed> = raw
                .into_iter()
                .map(|(gap, pixels, intensity)| {
                    label += gap;
                    ObjectSeed {
                        label,
                        pixels,
                        intensity,
                    }
                })
                .collect();
            build_scene(seeds, Calibration::isotropic(pixel_size))
        })
        .boxed()
}

pub fn build_scene(seeds: Vec<ObjectSeed>, calibration: Calibration) -> Scene {
    let height = seeds.len().max(1) as u32;
    let objects = seeds
        .iter()
        .enumerate()
        .map(|(row, seed)| {
            LabeledObject::new(seed.label, (0..seed.pixels).map(|x| (x, row as u32)).collect())
        })
        .collect();
    let population = LabeledObjectPopulation::new(objects, calibration, GRID_WIDTH, height)
        .expect("generated population is valid");

    let raster = Gray16Image::from_fn(GRID_WIDTH, height, |_, y| {
        Luma([seeds.get(y as usize).map_or(0, |s| s.intensity)])
    });
    Scene {
        population,
        intensity: CalibratedImage::new(raster, calibration),
        seeds,
    }
}

/// Row an object was generated on (its first pixel's y).
pub fn row_of(object: &LabeledObject) -> u32 {
    object.pixels().first().map_or(u32::MAX, |p| p.1)
}
