//! Runs the real SeetaFace cascade. The detector model is looked up in
//! `$LOOKALIKE_MODEL_DIR`, then in the workspace `models/` directory; each
//! test is skipped when it is in neither place.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use lookalike_core::{
    CascadeLocator, DecodeError, DetectionResult, DetectorConfig, FaceLocator, PipelineConfig,
};
use std::path::PathBuf;

const WORKSPACE_MODEL_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../models");

fn detector_model() -> Option<PathBuf> {
    let file = PipelineConfig::default().detector_file;
    let dirs = std::env::var_os("LOOKALIKE_MODEL_DIR")
        .map(PathBuf::from)
        .into_iter()
        .chain(std::iter::once(PathBuf::from(WORKSPACE_MODEL_DIR)));
    for dir in dirs {
        let path = dir.join(&file);
        if path.exists() {
            return Some(path);
        }
    }
    eprintln!("skipping: {file} not found (set LOOKALIKE_MODEL_DIR)");
    None
}

fn locator(config: DetectorConfig) -> Option<CascadeLocator> {
    let path = detector_model()?;
    Some(CascadeLocator::load(&path, config).expect("detector model should load"))
}

fn black(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([0, 0, 0])))
}

/// Deterministic high-contrast texture with nothing face-like in it.
fn stripes(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, _| {
        Luma([if (x / 3) % 2 == 0 { 255 } else { 0 }])
    }))
}

#[test]
fn black_image_has_no_face() {
    let Some(locator) = locator(DetectorConfig::default()) else { return };
    assert_eq!(locator.locate(&black(200, 200)).unwrap(), DetectionResult::NotFound);
}

#[test]
fn faceless_images_are_not_found() {
    let Some(locator) = locator(DetectorConfig::default()) else { return };
    let images = [
        black(64, 48),
        DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 240, Rgb([255, 255, 255]))),
        DynamicImage::ImageRgb8(RgbImage::from_pixel(120, 300, Rgb([90, 140, 200]))),
        DynamicImage::ImageLuma8(GrayImage::from_fn(160, 160, |x, _| Luma([x as u8]))),
    ];
    for image in &images {
        assert_eq!(
            locator.locate(image).unwrap(),
            DetectionResult::NotFound,
            "{}x{}",
            image.width(),
            image.height()
        );
    }
}

#[test]
fn zero_sized_image_is_rejected() {
    let Some(locator) = locator(DetectorConfig::default()) else { return };
    let err = locator.locate(&DynamicImage::new_rgb8(0, 0)).unwrap_err();
    assert!(matches!(err, DecodeError::ZeroDimensions { width: 0, height: 0 }));

    let err = locator.locate(&DynamicImage::new_rgb8(0, 50)).unwrap_err();
    assert!(matches!(err, DecodeError::ZeroDimensions { width: 0, height: 50 }));
}

#[test]
fn image_smaller_than_min_face_is_not_found() {
    let Some(locator) = locator(DetectorConfig::default()) else { return };
    assert_eq!(locator.locate(&stripes(19, 19)).unwrap(), DetectionResult::NotFound);
    assert_eq!(locator.locate(&stripes(300, 10)).unwrap(), DetectionResult::NotFound);
    assert!(locator.candidates(&[0; 19 * 19], 19, 19).is_empty());
}

#[test]
fn out_of_range_tuning_still_scans() {
    let configs = [
        DetectorConfig { pyramid_scale: 0.995, ..Default::default() },
        DetectorConfig { pyramid_scale: 0.001, ..Default::default() },
        DetectorConfig { pyramid_scale: 1.5, ..Default::default() },
        DetectorConfig { score_threshold: 0.0, ..Default::default() },
        DetectorConfig { score_threshold: -3.0, ..Default::default() },
        DetectorConfig { min_face_size: 0, window_step: 0, ..Default::default() },
    ];
    for config in configs {
        let Some(locator) = locator(config.clone()) else { return };
        let result = locator.locate(&black(200, 200));
        assert_eq!(result.unwrap(), DetectionResult::NotFound, "{config:?}");
    }
}
