//! Cascade face localization via the SeetaFace funnel-structured detector.
//!
//! The detector scans a multi-scale window pyramid over the grayscale image
//! and reports every window that clears the cascade's score threshold. Only
//! the dominant face is kept: largest area first, topmost on ties.

use crate::error::{DecodeError, ModelLoadError};
use crate::types::{DetectionResult, FaceCandidate, FaceRegion};
use image::DynamicImage;
use serde::Deserialize;
use std::io::Cursor;
use std::path::Path;

// --- Named constants (no magic numbers) ---
const CASCADE_MIN_FACE_SIZE: u32 = 20;
const CASCADE_SCORE_THRESHOLD: f64 = 2.0;
const CASCADE_PYRAMID_SCALE: f32 = 0.8;
const CASCADE_WINDOW_STEP: u32 = 4;
// rustface asserts on scale factors outside this range.
const PYRAMID_SCALE_MIN: f32 = 0.01;
const PYRAMID_SCALE_MAX: f32 = 0.99;

/// Strategy for finding the primary face in an image.
pub trait FaceLocator: Send + Sync {
    fn locate(&self, image: &DynamicImage) -> Result<DetectionResult, DecodeError>;
}

/// Tuning for the cascade scan.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Smallest face edge, in pixels, the pyramid will search for (>= 20).
    pub min_face_size: u32,
    /// Minimum cascade score for a window to count as a face (> 0).
    pub score_threshold: f64,
    /// Downscale factor between pyramid levels, in [0.01, 0.99].
    pub pyramid_scale: f32,
    pub window_step: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_face_size: CASCADE_MIN_FACE_SIZE,
            score_threshold: CASCADE_SCORE_THRESHOLD,
            pyramid_scale: CASCADE_PYRAMID_SCALE,
            window_step: CASCADE_WINDOW_STEP,
        }
    }
}

impl DetectorConfig {
    /// Bring every field into the range the cascade scanner accepts. An
    /// unusable threshold or scale factor falls back to its default; a scale
    /// factor inside (0, 1) is clamped to `[0.01, 0.99]`.
    pub fn sanitized(self) -> Self {
        let pyramid_scale = if self.pyramid_scale.is_finite()
            && self.pyramid_scale > 0.0
            && self.pyramid_scale < 1.0
        {
            self.pyramid_scale.clamp(PYRAMID_SCALE_MIN, PYRAMID_SCALE_MAX)
        } else {
            CASCADE_PYRAMID_SCALE
        };
        let score_threshold = if self.score_threshold.is_finite() && self.score_threshold > 0.0 {
            self.score_threshold
        } else {
            CASCADE_SCORE_THRESHOLD
        };

        Self {
            min_face_size: self.min_face_size.max(CASCADE_MIN_FACE_SIZE),
            score_threshold,
            pyramid_scale,
            window_step: self.window_step.max(1),
        }
    }
}

/// SeetaFace cascade locator. The model is loaded once and shared read-only;
/// each call scans with its own short-lived detector.
pub struct CascadeLocator {
    model: rustface::Model,
    config: DetectorConfig,
}

impl CascadeLocator {
    /// Load the cascade model from the given path.
    pub fn load(model_path: &Path, config: DetectorConfig) -> Result<Self, ModelLoadError> {
        if !model_path.exists() {
            return Err(ModelLoadError::NotFound(model_path.to_path_buf()));
        }

        let bytes = std::fs::read(model_path).map_err(|source| ModelLoadError::Io {
            path: model_path.to_path_buf(),
            source,
        })?;
        let model = rustface::read_model(Cursor::new(bytes)).map_err(|e| ModelLoadError::Corrupt {
            path: model_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let requested = config.clone();
        let config = config.sanitized();
        if config != requested {
            tracing::warn!(?requested, effective = ?config, "detector tuning out of range, adjusted");
        }

        tracing::info!(
            path = %model_path.display(),
            min_face_size = config.min_face_size,
            score_threshold = config.score_threshold,
            pyramid_scale = config.pyramid_scale,
            window_step = config.window_step,
            "loaded cascade face detector"
        );

        Ok(Self { model, config })
    }

    /// Run the cascade over a grayscale buffer and return every candidate,
    /// clipped to the image bounds.
    pub fn candidates(&self, gray: &[u8], width: u32, height: u32) -> Vec<FaceCandidate> {
        // The pyramid cannot place a single window on an image smaller than the minimum face.
        if width < self.config.min_face_size || height < self.config.min_face_size {
            return Vec::new();
        }

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.config.min_face_size);
        detector.set_score_thresh(self.config.score_threshold);
        detector.set_pyramid_scale_factor(self.config.pyramid_scale);
        detector.set_slide_window_step(self.config.window_step, self.config.window_step);

        let faces = detector.detect(&rustface::ImageData::new(gray, width, height));

        faces
            .iter()
            .filter_map(|face| {
                let bbox = face.bbox();
                clip_to_image(bbox.x(), bbox.y(), bbox.width(), bbox.height(), width, height)
                    .map(|region| FaceCandidate { region, score: face.score() })
            })
            .collect()
    }
}

impl FaceLocator for CascadeLocator {
    fn locate(&self, image: &DynamicImage) -> Result<DetectionResult, DecodeError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(DecodeError::ZeroDimensions { width, height });
        }

        let gray = image.to_luma8();
        let candidates = self.candidates(gray.as_raw(), width, height);
        let result = select_primary(&candidates);

        tracing::debug!(
            candidates = candidates.len(),
            score = ?candidates
                .iter()
                .find(|c| DetectionResult::Face(c.region) == result)
                .map(|c| c.score),
            ?result,
            "cascade scan complete"
        );

        Ok(result)
    }
}

/// Pick the dominant face: largest area, then topmost, then leftmost.
/// Equal candidates keep detector order.
pub fn select_primary(candidates: &[FaceCandidate]) -> DetectionResult {
    candidates
        .iter()
        .map(|c| c.region)
        .reduce(|best, r| {
            let better = r.area() > best.area()
                || (r.area() == best.area() && (r.y, r.x) < (best.y, best.x));
            if better { r } else { best }
        })
        .map_or(DetectionResult::NotFound, DetectionResult::Face)
}

/// Clip a detector box (which may extend past the frame) to the image.
/// Returns `None` when nothing of the box remains inside.
fn clip_to_image(x: i32, y: i32, w: u32, h: u32, img_w: u32, img_h: u32) -> Option<FaceRegion> {
    let x0 = (x as i64).clamp(0, img_w as i64);
    let y0 = (y as i64).clamp(0, img_h as i64);
    let x1 = (x as i64 + w as i64).clamp(0, img_w as i64);
    let y1 = (y as i64 + h as i64).clamp(0, img_h as i64);

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some(FaceRegion {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0) as u32,
        height: (y1 - y0) as u32,
    })
}
