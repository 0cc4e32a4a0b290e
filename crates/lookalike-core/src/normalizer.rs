//! Crop, resize and normalize a face region into the classifier tensor.
//!
//! The only place that decides what to do when no face was found: the whole
//! frame becomes the processing region.

use crate::error::ShapeMismatchError;
use crate::types::{DetectionResult, FaceRegion};
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::{Array4, ArrayView4};

// --- Named constants, pinned to the values the classifier was trained with ---
pub const CLASSIFIER_INPUT_SIZE: usize = 224;
const CLASSIFIER_CHANNELS: usize = 3;
/// ImageNet per-channel statistics, RGB order.
const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];
/// Context kept around a detected face, as a fraction of its width/height per side.
const FACE_MARGIN_RATIO: f32 = 0.1;

/// NCHW float tensor holding a single normalized RGB image.
#[derive(Debug, Clone)]
pub struct NormalizedTensor {
    data: Array4<f32>,
}

impl NormalizedTensor {
    /// `[batch, channels, height, width]`.
    pub fn shape(&self) -> [usize; 4] {
        let s = self.data.shape();
        [s[0], s[1], s[2], s[3]]
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    /// An all-zero tensor of the given NCHW shape.
    pub fn zeros(shape: [usize; 4]) -> Self {
        Self { data: Array4::zeros(shape) }
    }
}

/// Turns a detection outcome into a classifier-ready tensor.
#[derive(Debug, Clone, Copy)]
pub struct ImageNormalizer {
    size: usize,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self { size: CLASSIFIER_INPUT_SIZE }
    }
}

impl ImageNormalizer {
    /// Normalizer producing `size`×`size` tensors. The default matches the
    /// classifier; other sizes only make sense for a different classifier.
    pub fn with_size(size: usize) -> Self {
        Self { size }
    }

    /// Shape of every tensor this normalizer produces.
    pub fn output_shape(&self) -> [usize; 4] {
        [1, CLASSIFIER_CHANNELS, self.size, self.size]
    }

    /// Region of the image to classify for the given detection outcome.
    pub fn select_region(&self, width: u32, height: u32, detection: &DetectionResult) -> FaceRegion {
        match detection {
            DetectionResult::Face(face) => expand_with_margin(face, width, height),
            DetectionResult::NotFound => FaceRegion { x: 0, y: 0, width, height },
        }
    }

    /// Crop, resize (bilinear), scale to [0, 1] and apply per-channel mean/std.
    ///
    /// `expected` is the NCHW shape the classifier accepts; a disagreement is
    /// reported rather than producing a tensor the classifier would misread.
    pub fn normalize(
        &self,
        image: &DynamicImage,
        detection: &DetectionResult,
        expected: [usize; 4],
    ) -> Result<NormalizedTensor, ShapeMismatchError> {
        let actual = self.output_shape();
        if actual != expected {
            return Err(ShapeMismatchError { expected, actual });
        }

        let region = self.select_region(image.width(), image.height(), detection);
        let size = self.size as u32;
        let rgb = image
            .crop_imm(region.x, region.y, region.width, region.height)
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8();

        let mut tensor = Array4::<f32>::zeros(actual);
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..CLASSIFIER_CHANNELS {
                let value = pixel.0[c] as f32 / 255.0;
                tensor[[0, c, y as usize, x as usize]] = (value - CHANNEL_MEAN[c]) / CHANNEL_STD[c];
            }
        }

        tracing::trace!(?region, "normalized region");
        Ok(NormalizedTensor { data: tensor })
    }
}

/// Grow a face box by `FACE_MARGIN_RATIO` on every side, clamped to the image.
fn expand_with_margin(face: &FaceRegion, width: u32, height: u32) -> FaceRegion {
    let margin_x = (face.width as f32 * FACE_MARGIN_RATIO).round() as u32;
    let margin_y = (face.height as f32 * FACE_MARGIN_RATIO).round() as u32;

    let x0 = face.x.saturating_sub(margin_x).min(width.saturating_sub(1));
    let y0 = face.y.saturating_sub(margin_y).min(height.saturating_sub(1));
    let x1 = face.x.saturating_add(face.width).saturating_add(margin_x).min(width);
    let y1 = face.y.saturating_add(face.height).saturating_add(margin_y).min(height);

    FaceRegion {
        x: x0,
        y: y0,
        width: x1.saturating_sub(x0).max(1),
        height: y1.saturating_sub(y0).max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    const SHAPE: [usize; 4] = [1, 3, CLASSIFIER_INPUT_SIZE, CLASSIFIER_INPUT_SIZE];

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn test_output_shape() {
        let img = solid(640, 480, [10, 20, 30]);
        let t = ImageNormalizer::default()
            .normalize(&img, &DetectionResult::NotFound, SHAPE)
            .unwrap();
        assert_eq!(t.shape(), SHAPE);
    }

    #[test]
    fn test_channel_normalization_constants() {
        let img = solid(50, 50, [255, 0, 128]);
        let t = ImageNormalizer::default()
            .normalize(&img, &DetectionResult::NotFound, SHAPE)
            .unwrap();
        let v = t.view();
        let r = (1.0 - 0.485) / 0.229;
        let g = (0.0 - 0.456) / 0.224;
        let b = (128.0 / 255.0 - 0.406) / 0.225;
        assert!((v[[0, 0, 100, 100]] - r).abs() < 1e-5);
        assert!((v[[0, 1, 100, 100]] - g).abs() < 1e-5);
        assert!((v[[0, 2, 100, 100]] - b).abs() < 1e-5);
    }

    #[test]
    fn test_crop_selects_face_pixels() {
        // White square on black; cropping to it yields a white tensor.
        let mut buf = RgbImage::from_pixel(400, 400, Rgb([0, 0, 0]));
        for y in 100..300 {
            for x in 100..300 {
                buf.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let img = DynamicImage::ImageRgb8(buf);
        let face = FaceRegion { x: 120, y: 120, width: 150, height: 150 };
        let t = ImageNormalizer::default()
            .normalize(&img, &DetectionResult::Face(face), SHAPE)
            .unwrap();
        let white_r = (1.0 - 0.485) / 0.229;
        assert!((t.view()[[0, 0, 112, 112]] - white_r).abs() < 1e-5);
    }

    #[test]
    fn test_not_found_uses_whole_image() {
        let n = ImageNormalizer::default();
        assert_eq!(
            n.select_region(640, 480, &DetectionResult::NotFound),
            FaceRegion { x: 0, y: 0, width: 640, height: 480 }
        );
    }

    #[test]
    fn test_margin_expands_face() {
        let n = ImageNormalizer::default();
        let face = FaceRegion { x: 100, y: 100, width: 100, height: 50 };
        assert_eq!(
            n.select_region(1000, 1000, &DetectionResult::Face(face)),
            FaceRegion { x: 90, y: 95, width: 120, height: 60 }
        );
    }

    #[test]
    fn test_margin_clamped_to_bounds() {
        let n = ImageNormalizer::default();
        let face = FaceRegion { x: 2, y: 0, width: 100, height: 100 };
        assert_eq!(
            n.select_region(105, 100, &DetectionResult::Face(face)),
            FaceRegion { x: 0, y: 0, width: 105, height: 100 }
        );
    }

    #[test]
    fn test_shape_mismatch_reported() {
        let img = solid(32, 32, [0, 0, 0]);
        let err = ImageNormalizer::with_size(112)
            .normalize(&img, &DetectionResult::NotFound, SHAPE)
            .unwrap_err();
        assert_eq!(err.expected, SHAPE);
        assert_eq!(err.actual, [1, 3, 112, 112]);
    }

    #[test]
    fn test_grayscale_input_replicated_across_channels() {
        let img = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(64, 64, image::Luma([200])));
        let t = ImageNormalizer::default()
            .normalize(&img, &DetectionResult::NotFound, SHAPE)
            .unwrap();
        let v = t.view();
        let raw = |c: usize| v[[0, c, 10, 10]] * CHANNEL_STD[c] + CHANNEL_MEAN[c];
        assert!((raw(0) - raw(1)).abs() < 1e-5);
        assert!((raw(1) - raw(2)).abs() < 1e-5);
    }
}
