//! Request orchestration: decode → locate → normalize → classify → rank.

use crate::classifier::{ClassifyError, IdentityClassifier, ModelHandle};
use crate::config::PipelineConfig;
use crate::detector::{CascadeLocator, FaceLocator};
use crate::error::{DecodeError, LabelMapMismatchError, ModelLoadError, ShapeMismatchError};
use crate::labels::{LabelMap, LabelMapError};
use crate::normalizer::ImageNormalizer;
use crate::ranker;
use crate::types::{PredictionResult, ServiceHealth};
use image::DynamicImage;
use std::time::Instant;
use thiserror::Error;

/// Failure of a single prediction request. No partial result accompanies it.
#[derive(Error, Debug)]
pub enum PredictError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatchError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error(transparent)]
    LabelMapMismatch(#[from] LabelMapMismatchError),
}

/// The service could not be brought up; nothing may be served.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("label map: {0}")]
    LabelMap(#[from] LabelMapError),
    #[error("model load: {0}")]
    ModelLoad(#[from] ModelLoadError),
    #[error(transparent)]
    LabelMapMismatch(#[from] LabelMapMismatchError),
    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatchError),
}

/// Decode JPEG/PNG (or any format `image` recognizes) from raw bytes.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let image = image::load_from_memory(bytes)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(DecodeError::ZeroDimensions {
            width: image.width(),
            height: image.height(),
        });
    }
    Ok(image)
}

/// Stateless prediction pipeline over frozen, startup-loaded artifacts.
///
/// Safe to share behind an `Arc` across any number of worker threads.
pub struct PredictionService {
    locator: Box<dyn FaceLocator>,
    normalizer: ImageNormalizer,
    classifier: Box<dyn IdentityClassifier>,
    labels: LabelMap,
    top_k: usize,
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("normalizer", &self.normalizer)
            .field("classes", &self.labels.len())
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl PredictionService {
    /// Assemble the pipeline, checking that the label map, normalizer and
    /// classifier agree before any request can be accepted.
    pub fn new(
        locator: Box<dyn FaceLocator>,
        normalizer: ImageNormalizer,
        classifier: Box<dyn IdentityClassifier>,
        labels: LabelMap,
        top_k: usize,
    ) -> Result<Self, StartupError> {
        if labels.len() != classifier.num_classes() {
            return Err(LabelMapMismatchError {
                labels: labels.len(),
                classes: classifier.num_classes(),
            }
            .into());
        }

        if normalizer.output_shape() != classifier.input_shape() {
            return Err(ShapeMismatchError {
                expected: classifier.input_shape(),
                actual: normalizer.output_shape(),
            }
            .into());
        }

        Ok(Self {
            locator,
            normalizer,
            classifier,
            labels,
            top_k,
        })
    }

    /// Load all three artifacts named by `config` and assemble the pipeline.
    pub fn load(config: &PipelineConfig) -> Result<Self, StartupError> {
        let labels = LabelMap::load(&config.label_map_path())?;
        let locator = CascadeLocator::load(&config.detector_path(), config.detector.clone())?;
        let classifier = ModelHandle::load(&config.classifier_path(), &config.classifier)?;

        let service = Self::new(
            Box::new(locator),
            ImageNormalizer::default(),
            Box::new(classifier),
            labels,
            config.top_k,
        )?;
        tracing::info!(
            classes = service.labels.len(),
            top_k = service.top_k,
            device = service.classifier.device(),
            "prediction service ready"
        );
        Ok(service)
    }

    /// Run the full pipeline on one encoded image.
    pub fn predict(&self, bytes: &[u8]) -> Result<PredictionResult, PredictError> {
        let image = decode_image(bytes)?;
        self.predict_image(&image)
    }

    /// Run the pipeline on an already decoded image.
    pub fn predict_image(&self, image: &DynamicImage) -> Result<PredictionResult, PredictError> {
        let start = Instant::now();

        let detection = self.locator.locate(image)?;
        let tensor = self
            .normalizer
            .normalize(image, &detection, self.classifier.input_shape())?;
        let probabilities = self.classifier.classify(&tensor)?;
        let mut result = ranker::rank(&probabilities, &self.labels, self.top_k)?;
        result.face_detected = detection.is_face();

        tracing::info!(
            width = image.width(),
            height = image.height(),
            face_detected = result.face_detected,
            class_index = result.class_index,
            confidence = result.confidence,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "prediction complete"
        );

        Ok(result)
    }

    /// Display names of every supported identity, in class-index order.
    pub fn celebrities(&self) -> &[String] {
        self.labels.names()
    }

    pub fn health(&self) -> ServiceHealth {
        ServiceHealth {
            model_loaded: true,
            device: self.classifier.device().to_string(),
            classes: self.classifier.num_classes(),
        }
    }
}
