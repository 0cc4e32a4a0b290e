//! lookalike-core — Celebrity lookalike inference pipeline.
//!
//! Locates the dominant face with a SeetaFace cascade, normalizes it to a
//! 224×224 ImageNet-style tensor, classifies it with an ONNX ResNet-18 over
//! 17 identities, and ranks the result.

pub mod classifier;
pub mod config;
pub mod detector;
pub mod error;
pub mod labels;
pub mod normalizer;
pub mod ranker;
pub mod service;
pub mod types;

pub use classifier::{ClassifierConfig, ClassifyError, IdentityClassifier, ModelHandle};
pub use config::PipelineConfig;
pub use detector::{CascadeLocator, DetectorConfig, FaceLocator};
pub use error::{DecodeError, LabelMapMismatchError, ModelLoadError, ShapeMismatchError};
pub use labels::{LabelMap, LabelMapError};
pub use normalizer::{ImageNormalizer, NormalizedTensor};
pub use ranker::{rank, DEFAULT_TOP_K};
pub use service::{decode_image, PredictError, PredictionService, StartupError};
pub use types::{
    DetectionResult, FaceCandidate, FaceRegion, Prediction, PredictionResult, ProbabilityVector,
    ServiceHealth,
};
