use serde::{Serialize, Serializer};

/// Face rectangle in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// A region flagged by the detector, with its raw cascade score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceCandidate {
    pub region: FaceRegion,
    pub score: f64,
}

/// Outcome of face localization. `NotFound` is a valid result, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionResult {
    Face(FaceRegion),
    NotFound,
}

impl DetectionResult {
    pub fn is_face(&self) -> bool {
        matches!(self, DetectionResult::Face(_))
    }
}

/// Softmax output of the classifier, indexed identically to the label map.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityVector(Vec<f32>);

impl ProbabilityVector {
    /// Apply a numerically stable softmax to raw logits.
    pub fn from_logits(logits: &[f32]) -> Self {
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        if sum > 0.0 && sum.is_finite() {
            Self(exps.into_iter().map(|e| e / sum).collect())
        } else {
            // Degenerate logits (all -inf / NaN): fall back to uniform.
            let n = logits.len().max(1) as f32;
            Self(vec![1.0 / n; logits.len()])
        }
    }

    /// Wrap values that are already a probability distribution.
    pub fn from_probabilities(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f32 {
        self.0.iter().sum()
    }
}

/// One entry of the ranked list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub celebrity: String,
    #[serde(serialize_with = "round4")]
    pub confidence: f32,
}

/// Final response of a prediction request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub predicted_celebrity: String,
    #[serde(serialize_with = "round4")]
    pub confidence: f32,
    pub class_index: usize,
    pub face_detected: bool,
    pub top_predictions: Vec<Prediction>,
}

/// Readiness data passed through from the loaded classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    pub model_loaded: bool,
    pub device: String,
    pub classes: usize,
}

/// Confidences go out on the wire with four decimal places.
fn round4<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    let rounded = ((*value as f64) * 10_000.0).round() / 10_000.0;
    serializer.serialize_f64(rounded)
}
