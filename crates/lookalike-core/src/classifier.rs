//! Identity classifier via ONNX Runtime.
//!
//! Runs a ResNet-18 whose final layer was replaced by a 17-way linear head,
//! exported to ONNX. The weights are loaded once into a [`ModelHandle`] and
//! never mutated; softmax turns the logits into a probability distribution.

use crate::error::{ModelLoadError, ShapeMismatchError};
use crate::normalizer::{NormalizedTensor, CLASSIFIER_INPUT_SIZE};
use crate::types::ProbabilityVector;
use ort::session::Session;
use ort::value::TensorRef;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

// --- Named constants ---
pub const EXPECTED_CLASSES: usize = 17;
const CLASSIFIER_INPUT_SHAPE: [usize; 4] = [1, 3, CLASSIFIER_INPUT_SIZE, CLASSIFIER_INPUT_SIZE];
const DEFAULT_INTRA_THREADS: usize = 1;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatchError),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Strategy mapping a normalized image to a distribution over identities.
pub trait IdentityClassifier: Send + Sync {
    fn classify(&self, tensor: &NormalizedTensor) -> Result<ProbabilityVector, ClassifyError>;

    /// Width of the probability vector `classify` returns.
    fn num_classes(&self) -> usize;

    /// NCHW shape `classify` accepts.
    fn input_shape(&self) -> [usize; 4];

    /// Compute device backing inference, for health reporting.
    fn device(&self) -> &str {
        "cpu"
    }
}

/// Session construction options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Number of classes the final layer must produce.
    pub expected_classes: usize,
    /// Independent sessions kept for concurrent callers.
    pub sessions: usize,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
    /// The exported graph already ends in a softmax.
    pub outputs_probabilities: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            expected_classes: EXPECTED_CLASSES,
            sessions: 1,
            intra_threads: DEFAULT_INTRA_THREADS,
            outputs_probabilities: false,
        }
    }
}

/// Loaded, validated classifier weights shared read-only by every request.
///
/// ONNX Runtime needs exclusive access to a session while it runs, so the
/// handle keeps a small pool of sessions built from the same model bytes.
pub struct ModelHandle {
    sessions: Vec<Mutex<Session>>,
    next: AtomicUsize,
    num_classes: usize,
    outputs_probabilities: bool,
    device: &'static str,
    path: PathBuf,
}

impl ModelHandle {
    /// Load the ONNX classifier and verify it produces `expected_classes` logits
    /// for a `[1, 3, 224, 224]` input.
    pub fn load(model_path: &Path, config: &ClassifierConfig) -> Result<Self, ModelLoadError> {
        if !model_path.exists() {
            return Err(ModelLoadError::NotFound(model_path.to_path_buf()));
        }

        let bytes = std::fs::read(model_path).map_err(|source| ModelLoadError::Io {
            path: model_path.to_path_buf(),
            source,
        })?;

        let pool_size = config.sessions.max(1);
        let mut sessions = Vec::with_capacity(pool_size);
        let mut device = "cpu";
        for _ in 0..pool_size {
            let (session, dev) = commit_session(&bytes, config.intra_threads.max(1)).map_err(|e| {
                ModelLoadError::Corrupt {
                    path: model_path.to_path_buf(),
                    reason: e.to_string(),
                }
            })?;
            device = dev;
            sessions.push(Mutex::new(session));
        }

        let first = sessions[0].get_mut().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(
            path = %model_path.display(),
            inputs = ?first.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?first.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            sessions = pool_size,
            device,
            "loaded classifier model"
        );

        validate_input(first, model_path)?;

        // Warm-up pass: proves the graph runs and pins the output width.
        let probe = NormalizedTensor::zeros(CLASSIFIER_INPUT_SHAPE);
        let logits = run_session(first, &probe).map_err(|e| ModelLoadError::Incompatible {
            path: model_path.to_path_buf(),
            reason: format!("warm-up inference failed: {e}"),
        })?;
        if logits.len() != config.expected_classes {
            return Err(ModelLoadError::Incompatible {
                path: model_path.to_path_buf(),
                reason: format!(
                    "expected {} output classes, got {}",
                    config.expected_classes,
                    logits.len()
                ),
            });
        }

        Ok(Self {
            sessions,
            next: AtomicUsize::new(0),
            num_classes: logits.len(),
            outputs_probabilities: config.outputs_probabilities,
            device,
            path: model_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool_size(&self) -> usize {
        self.sessions.len()
    }

    /// Run `f` with exclusive access to one pooled session: the first idle one,
    /// otherwise wait on a round-robin slot.
    fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        for slot in &self.sessions {
            if let Ok(mut session) = slot.try_lock() {
                return f(&mut session);
            }
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[idx].lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut session)
    }
}

impl IdentityClassifier for ModelHandle {
    fn classify(&self, tensor: &NormalizedTensor) -> Result<ProbabilityVector, ClassifyError> {
        if tensor.shape() != CLASSIFIER_INPUT_SHAPE {
            return Err(ShapeMismatchError {
                expected: CLASSIFIER_INPUT_SHAPE,
                actual: tensor.shape(),
            }
            .into());
        }

        let raw = self.with_session(|session| run_session(session, tensor))?;
        to_distribution(raw, self.num_classes, self.outputs_probabilities)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn input_shape(&self) -> [usize; 4] {
        CLASSIFIER_INPUT_SHAPE
    }

    fn device(&self) -> &str {
        self.device
    }
}

/// Build one session from the model bytes, preferring CUDA when compiled in.
fn commit_session(bytes: &[u8], intra_threads: usize) -> Result<(Session, &'static str), ort::Error> {
    let builder = Session::builder()?.with_intra_threads(intra_threads)?;

    #[cfg(feature = "cuda")]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(bytes) {
                return Ok((session, "cuda"));
            }
        }
        tracing::debug!("CUDA execution provider not available, using CPU");
    }

    Ok((builder.commit_from_memory(bytes)?, "cpu"))
}

/// The graph must take a single 4-D input compatible with `[1, 3, 224, 224]`.
/// Dynamic dimensions (negative) are accepted.
fn validate_input(session: &Session, model_path: &Path) -> Result<(), ModelLoadError> {
    let incompatible = |reason: String| ModelLoadError::Incompatible {
        path: model_path.to_path_buf(),
        reason,
    };

    let inputs = session.inputs();
    if inputs.len() != 1 {
        return Err(incompatible(format!("expected 1 input, got {}", inputs.len())));
    }

    let dims: Vec<i64> = inputs[0]
        .dtype()
        .tensor_shape()
        .map(|shape| shape.to_vec())
        .ok_or_else(|| incompatible("input is not a tensor".into()))?;

    if !shape_accepts(&dims, &CLASSIFIER_INPUT_SHAPE) {
        return Err(incompatible(format!(
            "input shape {dims:?} does not accept {CLASSIFIER_INPUT_SHAPE:?}"
        )));
    }
    Ok(())
}

/// Turn raw model output into a distribution. Probabilities taken as-is must
/// be finite and non-negative.
fn to_distribution(
    raw: Vec<f32>,
    num_classes: usize,
    outputs_probabilities: bool,
) -> Result<ProbabilityVector, ClassifyError> {
    if raw.len() != num_classes {
        return Err(ClassifyError::InferenceFailed(format!(
            "expected {} logits, got {}",
            num_classes,
            raw.len()
        )));
    }

    if !outputs_probabilities {
        return Ok(ProbabilityVector::from_logits(&raw));
    }

    if let Some((index, value)) = raw
        .iter()
        .enumerate()
        .find(|(_, p)| !p.is_finite() || **p < 0.0)
    {
        return Err(ClassifyError::InferenceFailed(format!(
            "model emitted probability {value} for class {index}"
        )));
    }
    Ok(ProbabilityVector::from_probabilities(raw))
}

fn shape_accepts(declared: &[i64], actual: &[usize]) -> bool {
    declared.len() == actual.len()
        && declared
            .iter()
            .zip(actual)
            .all(|(&d, &a)| d < 0 || d as usize == a)
}

fn run_session(session: &mut Session, tensor: &NormalizedTensor) -> Result<Vec<f32>, ClassifyError> {
    let outputs = session.run(ort::inputs![TensorRef::from_array_view(tensor.view())?])?;

    let (_, logits) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| ClassifyError::InferenceFailed(format!("logit extraction: {e}")))?;

    Ok(logits.to_vec())
}
