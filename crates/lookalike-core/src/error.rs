//! Error types shared across pipeline stages.

use std::path::PathBuf;
use thiserror::Error;

/// The request payload could not be turned into a usable raster image.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty image payload")]
    Empty,
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("image dimensions are zero ({width}x{height})")]
    ZeroDimensions { width: u32, height: u32 },
}

/// A startup artifact (classifier weights or detector model) is unusable.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read model file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt model file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("incompatible model {path}: {reason}")]
    Incompatible { path: PathBuf, reason: String },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// The normalized tensor geometry disagrees with what the classifier accepts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("tensor shape mismatch: classifier expects {expected:?}, got {actual:?}")]
pub struct ShapeMismatchError {
    pub expected: [usize; 4],
    pub actual: [usize; 4],
}

/// The label map and the classifier disagree on the number of classes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("label map has {labels} entries but classifier produces {classes} classes")]
pub struct LabelMapMismatchError {
    pub labels: usize,
    pub classes: usize,
}
