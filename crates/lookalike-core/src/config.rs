//! Artifact locations and pipeline tuning.

use crate::classifier::ClassifierConfig;
use crate::detector::DetectorConfig;
use crate::ranker::DEFAULT_TOP_K;
use serde::Deserialize;
use std::path::PathBuf;

const CLASSIFIER_FILE: &str = "cnn_face_model.onnx";
const DETECTOR_FILE: &str = "seeta_fd_frontal_v1.0.bin";
const LABEL_MAP_FILE: &str = "label_map.json";

/// Everything needed to build a [`crate::PredictionService`] from disk.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the three startup artifacts.
    pub model_dir: PathBuf,
    pub classifier_file: String,
    pub detector_file: String,
    pub label_map_file: String,
    pub top_k: usize,
    pub detector: DetectorConfig,
    pub classifier: ClassifierConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            classifier_file: CLASSIFIER_FILE.to_string(),
            detector_file: DETECTOR_FILE.to_string(),
            label_map_file: LABEL_MAP_FILE.to_string(),
            top_k: DEFAULT_TOP_K,
            detector: DetectorConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn classifier_path(&self) -> PathBuf {
        self.model_dir.join(&self.classifier_file)
    }

    pub fn detector_path(&self) -> PathBuf {
        self.model_dir.join(&self.detector_file)
    }

    pub fn label_map_path(&self) -> PathBuf {
        self.model_dir.join(&self.label_map_file)
    }

    /// Override fields from `LOOKALIKE_*` environment variables when set.
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("LOOKALIKE_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        env_string("LOOKALIKE_CLASSIFIER_FILE", &mut self.classifier_file);
        env_string("LOOKALIKE_DETECTOR_FILE", &mut self.detector_file);
        env_string("LOOKALIKE_LABEL_MAP_FILE", &mut self.label_map_file);
        env_parse("LOOKALIKE_TOP_K", &mut self.top_k);
        env_parse("LOOKALIKE_MIN_FACE_SIZE", &mut self.detector.min_face_size);
        env_parse("LOOKALIKE_DETECTOR_SCORE_THRESHOLD", &mut self.detector.score_threshold);
        env_parse("LOOKALIKE_PYRAMID_SCALE", &mut self.detector.pyramid_scale);
        env_parse("LOOKALIKE_WINDOW_STEP", &mut self.detector.window_step);
        env_parse("LOOKALIKE_INTRA_THREADS", &mut self.classifier.intra_threads);
        if let Ok(v) = std::env::var("LOOKALIKE_OUTPUTS_PROBABILITIES") {
            self.classifier.outputs_probabilities = v != "0";
        }
    }
}

/// `$XDG_DATA_HOME/lookalike/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("lookalike/models")
}

fn env_string(key: &str, target: &mut String) {
    if let Ok(v) = std::env::var(key) {
        *target = v;
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Some(v) = std::env::var(key).ok().and_then(|v| v.parse().ok()) {
        *target = v;
    }
}
