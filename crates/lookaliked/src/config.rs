use lookalike_core::PipelineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_QUEUE_DEPTH: usize = 32;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Which message bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bus {
    Session,
    System,
}

/// Daemon configuration: an optional TOML file, then `LOOKALIKE_*` overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Artifact locations and pipeline tuning.
    pub pipeline: PipelineConfig,
    /// Worker threads running inference (0 = one per available core).
    pub workers: usize,
    /// Requests that may wait for a free worker before callers block.
    pub queue_depth: usize,
    /// Largest accepted image payload, in bytes.
    pub max_image_bytes: usize,
    pub bus: Bus,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            workers: 0,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            bus: Bus::Session,
        }
    }
}

impl Config {
    /// Load from `$LOOKALIKE_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("LOOKALIKE_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env();
        config.finalize();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    fn apply_env(&mut self) {
        self.pipeline.apply_env();
        self.workers = env_usize("LOOKALIKE_WORKERS", self.workers);
        self.queue_depth = env_usize("LOOKALIKE_QUEUE_DEPTH", self.queue_depth);
        self.max_image_bytes = env_usize("LOOKALIKE_MAX_IMAGE_BYTES", self.max_image_bytes);
        if let Ok(bus) = std::env::var("LOOKALIKE_BUS") {
            self.bus = if bus.eq_ignore_ascii_case("system") { Bus::System } else { Bus::Session };
        }
    }

    /// Resolve automatic values; one classifier session per worker.
    fn finalize(&mut self) {
        if self.workers == 0 {
            self.workers = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
        }
        self.queue_depth = self.queue_depth.max(1);
        self.pipeline.classifier.sessions = self.workers;
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_overrides_nested_fields() {
        let config = Config::from_toml(
            r#"
            workers = 3
            bus = "system"

            [pipeline]
            model_dir = "/opt/lookalike"
            top_k = 3

            [pipeline.detector]
            min_face_size = 48
            "#,
        )
        .unwrap();

        assert_eq!(config.workers, 3);
        assert_eq!(config.bus, Bus::System);
        assert_eq!(config.pipeline.model_dir, PathBuf::from("/opt/lookalike"));
        assert_eq!(config.pipeline.top_k, 3);
        assert_eq!(config.pipeline.detector.min_face_size, 48);
        assert_eq!(config.pipeline.detector.window_step, 4);
        assert_eq!(config.max_image_bytes, DEFAULT_MAX_IMAGE_BYTES);
    }

    #[test]
    fn test_finalize_sizes_session_pool_to_workers() {
        let mut config = Config { workers: 0, queue_depth: 0, ..Default::default() };
        config.finalize();
        assert!(config.workers >= 1);
        assert_eq!(config.queue_depth, 1);
        assert_eq!(config.pipeline.classifier.sessions, config.workers);
    }

    #[test]
    fn test_bad_toml_rejected() {
        assert!(Config::from_toml("workers = \"many\"").is_err());
    }
}
