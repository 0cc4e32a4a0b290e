use crate::engine::{EngineError, EngineHandle};
use lookalike_core::{PredictError, PredictionService};
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.lookalike.Lookalike1";
pub const OBJECT_PATH: &str = "/org/lookalike/Lookalike1";

/// D-Bus interface for the Lookalike prediction daemon.
///
/// Bus name: org.lookalike.Lookalike1
/// Object path: /org/lookalike/Lookalike1
pub struct LookalikeService {
    engine: EngineHandle,
    service: Arc<PredictionService>,
    max_image_bytes: usize,
}

impl LookalikeService {
    pub fn new(engine: EngineHandle, service: Arc<PredictionService>, max_image_bytes: usize) -> Self {
        Self {
            engine,
            service,
            max_image_bytes,
        }
    }

    fn health_json(&self) -> serde_json::Value {
        let health = self.service.health();
        serde_json::json!({
            "status": "healthy",
            "model_loaded": health.model_loaded,
            "device": health.device,
            "classes": health.classes,
            "workers": self.engine.workers(),
            "version": env!("CARGO_PKG_VERSION"),
        })
    }

    fn celebrities_json(&self) -> serde_json::Value {
        let names = self.service.celebrities();
        serde_json::json!({
            "celebrities": names,
            "total": names.len(),
        })
    }
}

#[interface(name = "org.lookalike.Lookalike1")]
impl LookalikeService {
    /// Predict the closest identities for one encoded image; returns JSON.
    async fn predict(&self, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(bytes = image.len(), "predict requested");

        if image.is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs("no image provided".into()));
        }
        if image.len() > self.max_image_bytes {
            return Err(zbus::fdo::Error::InvalidArgs(format!(
                "image is {} bytes, limit is {}",
                image.len(),
                self.max_image_bytes
            )));
        }

        let result = self.engine.predict(image).await.map_err(to_fdo_error)?;
        serde_json::to_string(&result).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// List every identity the model can recognize.
    async fn celebrities(&self) -> zbus::fdo::Result<String> {
        Ok(self.celebrities_json().to_string())
    }

    /// Return readiness and compute-device information.
    async fn health(&self) -> zbus::fdo::Result<String> {
        Ok(self.health_json().to_string())
    }
}

/// Undecodable input is the caller's fault; everything else is ours.
fn to_fdo_error(err: EngineError) -> zbus::fdo::Error {
    match err {
        EngineError::Predict(PredictError::Decode(e)) => zbus::fdo::Error::InvalidArgs(e.to_string()),
        other => {
            tracing::error!(error = %other, "prediction error");
            zbus::fdo::Error::Failed(other.to_string())
        }
    }
}
