use lookalike_core::{PredictError, PredictionResult, PredictionService};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Predict(#[from] PredictError),
    #[error("engine workers exited")]
    ChannelClosed,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from D-Bus handlers to the worker pool.
enum EngineRequest {
    Predict {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<PredictionResult, PredictError>>,
    },
}

/// Clone-safe handle to the worker pool.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    workers: usize,
}

impl EngineHandle {
    /// Queue one image for prediction and wait for its result.
    pub async fn predict(&self, image: Vec<u8>) -> Result<PredictionResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Predict {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

/// Spawn `workers` dedicated OS threads sharing one request queue.
///
/// Inference is CPU-bound and never runs on the async executor. Each worker
/// takes the next request, runs it against the shared service, and replies.
pub fn spawn_engine(
    service: Arc<PredictionService>,
    workers: usize,
    queue_depth: usize,
) -> Result<EngineHandle, EngineError> {
    let workers = workers.max(1);
    let (tx, rx) = mpsc::channel::<EngineRequest>(queue_depth.max(1));
    let rx = Arc::new(Mutex::new(rx));

    for id in 0..workers {
        let rx = Arc::clone(&rx);
        let service = Arc::clone(&service);
        std::thread::Builder::new()
            .name(format!("lookalike-worker-{id}"))
            .spawn(move || {
                tracing::debug!(worker = id, "worker started");
                loop {
                    // Hold the lock only while waiting for the next request.
                    let next = rx.lock().unwrap_or_else(PoisonError::into_inner).blocking_recv();
                    let Some(req) = next else { break };
                    match req {
                        EngineRequest::Predict { image, reply } => {
                            let result = service.predict(&image);
                            if let Err(err) = &result {
                                tracing::warn!(worker = id, error = %err, "prediction failed");
                            }
                            // Caller may have given up; nothing to do then.
                            let _ = reply.send(result);
                        }
                    }
                }
                tracing::debug!(worker = id, "worker exiting");
            })?;
    }

    tracing::info!(workers, queue_depth, "engine started");
    Ok(EngineHandle { tx, workers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookalike_core::{
        ClassifyError, DecodeError, DetectionResult, FaceLocator, IdentityClassifier,
        ImageNormalizer, LabelMap, NormalizedTensor, ProbabilityVector,
    };

    struct NoFace;

    impl FaceLocator for NoFace {
        fn locate(&self, _: &image::DynamicImage) -> Result<DetectionResult, DecodeError> {
            Ok(DetectionResult::NotFound)
        }
    }

    struct Uniform;

    impl IdentityClassifier for Uniform {
        fn classify(&self, _: &NormalizedTensor) -> Result<ProbabilityVector, ClassifyError> {
            Ok(ProbabilityVector::from_logits(&[0.0; 3]))
        }
        fn num_classes(&self) -> usize {
            3
        }
        fn input_shape(&self) -> [usize; 4] {
            [1, 3, 224, 224]
        }
    }

    fn service() -> Arc<PredictionService> {
        Arc::new(
            PredictionService::new(
                Box::new(NoFace),
                ImageNormalizer::default(),
                Box::new(Uniform),
                LabelMap::from_names(["a", "b", "c"]).unwrap(),
                5,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_decode_error_round_trips_through_pool() {
        let engine = spawn_engine(service(), 2, 4).unwrap();
        let err = engine.predict(b"nope".to_vec()).await.unwrap_err();
        assert!(matches!(err, EngineError::Predict(PredictError::Decode(_))));
    }

    #[tokio::test]
    async fn test_many_requests_served() {
        let engine = spawn_engine(service(), 3, 2).unwrap();
        let mut png = std::io::Cursor::new(Vec::new());
        image::DynamicImage::new_rgb8(40, 40)
            .write_to(&mut png, image::ImageFormat::Png)
            .unwrap();
        let bytes = png.into_inner();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            let bytes = bytes.clone();
            tasks.push(tokio::spawn(async move { engine.predict(bytes).await }));
        }
        for task in tasks {
            let result = task.await.unwrap().unwrap();
            assert!(!result.face_detected);
            assert_eq!(result.top_predictions.len(), 3);
            assert_eq!(result.predicted_celebrity, "a");
        }
        assert_eq!(engine.workers(), 3);
    }
}
