pub mod mock;
pub mod onnx;

use async_trait::async_trait;
use sentinel_core::{Batch, PredictionResult, PredictorFailure};

pub use mock::MockPredictor;
pub use onnx::OnnxPredictor;

#[derive(Debug, thiserror::Error)]
pub enum PredictorError {
    #[error("inference error: {0}")]
    Inference(String),
    #[error("predictor load error: {0}")]
    Load(String),
}

impl PredictorError {
    /// Classifies this error for the worker's retry-once policy (spec §4.4,
    /// §7): `Retryable` errors are retried once with the same batch;
    /// anything else kills the worker and the supervisor decides whether
    /// to restart it.
    pub fn disposition(&self) -> PredictorFailure {
        match self {
            PredictorError::Inference(_) => PredictorFailure::Retryable,
            PredictorError::Load(_) => PredictorFailure::Fatal,
        }
    }
}

/// Runs batched forward passes and reports per-file predictions. One
/// instance is held exclusively by a GPU worker; CPU workers may share
/// an instance when the backend documents itself re-entrant (the ONNX
/// Runtime CPU execution provider is).
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, batch: &Batch) -> Result<Vec<PredictionResult>, PredictorError>;

    fn model_version(&self) -> &str;
}
