use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sentinel_core::{Batch, PredictionResult};

use crate::{Predictor, PredictorError};

/// Deterministic predictor for the test harness (spec §8, scenarios
/// S3-S6). Never shipped in the production binary's default wiring.
///
/// `fail_every_nth_call` models transient inference errors (S4): every
/// Nth call returns `Err`, every other call succeeds. `panic_on_call`
/// models a worker crash (S5): the given call index panics instead of
/// returning, so the caller's task aborts exactly once.
pub struct MockPredictor {
    model_version: String,
    category: String,
    confidence: f32,
    latency: Duration,
    fail_every_nth_call: Option<usize>,
    panic_on_call: Option<usize>,
    call_count: AtomicUsize,
}

impl Default for MockPredictor {
    fn default() -> Self {
        Self {
            model_version: "mock-v1".to_string(),
            category: "documents".to_string(),
            confidence: 0.9,
            latency: Duration::ZERO,
            fail_every_nth_call: None,
            panic_on_call: None,
            call_count: AtomicUsize::new(0),
        }
    }
}

impl MockPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_failure_every_nth_call(mut self, n: usize) -> Self {
        self.fail_every_nth_call = Some(n);
        self
    }

    pub fn with_panic_on_call(mut self, call_index: usize) -> Self {
        self.panic_on_call = Some(call_index);
        self
    }

    pub fn calls_made(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Predictor for MockPredictor {
    async fn predict(&self, batch: &Batch) -> Result<Vec<PredictionResult>, PredictorError> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;

        if self.panic_on_call == Some(call) {
            panic!("MockPredictor: injected panic on call {call}");
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(n) = self.fail_every_nth_call {
            if n != 0 && call % n == 0 {
                return Err(PredictorError::Inference(format!(
                    "mock forced failure on call {call}"
                )));
            }
        }

        Ok(batch
            .files
            .iter()
            .map(|f| PredictionResult {
                source_path: f.path.clone(),
                category_path: self.category.clone(),
                confidence: self.confidence,
                tags: f.extension.clone().into_iter().collect(),
                model_version: self.model_version.clone(),
            })
            .collect())
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::FileDescriptor;

    fn batch_of(n: usize) -> Batch {
        Batch {
            files: (0..n)
                .map(|i| FileDescriptor::new(format!("f{i}").into(), 100, None))
                .collect(),
        }
    }

    #[tokio::test]
    async fn predicts_one_result_per_file() {
        let predictor = MockPredictor::new();
        let results = predictor.predict(&batch_of(3)).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn fails_every_nth_call_then_succeeds() {
        let predictor = MockPredictor::new().with_failure_every_nth_call(2);
        assert!(predictor.predict(&batch_of(1)).await.is_ok());
        assert!(predictor.predict(&batch_of(1)).await.is_err());
        assert!(predictor.predict(&batch_of(1)).await.is_ok());
    }

    #[tokio::test]
    #[should_panic(expected = "injected panic")]
    async fn panics_on_configured_call() {
        let predictor = MockPredictor::new().with_panic_on_call(1);
        let _ = predictor.predict(&batch_of(1)).await;
    }
}
