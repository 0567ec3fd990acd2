use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;

use sentinel_core::{
    Batch, PredictorFailure, WorkerExitCause, WorkerKind, WorkerState, WorkerStatus,
};
use sentinel_metrics::{worker_label, SentinelMetrics};
use sentinel_predictor::{Predictor, PredictorError};
use sentinel_queue::{TakeResult, WorkQueue};

use crate::sink::ResultSink;

/// Above this blocking time on `queue.take`, the worker reports itself
/// as `waiting` rather than `running` (spec §4.4).
const WAITING_THRESHOLD: Duration = Duration::from_millis(50);

/// EWMA smoothing factor for the worker's throughput estimate (spec §4.4).
const THROUGHPUT_ALPHA: f64 = 0.2;

/// One pipeline worker: pulls a batch, calls the predictor, writes
/// results, and publishes its own `WorkerState` for the supervisor and
/// metrics subsystem to read lock-free.
pub struct Worker {
    id: u32,
    kind: WorkerKind,
    max_batch: usize,
    queue: WorkQueue,
    sink: ResultSink,
    predictor: Arc<dyn Predictor>,
    metrics: SentinelMetrics,
    state: Arc<ArcSwap<WorkerState>>,
}

impl Worker {
    pub fn new(
        id: u32,
        kind: WorkerKind,
        max_batch: usize,
        queue: WorkQueue,
        sink: ResultSink,
        predictor: Arc<dyn Predictor>,
        metrics: SentinelMetrics,
        state: Arc<ArcSwap<WorkerState>>,
    ) -> Self {
        Self {
            id,
            kind,
            max_batch,
            queue,
            sink,
            predictor,
            metrics,
            state,
        }
    }

    fn label(&self) -> String {
        worker_label(self.kind, self.id)
    }

    fn publish(&self, f: impl FnOnce(&mut WorkerState)) {
        let mut next = (*self.state.load_full()).clone();
        f(&mut next);
        self.state.store(Arc::new(next));
    }

    fn set_status(&self, status: WorkerStatus) {
        self.publish(|s| s.status = status);
        self.metrics.set_worker_status(&self.label(), status);
    }

    /// Runs until the work queue is closed and drained. Returns the
    /// cause the supervisor should use to decide on a restart.
    pub async fn run(self) -> WorkerExitCause {
        self.set_status(WorkerStatus::Starting);
        self.set_status(WorkerStatus::Running);

        loop {
            let batch = match self.next_batch().await {
                Some(batch) => batch,
                None => break,
            };

            self.metrics.set_batch_size(&self.label(), batch.len());
            self.publish(|s| s.current_batch_size = batch.len());

            let started = Instant::now();
            let outcome = self.predict_with_retry(&batch).await;
            self.metrics.observe_inference_duration(
                &self.label(),
                self.predictor.model_version(),
                started.elapsed().as_secs_f64(),
            );

            match outcome {
                Ok(results) => {
                    self.record_success(&batch, results).await;
                    self.record_throughput(batch.len(), started.elapsed());
                }
                Err(e) if e.disposition() == PredictorFailure::Fatal => {
                    self.record_batch_error(&batch);
                    self.publish(|s| s.last_error = Some(e.to_string()));
                    self.set_status(WorkerStatus::Error);
                    tracing::error!(
                        worker = %self.label(),
                        error = %e,
                        "fatal predictor error, worker exiting"
                    );
                    return WorkerExitCause::FatalError;
                }
                Err(e) => {
                    self.record_batch_error(&batch);
                    tracing::error!(
                        worker = %self.label(),
                        error = %e,
                        "inference retries exhausted, batch marked as error"
                    );
                }
            }
        }

        self.set_status(WorkerStatus::Stopping);
        self.set_status(WorkerStatus::Stopped);
        WorkerExitCause::Shutdown
    }

    /// Blocks on `queue.take`, surfacing a `waiting` status if it takes
    /// longer than `WAITING_THRESHOLD`, then opportunistically drains up
    /// to `max_batch - 1` further descriptors without blocking (spec
    /// §4.4 steps 1-2). Returns `None` once the queue is closed and
    /// drained.
    async fn next_batch(&self) -> Option<Batch> {
        let queue = self.queue.clone();
        let mut take_fut = tokio::task::spawn_blocking(move || queue.take(|| false));

        let take_result = tokio::select! {
            res = &mut take_fut => res.expect("queue take task panicked"),
            _ = tokio::time::sleep(WAITING_THRESHOLD) => {
                self.set_status(WorkerStatus::Waiting);
                take_fut.await.expect("queue take task panicked")
            }
        };

        let first = match take_result {
            TakeResult::Closed => return None,
            TakeResult::Item(d) => d,
        };
        self.set_status(WorkerStatus::Running);

        let mut files = vec![first];
        while files.len() < self.max_batch {
            match self.queue.try_take() {
                Some(d) => files.push(d),
                None => break,
            }
        }
        Some(Batch { files })
    }

    /// Calls the predictor, retrying once on a retryable error (spec
    /// §4.3-§4.4, §7).
    async fn predict_with_retry(
        &self,
        batch: &Batch,
    ) -> Result<Vec<sentinel_core::PredictionResult>, PredictorError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.predictor.predict(batch).await {
                Ok(results) => return Ok(results),
                Err(e) => {
                    self.metrics
                        .record_inference_error(&self.label(), predictor_error_label(&e));
                    if e.disposition() == PredictorFailure::Retryable && attempt < 2 {
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Records per-file metrics inline, then hands the actual sink writes
    /// to `spawn_blocking`: `ResultSink::write` is a blocking
    /// `crossbeam_channel::send` and must never run directly on a tokio
    /// worker thread.
    async fn record_success(&self, batch: &Batch, results: Vec<sentinel_core::PredictionResult>) {
        for (file, result) in batch.files.iter().zip(results.iter()) {
            self.metrics.observe_file_size(file.size_bytes);
            self.metrics.observe_confidence(result.confidence);
            self.metrics.record_file_processed(&self.label(), "success");
        }

        let sink = self.sink.clone();
        let write_result = tokio::task::spawn_blocking(move || {
            for result in results {
                if sink.write(result).is_err() {
                    return Err(());
                }
            }
            Ok(())
        })
        .await;

        match write_result {
            Ok(Ok(())) => {}
            Ok(Err(())) => {
                tracing::warn!(worker = %self.label(), "result sink closed, dropping result");
            }
            Err(e) => {
                tracing::error!(worker = %self.label(), error = %e, "result sink write task panicked");
            }
        }
    }

    fn record_batch_error(&self, batch: &Batch) {
        for _file in &batch.files {
            self.metrics.record_file_processed(&self.label(), "error");
        }
    }

    fn record_throughput(&self, batch_len: usize, elapsed: Duration) {
        let rate = batch_len as f64 / elapsed.as_secs_f64().max(0.001);
        self.publish(|s| {
            s.throughput_files_per_sec = if s.files_processed == 0 {
                rate
            } else {
                THROUGHPUT_ALPHA * rate + (1.0 - THROUGHPUT_ALPHA) * s.throughput_files_per_sec
            };
            s.files_processed += batch_len as u64;
        });
    }
}

fn predictor_error_label(e: &PredictorError) -> &'static str {
    match e {
        PredictorError::Inference(_) => "inference_error",
        PredictorError::Load(_) => "load_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::FileDescriptor;
    use sentinel_predictor::MockPredictor;
    use sentinel_queue::OfferResult;
    use std::path::PathBuf;

    fn new_worker(
        max_batch: usize,
        predictor: Arc<dyn Predictor>,
    ) -> (Worker, WorkQueue, crate::sink::ResultSource) {
        let metrics = SentinelMetrics::new().unwrap();
        let queue = WorkQueue::new(16, metrics.clone(), "work");
        let (sink, source) = crate::sink::result_channel(16);
        let state = Arc::new(ArcSwap::from_pointee(WorkerState::new(0, WorkerKind::Cpu)));
        let worker = Worker::new(
            0,
            WorkerKind::Cpu,
            max_batch,
            queue.clone(),
            sink,
            predictor,
            metrics,
            state,
        );
        (worker, queue, source)
    }

    #[tokio::test]
    async fn processes_single_file_to_success() {
        let (worker, queue, source) = new_worker(32, Arc::new(MockPredictor::new()));
        assert_eq!(
            queue.offer(FileDescriptor::new(PathBuf::from("a"), 10, None)),
            OfferResult::Accepted
        );
        queue.close();
        let cause = worker.run().await;
        assert_eq!(cause, WorkerExitCause::Shutdown);
        assert!(source.try_recv().is_some());
    }

    #[tokio::test]
    async fn opportunistic_batch_drains_up_to_max() {
        let (worker, queue, source) = new_worker(2, Arc::new(MockPredictor::new()));
        for i in 0..3 {
            queue.offer(FileDescriptor::new(PathBuf::from(format!("f{i}")), 1, None));
        }
        queue.close();
        worker.run().await;
        let mut count = 0;
        while source.try_recv().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn retryable_failure_exhausted_marks_files_error_but_keeps_running() {
        let predictor: Arc<dyn Predictor> =
            Arc::new(MockPredictor::new().with_failure_every_nth_call(1));
        let (worker, queue, source) = new_worker(8, predictor);
        queue.offer(FileDescriptor::new(PathBuf::from("a"), 1, None));
        queue.close();
        let cause = worker.run().await;
        assert_eq!(cause, WorkerExitCause::Shutdown);
        assert!(source.try_recv().is_none());
    }

    #[tokio::test]
    async fn fatal_load_error_kills_worker() {
        let predictor: Arc<dyn Predictor> = Arc::new(FatalPredictor);
        let (worker, queue, _source) = new_worker(8, predictor);
        queue.offer(FileDescriptor::new(PathBuf::from("a"), 1, None));
        queue.close();
        let cause = worker.run().await;
        assert_eq!(cause, WorkerExitCause::FatalError);
    }

    struct FatalPredictor;

    #[async_trait::async_trait]
    impl Predictor for FatalPredictor {
        async fn predict(
            &self,
            _batch: &Batch,
        ) -> Result<Vec<sentinel_core::PredictionResult>, PredictorError> {
            Err(PredictorError::Load("model unloaded".into()))
        }

        fn model_version(&self) -> &str {
            "fatal-test"
        }
    }
}
