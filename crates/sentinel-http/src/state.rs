use std::sync::Arc;

use sentinel_metrics::SentinelMetrics;
use sentinel_pipeline::Supervisor;

/// Shared state handed to every route handler. Mirrors the teacher's
/// `AppState` idiom: a small `Clone`-able struct of `Arc`-backed
/// handles, never a reach-through to process-wide statics.
#[derive(Clone)]
pub struct AppState {
    pub metrics: SentinelMetrics,
    pub supervisor: Arc<Supervisor>,
}

impl AppState {
    pub fn new(metrics: SentinelMetrics, supervisor: Arc<Supervisor>) -> Self {
        Self { metrics, supervisor }
    }
}
