pub mod instruments;
pub mod probe;

use prometheus::{Encoder, Registry, TextEncoder};
use sentinel_core::{WorkerKind, WorkerStatus};

pub use instruments::Instruments;
pub use probe::SystemProbe;

/// An injected handle onto one private Prometheus registry plus the
/// typed instruments registered into it (spec §9 REDESIGN FLAG: callers
/// receive a handle, never reach through a process-wide global to
/// observe a metric). Cheap to clone: `Registry` and every instrument
/// type are internally `Arc`-backed.
#[derive(Clone)]
pub struct SentinelMetrics {
    registry: Registry,
    instruments: std::sync::Arc<Instruments>,
}

impl SentinelMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let instruments = Instruments::build_and_register(&registry)?;
        register_process_collector(&registry);
        Ok(Self {
            registry,
            instruments: std::sync::Arc::new(instruments),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders the registry's current state as Prometheus text
    /// exposition format (version 0.0.4), for the `/metrics` route.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf)?;
        Ok(String::from_utf8(buf).expect("prometheus text encoder always emits valid utf8"))
    }

    pub fn record_file_processed(&self, worker: &str, status: &str) {
        self.instruments
            .files_processed_total
            .with_label_values(&[worker, status])
            .inc();
    }

    pub fn record_files_discovered(&self, scanner: &str, count: u64) {
        self.instruments
            .files_discovered_total
            .with_label_values(&[scanner])
            .inc_by(count as f64);
    }

    pub fn set_file_processing_rate(&self, files_per_sec: f64) {
        self.instruments.file_processing_rate.set(files_per_sec);
    }

    pub fn set_files_in_queue(&self, depth: usize) {
        self.instruments.files_in_queue.set(depth as f64);
    }

    pub fn observe_file_size(&self, bytes: u64) {
        self.instruments.file_size_bytes.observe(bytes as f64);
    }

    pub fn observe_inference_duration(&self, worker: &str, model: &str, seconds: f64) {
        self.instruments
            .inference_duration_seconds
            .with_label_values(&[worker, model])
            .observe(seconds);
    }

    pub fn set_batch_size(&self, worker: &str, size: usize) {
        self.instruments
            .batch_size
            .with_label_values(&[worker])
            .set(size as f64);
    }

    pub fn observe_confidence(&self, confidence: f32) {
        self.instruments.model_confidence.observe(confidence as f64);
    }

    pub fn record_inference_error(&self, worker: &str, error_type: &str) {
        self.instruments
            .inference_errors_total
            .with_label_values(&[worker, error_type])
            .inc();
    }

    pub fn set_active_workers(&self, count: usize) {
        self.instruments.active_workers.set(count as f64);
    }

    /// Sets `worker_status{worker,state="<status>"}` to 1 and every other
    /// exported state for the same worker to 0, matching a `Gauge`-backed
    /// state machine (the original's `prometheus_client` `Enum` has no
    /// direct equivalent in the `prometheus` crate). `status` is mapped
    /// through `WorkerStatus::for_export` first, so `Waiting` publishes
    /// as `running` — spec §6 enumerates exactly
    /// `{starting, running, stopping, stopped, error}`.
    pub fn set_worker_status(&self, worker: &str, status: WorkerStatus) {
        let exported = status.for_export();
        for candidate in WorkerStatus::EXPORTED {
            let value = if candidate == exported { 1.0 } else { 0.0 };
            self.instruments
                .worker_status
                .with_label_values(&[worker, candidate.as_label()])
                .set(value);
        }
    }

    pub fn set_worker_uptime(&self, worker: &str, seconds: f64) {
        self.instruments
            .worker_uptime_seconds
            .with_label_values(&[worker])
            .set(seconds);
    }

    pub fn record_worker_restart(&self, worker: &str, reason: &str) {
        self.instruments
            .worker_restarts_total
            .with_label_values(&[worker, reason])
            .inc();
    }

    pub fn set_queue_depth(&self, queue: &str, depth: usize) {
        self.instruments
            .queue_depth
            .with_label_values(&[queue])
            .set(depth as f64);
    }

    pub fn record_queue_operation(&self, queue: &str, op: &str) {
        self.instruments
            .queue_operations_total
            .with_label_values(&[queue, op])
            .inc();
    }

    pub fn record_backpressure_event(&self, component: &str) {
        self.instruments
            .backpressure_events_total
            .with_label_values(&[component])
            .inc();
    }

    pub fn set_cpu_usage_percent(&self, pct: f64) {
        self.instruments.cpu_usage_percent.set(pct);
    }

    pub fn set_memory_usage_percent(&self, pct: f64) {
        self.instruments.memory_usage_percent.set(pct);
    }

    pub fn set_disk_usage_percent(&self, mount: &str, pct: f64) {
        self.instruments
            .disk_usage_percent
            .with_label_values(&[mount])
            .set(pct);
    }

    pub fn set_gpu_utilization_percent(&self, pct: f64) {
        self.instruments.gpu_utilization_percent.set(pct);
    }

    pub fn set_gpu_memory_used_bytes(&self, bytes: u64) {
        self.instruments.gpu_memory_used_bytes.set(bytes as f64);
    }

    pub fn set_gpu_memory_total_bytes(&self, bytes: u64) {
        self.instruments.gpu_memory_total_bytes.set(bytes as f64);
    }

    pub fn set_gpu_temperature_celsius(&self, celsius: f64) {
        self.instruments.gpu_temperature_celsius.set(celsius);
    }
}

/// Label helper so callers never hand-format `"worker-{id}"` differently
/// in two places.
pub fn worker_label(kind: WorkerKind, id: u32) -> String {
    format!("{}-{}", kind.as_label(), id)
}

/// Registers the `prometheus` crate's own `process_*` family (RSS, open
/// fds, start time, ...) alongside the pipeline's own instruments —
/// ambient process-level observability the teacher's workspace already
/// carries via the `process` feature of the `prometheus` crate, never
/// read by pipeline logic itself. Only available on Linux, where the
/// collector reads `/proc/self`; silently omitted elsewhere.
#[cfg(target_os = "linux")]
fn register_process_collector(registry: &Registry) {
    let collector = prometheus::process_collector::ProcessCollector::for_self();
    if let Err(e) = registry.register(Box::new(collector)) {
        tracing::warn!(error = %e, "failed to register process metrics collector");
    }
}

#[cfg(not(target_os = "linux"))]
fn register_process_collector(_registry: &Registry) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_handles_are_independent_registries() {
        let a = SentinelMetrics::new().unwrap();
        let b = SentinelMetrics::new().unwrap();
        a.record_file_processed("cpu-0", "ok");
        let a_text = a.encode_text().unwrap();
        let b_text = b.encode_text().unwrap();
        assert!(a_text.contains("files_processed_total"));
        assert!(!b_text.contains("cpu-0"));
    }

    #[test]
    fn worker_status_gauge_is_one_hot() {
        let m = SentinelMetrics::new().unwrap();
        m.set_worker_status("gpu-0", WorkerStatus::Running);
        let text = m.encode_text().unwrap();
        assert!(text.contains("worker_status{state=\"running\",worker=\"gpu-0\"} 1"));
        assert!(text.contains("worker_status{state=\"starting\",worker=\"gpu-0\"} 0"));
    }

    #[test]
    fn worker_status_waiting_collapses_onto_running() {
        let m = SentinelMetrics::new().unwrap();
        m.set_worker_status("cpu-0", WorkerStatus::Waiting);
        let text = m.encode_text().unwrap();
        assert!(text.contains("worker_status{state=\"running\",worker=\"cpu-0\"} 1"));
        assert!(!text.contains("state=\"waiting\""));
    }

    #[test]
    fn text_export_carries_help_and_type_lines() {
        let m = SentinelMetrics::new().unwrap();
        m.observe_file_size(4096);
        let text = m.encode_text().unwrap();
        assert!(text.contains("# HELP file_size_bytes"));
        assert!(text.contains("# TYPE file_size_bytes histogram"));
    }

    #[test]
    fn worker_label_formats_kind_and_id() {
        assert_eq!(worker_label(WorkerKind::Gpu, 2), "gpu-2");
        assert_eq!(worker_label(WorkerKind::Cpu, 0), "cpu-0");
    }

    /// `SentinelMetrics`'s own methods take fixed label tuples, so a
    /// wrong label *count* can't compile through them. That guarantee
    /// stops at the `prometheus` crate's boundary: `with_label_values`
    /// takes `&[&str]` and only panics at runtime if the count doesn't
    /// match the vec's declared label names. There is no equivalent
    /// guard for a wrong label *value* (e.g. a typo'd worker name) —
    /// `prometheus` has no concept of a closed value set for a label,
    /// so that stays open by design, same as the teacher's `lazy_static`
    /// instruments.
    #[test]
    #[should_panic(expected = "inconsistent label cardinality")]
    fn mismatched_label_count_panics_at_the_prometheus_boundary() {
        let m = SentinelMetrics::new().unwrap();
        m.instruments
            .files_processed_total
            .with_label_values(&["only-one-label"]);
    }
}
