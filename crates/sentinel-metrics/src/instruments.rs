use prometheus::{
    CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
};

/// File-size histogram buckets: 1KiB .. 1GiB, roughly x10 per spec §6.
pub fn file_size_buckets() -> Vec<f64> {
    vec![
        1024.0,
        10_240.0,
        102_400.0,
        1_048_576.0,
        10_485_760.0,
        104_857_600.0,
        1_073_741_824.0,
    ]
}

/// Model confidence histogram buckets: 0.1 .. 1.0 step 0.1, per spec §6.
pub fn confidence_buckets() -> Vec<f64> {
    (1..=10).map(|i| i as f64 * 0.1).collect()
}

/// Inference duration buckets, matching the `helios` original's
/// sub-second-to-tens-of-seconds spread.
pub fn duration_buckets() -> Vec<f64> {
    vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]
}

/// Every typed instrument the pipeline observes, owned by one
/// `SentinelMetrics` handle and registered into that handle's private
/// `Registry` at construction time (spec §9 REDESIGN FLAG: an injected
/// handle, never a process-wide singleton as the sole interface).
pub struct Instruments {
    pub files_processed_total: CounterVec,
    pub files_discovered_total: CounterVec,
    pub file_processing_rate: Gauge,
    pub files_in_queue: Gauge,
    pub file_size_bytes: Histogram,
    pub inference_duration_seconds: HistogramVec,
    pub batch_size: GaugeVec,
    pub model_confidence: Histogram,
    pub inference_errors_total: CounterVec,
    pub active_workers: Gauge,
    pub worker_status: GaugeVec,
    pub worker_uptime_seconds: GaugeVec,
    pub worker_restarts_total: CounterVec,
    pub queue_depth: GaugeVec,
    pub queue_operations_total: CounterVec,
    pub backpressure_events_total: CounterVec,
    pub cpu_usage_percent: Gauge,
    pub memory_usage_percent: Gauge,
    pub disk_usage_percent: GaugeVec,
    pub gpu_utilization_percent: Gauge,
    pub gpu_memory_used_bytes: Gauge,
    pub gpu_memory_total_bytes: Gauge,
    pub gpu_temperature_celsius: Gauge,
}

impl Instruments {
    /// Builds a fresh set of instruments and registers each of them
    /// into `registry`. Building fresh instances per call (rather than
    /// sharing module-level statics) is what makes two independent
    /// `SentinelMetrics` handles genuinely independent.
    pub fn build_and_register(registry: &Registry) -> prometheus::Result<Self> {
        let files_processed_total = CounterVec::new(
            Opts::new(
                "files_processed_total",
                "Total number of files processed by workers",
            ),
            &["worker", "status"],
        )?;
        let files_discovered_total = CounterVec::new(
            Opts::new(
                "files_discovered_total",
                "Total number of files discovered by the scanner",
            ),
            &["scanner"],
        )?;
        let file_processing_rate = Gauge::with_opts(Opts::new(
            "file_processing_rate_per_second",
            "Aggregate file processing rate in files per second",
        ))?;
        let files_in_queue = Gauge::with_opts(Opts::new(
            "files_in_queue",
            "Number of files currently held by the work queue",
        ))?;
        let file_size_bytes = Histogram::with_opts(
            HistogramOpts::new("file_size_bytes", "Distribution of processed file sizes")
                .buckets(file_size_buckets()),
        )?;
        let inference_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "inference_duration_seconds",
                "Wall-clock time spent per predictor batch call",
            )
            .buckets(duration_buckets()),
            &["worker", "model"],
        )?;
        let batch_size = GaugeVec::new(
            Opts::new(
                "batch_size",
                "Size of the most recent batch submitted to the predictor",
            ),
            &["worker"],
        )?;
        let model_confidence = Histogram::with_opts(
            HistogramOpts::new(
                "model_confidence",
                "Distribution of predictor confidence scores",
            )
            .buckets(confidence_buckets()),
        )?;
        let inference_errors_total = CounterVec::new(
            Opts::new("inference_errors_total", "Total number of predictor errors"),
            &["worker", "error_type"],
        )?;
        let active_workers = Gauge::with_opts(Opts::new(
            "active_workers",
            "Count of workers in the running or waiting state",
        ))?;
        let worker_status = GaugeVec::new(
            Opts::new(
                "worker_status",
                "1 for a worker's current state, 0 otherwise",
            ),
            &["worker", "state"],
        )?;
        let worker_uptime_seconds = GaugeVec::new(
            Opts::new("worker_uptime_seconds", "Worker uptime in seconds"),
            &["worker"],
        )?;
        let worker_restarts_total = CounterVec::new(
            Opts::new("worker_restarts_total", "Total number of worker restarts"),
            &["worker", "reason"],
        )?;
        let queue_depth = GaugeVec::new(
            Opts::new("queue_depth", "Current depth of a named queue"),
            &["queue"],
        )?;
        let queue_operations_total = CounterVec::new(
            Opts::new("queue_operations_total", "Total queue operations"),
            &["queue", "op"],
        )?;
        let backpressure_events_total = CounterVec::new(
            Opts::new("backpressure_events_total", "Total backpressure events"),
            &["component"],
        )?;
        let cpu_usage_percent = Gauge::with_opts(Opts::new(
            "cpu_usage_percent",
            "Host CPU utilization percentage",
        ))?;
        let memory_usage_percent = Gauge::with_opts(Opts::new(
            "memory_usage_percent",
            "Host memory utilization percentage",
        ))?;
        let disk_usage_percent = GaugeVec::new(
            Opts::new("disk_usage_percent", "Per-mount disk utilization percentage"),
            &["mount"],
        )?;
        let gpu_utilization_percent = Gauge::with_opts(Opts::new(
            "gpu_utilization_percent",
            "GPU utilization percentage",
        ))?;
        let gpu_memory_used_bytes = Gauge::with_opts(Opts::new(
            "gpu_memory_used_bytes",
            "GPU memory in use, in bytes",
        ))?;
        let gpu_memory_total_bytes = Gauge::with_opts(Opts::new(
            "gpu_memory_total_bytes",
            "Total GPU memory, in bytes",
        ))?;
        let gpu_temperature_celsius = Gauge::with_opts(Opts::new(
            "gpu_temperature_celsius",
            "GPU temperature in Celsius",
        ))?;

        registry.register(Box::new(files_processed_total.clone()))?;
        registry.register(Box::new(files_discovered_total.clone()))?;
        registry.register(Box::new(file_processing_rate.clone()))?;
        registry.register(Box::new(files_in_queue.clone()))?;
        registry.register(Box::new(file_size_bytes.clone()))?;
        registry.register(Box::new(inference_duration_seconds.clone()))?;
        registry.register(Box::new(batch_size.clone()))?;
        registry.register(Box::new(model_confidence.clone()))?;
        registry.register(Box::new(inference_errors_total.clone()))?;
        registry.register(Box::new(active_workers.clone()))?;
        registry.register(Box::new(worker_status.clone()))?;
        registry.register(Box::new(worker_uptime_seconds.clone()))?;
        registry.register(Box::new(worker_restarts_total.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(queue_operations_total.clone()))?;
        registry.register(Box::new(backpressure_events_total.clone()))?;
        registry.register(Box::new(cpu_usage_percent.clone()))?;
        registry.register(Box::new(memory_usage_percent.clone()))?;
        registry.register(Box::new(disk_usage_percent.clone()))?;
        registry.register(Box::new(gpu_utilization_percent.clone()))?;
        registry.register(Box::new(gpu_memory_used_bytes.clone()))?;
        registry.register(Box::new(gpu_memory_total_bytes.clone()))?;
        registry.register(Box::new(gpu_temperature_celsius.clone()))?;

        Ok(Self {
            files_processed_total,
            files_discovered_total,
            file_processing_rate,
            files_in_queue,
            file_size_bytes,
            inference_duration_seconds,
            batch_size,
            model_confidence,
            inference_errors_total,
            active_workers,
            worker_status,
            worker_uptime_seconds,
            worker_restarts_total,
            queue_depth,
            queue_operations_total,
            backpressure_events_total,
            cpu_usage_percent,
            memory_usage_percent,
            disk_usage_percent,
            gpu_utilization_percent,
            gpu_memory_used_bytes,
            gpu_memory_total_bytes,
            gpu_temperature_celsius,
        })
    }
}
