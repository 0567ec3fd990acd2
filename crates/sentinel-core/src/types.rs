use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// An immutable record naming a file and its essential attributes.
/// Created by the Scanner, moved into exactly one Worker, never mutated.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub discovered_at: Instant,
    pub extension: Option<String>,
}

impl FileDescriptor {
    pub fn new(path: PathBuf, size_bytes: u64, extension: Option<String>) -> Self {
        Self {
            path,
            size_bytes,
            discovered_at: Instant::now(),
            extension,
        }
    }
}

/// A contiguous group of descriptors submitted to the predictor as one
/// inference call. Transient: created in a Worker, destroyed when the
/// Predictor returns.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub files: Vec<FileDescriptor>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// One outcome per input FileDescriptor, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub source_path: PathBuf,
    pub category_path: String,
    pub confidence: f32,
    pub tags: Vec<String>,
    pub model_version: String,
}

/// The device class a worker targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerKind {
    Gpu,
    Cpu,
}

impl WorkerKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerKind::Gpu => "gpu",
            WorkerKind::Cpu => "cpu",
        }
    }

    /// Default maximum batch size for this worker kind (spec §3).
    pub fn default_max_batch(&self) -> usize {
        match self {
            WorkerKind::Gpu => 64,
            WorkerKind::Cpu => 32,
        }
    }
}

/// Worker lifecycle state (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Starting,
    Running,
    Waiting,
    Stopping,
    Stopped,
    Error,
}

impl WorkerStatus {
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Running => "running",
            WorkerStatus::Waiting => "waiting",
            WorkerStatus::Stopping => "stopping",
            WorkerStatus::Stopped => "stopped",
            WorkerStatus::Error => "error",
        }
    }

    /// The states the `worker_status` metric enumerates (spec §6):
    /// `waiting` is an internal `WorkerState.status` value used for the
    /// UI's worker-state stream, but has no series of its own on the
    /// exported gauge — `original_source/helios/metrics/prometheus_metrics.py`
    /// has no `waiting` state either. Use `Self::for_export` to map a
    /// live status onto one of these before publishing it.
    pub const EXPORTED: [WorkerStatus; 5] = [
        WorkerStatus::Starting,
        WorkerStatus::Running,
        WorkerStatus::Stopping,
        WorkerStatus::Stopped,
        WorkerStatus::Error,
    ];

    /// Collapses `Waiting` onto `Running` for the exported `worker_status`
    /// gauge; every other state passes through unchanged.
    pub fn for_export(&self) -> WorkerStatus {
        match self {
            WorkerStatus::Waiting => WorkerStatus::Running,
            other => *other,
        }
    }
}

/// Per-worker snapshot record, readable by the metrics subsystem and the
/// UI's worker-state stream. Mutated only by the owning worker and the
/// supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerState {
    pub id: u32,
    pub kind: WorkerKind,
    pub status: WorkerStatus,
    pub current_batch_size: usize,
    pub files_processed: u64,
    pub throughput_files_per_sec: f64,
    pub memory_resident_bytes: u64,
    pub last_error: Option<String>,
    pub boot_timestamp: chrono::DateTime<chrono::Utc>,
}

impl WorkerState {
    pub fn new(id: u32, kind: WorkerKind) -> Self {
        Self {
            id,
            kind,
            status: WorkerStatus::Starting,
            current_batch_size: 0,
            files_processed: 0,
            throughput_files_per_sec: 0.0,
            memory_resident_bytes: 0,
            last_error: None,
            boot_timestamp: chrono::Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> f64 {
        (chrono::Utc::now() - self.boot_timestamp)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0
    }
}

/// Disposition of a predictor error, distinguishing a retryable batch
/// failure from one that kills the worker (spec §4.3, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictorFailure {
    Retryable,
    Fatal,
}

/// Ambient summary of a completed scan run, logged at INFO and used to
/// cross-check the conservation invariant at shutdown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStats {
    pub roots_walked: usize,
    pub files_discovered: u64,
    pub bytes_discovered: u64,
    pub io_errors_skipped: u64,
}

/// The cause reported by a worker task on exit, read by the supervisor
/// to decide whether to restart (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExitCause {
    Panic,
    FatalError,
    Shutdown,
}
