pub mod config;
pub mod error;
pub mod types;

pub use config::{BackoffConfig, LogFormat, RestartPolicyConfig, SentinelConfig};
pub use error::{Result, SentinelError};
pub use types::{
    Batch, FileDescriptor, PredictionResult, PredictorFailure, ScanStats, WorkerExitCause,
    WorkerKind, WorkerState, WorkerStatus,
};
