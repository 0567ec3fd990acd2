use thiserror::Error;

/// Unifying error taxonomy for the pipeline (spec §7).
///
/// Library call sites return `Result<T, SentinelError>`; the binary's
/// outer edge wraps these in `anyhow::Result` and reads `exit_code()`
/// on the way out.
#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("work queue is full")]
    QueueFull,

    #[error("work queue is closed")]
    QueueClosed,

    #[error("predictor failed to load artifact: {0}")]
    LoadError(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("fatal predictor error: {0}")]
    Fatal(String),

    #[error("scanner aborted on root-level access error: {0}")]
    ScanRootError(String),
}

impl SentinelError {
    /// Process exit code per spec §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            SentinelError::Configuration(_) => 2,
            SentinelError::LoadError(_) => 3,
            SentinelError::Io(_)
            | SentinelError::QueueFull
            | SentinelError::QueueClosed
            | SentinelError::Inference(_)
            | SentinelError::Fatal(_)
            | SentinelError::ScanRootError(_) => 4,
        }
    }
}

pub type Result<T> = std::result::Result<T, SentinelError>;
