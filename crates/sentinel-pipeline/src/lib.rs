pub mod scanner;
pub mod sink;
pub mod supervisor;
pub mod worker;

pub use scanner::{run_scanner, ScannerConfig};
pub use sink::{result_channel, ResultSink, ResultSource};
pub use supervisor::{Supervisor, WorkerSpec};
pub use worker::Worker;
