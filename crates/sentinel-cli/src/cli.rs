use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use sentinel_core::{LogFormat, SentinelConfig};

/// Sentinel: scans a corpus of files, classifies them with a batched
/// inference predictor, and exposes Prometheus telemetry. Flags layer
/// over `--config`'s TOML file and `SENTINEL_*` environment variables
/// (spec §6, SPEC_FULL.md A1): only flags the caller actually passed
/// override the lower layers.
#[derive(Parser, Debug)]
#[command(name = "sentinel", version, about, long_about = None)]
pub struct Cli {
    /// Input directories to scan, comma-separated.
    #[arg(long, value_delimiter = ',')]
    pub roots: Option<Vec<PathBuf>>,

    /// Number of GPU-resident workers.
    #[arg(long)]
    pub gpu_workers: Option<usize>,

    /// Number of CPU-resident workers.
    #[arg(long)]
    pub cpu_workers: Option<usize>,

    /// Work queue bound.
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Result sink bound (SPEC_FULL.md Open Question 2); default is
    /// `2 x queue-capacity`.
    #[arg(long)]
    pub sink_capacity: Option<usize>,

    /// Metrics HTTP port; `0` disables the endpoint entirely.
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Path to the serialized inference artifact.
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Preferred inference backend ("cuda", "cpu", ...).
    #[arg(long)]
    pub device_preference: Option<String>,

    /// Optional TOML configuration file, layered under flags and over
    /// built-in defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Glob patterns a discovered file must match to be enqueued.
    #[arg(long, value_delimiter = ',')]
    pub include: Option<Vec<String>>,

    /// Glob patterns that exclude a discovered file from being enqueued.
    #[arg(long, value_delimiter = ',')]
    pub exclude: Option<Vec<String>>,

    /// `RUST_LOG`-style filter directive; falls back to `SentinelConfig`'s
    /// configured level when unset.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Structured log output format.
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormatArg>,

    /// How long `stop()` waits for workers to drain before escalating
    /// to a forceful abort (spec §4.5).
    #[arg(long, default_value_t = 30)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl Cli {
    /// Layers this invocation's explicitly-passed flags over the
    /// defaults/file/env-derived `SentinelConfig` (spec §6, A1: CLI
    /// flags are the top layer). Fields the caller never passed are
    /// left untouched so the lower layers still apply.
    pub fn apply_overrides(&self, mut config: SentinelConfig) -> SentinelConfig {
        if let Some(roots) = &self.roots {
            config.roots = roots.clone();
        }
        if let Some(n) = self.gpu_workers {
            config.gpu_workers = n;
        }
        if let Some(n) = self.cpu_workers {
            config.cpu_workers = n;
        }
        if let Some(n) = self.queue_capacity {
            config.queue_capacity = n;
        }
        if let Some(n) = self.sink_capacity {
            config.sink_capacity = n;
        }
        if let Some(p) = self.metrics_port {
            config.metrics_port = p;
        }
        if let Some(path) = &self.model {
            config.model_path = path.clone();
        }
        if let Some(pref) = &self.device_preference {
            config.device_preference = Some(pref.clone());
        }
        if let Some(patterns) = &self.include {
            config.include_patterns = patterns.clone();
        }
        if let Some(patterns) = &self.exclude {
            config.exclude_patterns = patterns.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.log_format = format.into();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn base_config() -> SentinelConfig {
        SentinelConfig {
            roots: vec![],
            gpu_workers: 0,
            cpu_workers: 4,
            queue_capacity: 1024,
            sink_capacity: 2048,
            metrics_port: 9090,
            model_path: PathBuf::new(),
            device_preference: None,
            backoff: Default::default(),
            restart_policy: Default::default(),
            log_format: LogFormat::Pretty,
            log_level: "info".to_string(),
            include_patterns: vec![],
            exclude_patterns: vec![],
        }
    }

    fn bare_cli() -> Cli {
        Cli {
            roots: None,
            gpu_workers: None,
            cpu_workers: None,
            queue_capacity: None,
            sink_capacity: None,
            metrics_port: None,
            model: None,
            device_preference: None,
            config: None,
            include: None,
            exclude: None,
            log_level: None,
            log_format: None,
            shutdown_timeout_secs: 30,
        }
    }

    #[test]
    fn unset_flags_leave_layered_config_untouched() {
        let merged = bare_cli().apply_overrides(base_config());
        assert_eq!(merged.cpu_workers, 4);
        assert_eq!(merged.metrics_port, 9090);
    }

    #[test]
    fn explicit_flags_override_layered_config() {
        let mut cli = bare_cli();
        cli.metrics_port = Some(0);
        cli.roots = Some(vec![PathBuf::from("/data")]);
        cli.model = Some(PathBuf::from("model.onnx"));

        let merged = cli.apply_overrides(base_config());
        assert_eq!(merged.metrics_port, 0);
        assert_eq!(merged.roots, vec![PathBuf::from("/data")]);
        assert_eq!(merged.model_path, PathBuf::from("model.onnx"));
    }
}
