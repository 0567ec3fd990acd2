use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SentinelError};

/// Scanner backoff on `rejected-full` (spec §4.2). Shape mirrors the
/// teacher's watch-daemon `BackoffConfig`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BackoffConfig {
    #[serde(default = "BackoffConfig::default_initial_ms")]
    pub initial_ms: u64,
    #[serde(default = "BackoffConfig::default_max_ms")]
    pub max_ms: u64,
    #[serde(default = "BackoffConfig::default_multiplier")]
    pub multiplier: f64,
}

impl BackoffConfig {
    fn default_initial_ms() -> u64 {
        5
    }
    fn default_max_ms() -> u64 {
        250
    }
    fn default_multiplier() -> f64 {
        2.0
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: Self::default_initial_ms(),
            max_ms: Self::default_max_ms(),
            multiplier: Self::default_multiplier(),
        }
    }
}

/// Restart-budget policy for the supervisor (spec §4.5): at most `R`
/// restarts per worker slot per `W` seconds before the slot is disabled.
/// Shape mirrors the teacher's `CircuitBreakerConfig`, repurposed as a
/// restart breaker rather than a request breaker.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RestartPolicyConfig {
    #[serde(default = "RestartPolicyConfig::default_max_restarts")]
    pub max_restarts: u32,
    #[serde(default = "RestartPolicyConfig::default_window_secs")]
    pub window_secs: u64,
}

impl RestartPolicyConfig {
    fn default_max_restarts() -> u32 {
        5
    }
    fn default_window_secs() -> u64 {
        60
    }
}

impl Default for RestartPolicyConfig {
    fn default() -> Self {
        Self {
            max_restarts: Self::default_max_restarts(),
            window_secs: Self::default_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Pretty
    }
}

/// Top-level, validated process configuration. Loaded by layering
/// defaults, an optional TOML file, `SENTINEL_*` environment variables,
/// and finally CLI flag overrides applied by the binary crate.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SentinelConfig {
    pub roots: Vec<PathBuf>,
    #[serde(default = "SentinelConfig::default_gpu_workers")]
    pub gpu_workers: usize,
    #[serde(default = "SentinelConfig::default_cpu_workers")]
    pub cpu_workers: usize,
    #[serde(default = "SentinelConfig::default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "SentinelConfig::default_sink_capacity")]
    pub sink_capacity: usize,
    #[serde(default = "SentinelConfig::default_metrics_port")]
    pub metrics_port: u16,
    pub model_path: PathBuf,
    #[serde(default)]
    pub device_preference: Option<String>,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub restart_policy: RestartPolicyConfig,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "SentinelConfig::default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl SentinelConfig {
    fn default_gpu_workers() -> usize {
        0
    }
    fn default_cpu_workers() -> usize {
        num_cpus::get().max(1)
    }
    fn default_queue_capacity() -> usize {
        1024
    }
    fn default_sink_capacity() -> usize {
        Self::default_queue_capacity() * 2
    }
    fn default_metrics_port() -> u16 {
        9090
    }
    fn default_log_level() -> String {
        "info".to_string()
    }

    /// Layer defaults < TOML file < `SENTINEL_*` environment variables,
    /// then validate. Convenience for callers with no further (e.g. CLI
    /// flag) overrides to apply; binaries that layer CLI flags on top
    /// should call `load_layered` instead and validate once flags are
    /// merged in.
    pub fn load(file: Option<&PathBuf>) -> Result<Self> {
        let cfg = Self::load_layered(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Layer defaults < TOML file < `SENTINEL_*` environment variables,
    /// without validating. CLI flag overrides are applied by the caller
    /// after this returns; the caller is responsible for calling
    /// `validate()` once the final config is assembled.
    pub fn load_layered(file: Option<&PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(
            &serde_json::json!({
                "gpu_workers": Self::default_gpu_workers(),
                "cpu_workers": Self::default_cpu_workers(),
                "queue_capacity": Self::default_queue_capacity(),
                "sink_capacity": Self::default_sink_capacity(),
                "metrics_port": Self::default_metrics_port(),
                "log_level": Self::default_log_level(),
                "roots": Vec::<String>::new(),
                "model_path": "",
            }),
        )
        .map_err(|e| SentinelError::Configuration(e.to_string()))?);

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SENTINEL")
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder
            .build()
            .map_err(|e| SentinelError::Configuration(e.to_string()))?;

        let cfg: SentinelConfig = raw
            .try_deserialize()
            .map_err(|e| SentinelError::Configuration(e.to_string()))?;

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.roots.is_empty() {
            return Err(SentinelError::Configuration(
                "at least one --roots entry is required".into(),
            ));
        }
        if self.gpu_workers == 0 && self.cpu_workers == 0 {
            return Err(SentinelError::Configuration(
                "at least one of --gpu-workers / --cpu-workers must be non-zero".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(SentinelError::Configuration(
                "--queue-capacity must be greater than zero".into(),
            ));
        }
        if self.model_path.as_os_str().is_empty() {
            return Err(SentinelError::Configuration(
                "--model is required".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_restart_policy_matches_spec() {
        let policy = RestartPolicyConfig::default();
        assert_eq!(policy.max_restarts, 5);
        assert_eq!(policy.window_secs, 60);
    }

    #[test]
    fn default_backoff_bounded_at_250ms() {
        let backoff = BackoffConfig::default();
        assert_eq!(backoff.max_ms, 250);
    }

    #[test]
    fn validate_rejects_empty_roots() {
        let cfg = SentinelConfig {
            roots: vec![],
            gpu_workers: 1,
            cpu_workers: 0,
            queue_capacity: 1024,
            sink_capacity: 2048,
            metrics_port: 9090,
            model_path: PathBuf::from("model.onnx"),
            device_preference: None,
            backoff: BackoffConfig::default(),
            restart_policy: RestartPolicyConfig::default(),
            log_format: LogFormat::Pretty,
            log_level: "info".into(),
            include_patterns: vec![],
            exclude_patterns: vec![],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let cfg = SentinelConfig {
            roots: vec![PathBuf::from(".")],
            gpu_workers: 0,
            cpu_workers: 0,
            queue_capacity: 1024,
            sink_capacity: 2048,
            metrics_port: 9090,
            model_path: PathBuf::from("model.onnx"),
            device_preference: None,
            backoff: BackoffConfig::default(),
            restart_policy: RestartPolicyConfig::default(),
            log_format: LogFormat::Pretty,
            log_level: "info".into(),
            include_patterns: vec![],
            exclude_patterns: vec![],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_model_path() {
        let cfg = SentinelConfig {
            roots: vec![PathBuf::from(".")],
            gpu_workers: 1,
            cpu_workers: 0,
            queue_capacity: 1024,
            sink_capacity: 2048,
            metrics_port: 9090,
            model_path: PathBuf::new(),
            device_preference: None,
            backoff: BackoffConfig::default(),
            restart_policy: RestartPolicyConfig::default(),
            log_format: LogFormat::Pretty,
            log_level: "info".into(),
            include_patterns: vec![],
            exclude_patterns: vec![],
        };
        assert!(cfg.validate().is_err());
    }
}
