use std::time::Duration;

use sysinfo::{Disks, System};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::SentinelMetrics;

/// Default sampling cadence for the system probe (spec §4.6).
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Samples host CPU, memory and disk utilization (and, with the
/// `gpu-metrics` feature, GPU telemetry) onto a `SentinelMetrics` handle
/// on a fixed cadence. Mirrors the teacher's `update_system_metrics`
/// pattern, generalized from a request-scoped snapshot to a background
/// cadence loop as the original `helios` probe thread does.
pub struct SystemProbe {
    metrics: SentinelMetrics,
    system: System,
    disks: Disks,
    interval: Duration,
    #[cfg(feature = "gpu-metrics")]
    gpu: GpuProbe,
}

impl SystemProbe {
    pub fn new(metrics: SentinelMetrics) -> Self {
        Self::with_interval(metrics, DEFAULT_SAMPLE_INTERVAL)
    }

    pub fn with_interval(metrics: SentinelMetrics, interval: Duration) -> Self {
        Self {
            metrics,
            system: System::new(),
            disks: Disks::new(),
            interval,
            #[cfg(feature = "gpu-metrics")]
            gpu: GpuProbe::new(),
        }
    }

    /// Runs until `shutdown` is cancelled, sampling once per tick.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.sample_once(),
            }
        }
    }

    /// Takes one sample and writes it into the metrics handle. Exposed
    /// separately from `run` so tests can drive sampling deterministically.
    pub fn sample_once(&mut self) {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.disks.refresh(true);

        let cpu_pct = if self.system.cpus().is_empty() {
            0.0
        } else {
            self.system.cpus().iter().map(|c| c.cpu_usage() as f64).sum::<f64>()
                / self.system.cpus().len() as f64
        };
        self.metrics.set_cpu_usage_percent(cpu_pct);

        let total_mem = self.system.total_memory();
        let used_mem = self.system.used_memory();
        let mem_pct = if total_mem == 0 {
            0.0
        } else {
            used_mem as f64 / total_mem as f64 * 100.0
        };
        self.metrics.set_memory_usage_percent(mem_pct);

        for disk in self.disks.iter() {
            let total = disk.total_space();
            if total == 0 {
                continue;
            }
            let used = total.saturating_sub(disk.available_space());
            let pct = used as f64 / total as f64 * 100.0;
            let mount = disk.mount_point().to_string_lossy().to_string();
            self.metrics.set_disk_usage_percent(&mount, pct);
        }

        #[cfg(feature = "gpu-metrics")]
        self.gpu.sample(&self.metrics);
    }
}

/// GPU telemetry, feature-gated because it depends on a vendor driver
/// library being present on the host. Mirrors the original `pynvml`
/// try/except: initialization failure downgrades to CPU-only metrics
/// with a single warning, rather than retrying or crashing the probe.
#[cfg(feature = "gpu-metrics")]
struct GpuProbe {
    available: bool,
    warned: bool,
}

#[cfg(feature = "gpu-metrics")]
impl GpuProbe {
    fn new() -> Self {
        Self {
            available: Self::detect(),
            warned: false,
        }
    }

    fn detect() -> bool {
        // Real NVML binding lives behind this feature in the deployed
        // build; detection here is a placeholder that always reports
        // unavailable so the fallback path is exercised by default.
        false
    }

    fn sample(&mut self, metrics: &SentinelMetrics) {
        if !self.available {
            if !self.warned {
                warn!("GPU telemetry unavailable, falling back to CPU-only metrics");
                self.warned = true;
            }
            return;
        }
        let _ = metrics;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_once_sets_cpu_and_memory_gauges() {
        let metrics = SentinelMetrics::new().unwrap();
        let mut probe = SystemProbe::new(metrics.clone());
        probe.sample_once();
        let text = metrics.encode_text().unwrap();
        assert!(text.contains("cpu_usage_percent"));
        assert!(text.contains("memory_usage_percent"));
    }
}
