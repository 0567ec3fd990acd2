mod cli;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use sentinel_core::{SentinelConfig, SentinelError, WorkerKind};
use sentinel_http::{AppState, MetricsServer};
use sentinel_metrics::{SentinelMetrics, SystemProbe};
use sentinel_pipeline::{result_channel, run_scanner, ScannerConfig, Supervisor, WorkerSpec};
use sentinel_predictor::{OnnxPredictor, Predictor};
use sentinel_queue::WorkQueue;

use cli::Cli;

#[tokio::main]
async fn main() {
    let code = run().await;
    std::process::exit(code);
}

/// Loads the layered config (defaults < TOML file < env < CLI flags,
/// spec §6/SPEC_FULL.md A1) and validates the merged result.
fn load_config(cli: &Cli) -> Result<SentinelConfig, SentinelError> {
    let layered = SentinelConfig::load_layered(cli.config.as_ref())?;
    let merged = cli.apply_overrides(layered);
    merged.validate()?;
    Ok(merged)
}

async fn run() -> i32 {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {e}", "configuration error:".red().bold());
            return e.exit_code();
        }
    };

    logging::init(&config.log_level, config.log_format);
    tracing::info!(
        roots = ?config.roots,
        gpu_workers = config.gpu_workers,
        cpu_workers = config.cpu_workers,
        queue_capacity = config.queue_capacity,
        metrics_port = config.metrics_port,
        "sentinel starting"
    );

    let metrics =
        SentinelMetrics::new().expect("metric instrument registration cannot fail at startup");

    let queue = WorkQueue::new(config.queue_capacity, metrics.clone(), "work");
    let (sink, source) = result_channel(config.sink_capacity);

    // Drains the Result Sink so workers never back up against an
    // unconsumed channel (spec §2 C9: consumed by an external writer
    // that is out of scope here; this keeps the core runnable stand-alone).
    let _drain = tokio::task::spawn_blocking(move || {
        let mut drained = 0u64;
        for _ in source.iter() {
            drained += 1;
        }
        tracing::debug!(drained, "result sink drained to completion");
    });

    let mut specs = Vec::new();
    for _ in 0..config.gpu_workers {
        let predictor =
            match OnnxPredictor::load(&config.model_path, config.device_preference.as_deref()) {
                Ok(p) => Arc::new(p) as Arc<dyn Predictor>,
                Err(e) => {
                    let err = SentinelError::LoadError(e.to_string());
                    eprintln!("{} {err}", "model load failed:".red().bold());
                    return err.exit_code();
                }
            };
        specs.push(WorkerSpec {
            kind: WorkerKind::Gpu,
            max_batch: WorkerKind::Gpu.default_max_batch(),
            predictor,
        });
    }
    if config.cpu_workers > 0 {
        // CPU workers share one predictor instance: the ONNX Runtime CPU
        // execution provider is documented re-entrant (spec §5).
        let predictor: Arc<dyn Predictor> = match OnnxPredictor::load(&config.model_path, None) {
            Ok(p) => Arc::new(p),
            Err(e) => {
                let err = SentinelError::LoadError(e.to_string());
                eprintln!("{} {err}", "model load failed:".red().bold());
                return err.exit_code();
            }
        };
        for _ in 0..config.cpu_workers {
            specs.push(WorkerSpec {
                kind: WorkerKind::Cpu,
                max_batch: WorkerKind::Cpu.default_max_batch(),
                predictor: predictor.clone(),
            });
        }
    }

    let supervisor = Supervisor::new(
        queue.clone(),
        sink.clone(),
        metrics.clone(),
        config.restart_policy.clone(),
    );
    supervisor.start(specs);
    let _reaper = supervisor.clone().spawn_reaper();

    let shutdown = CancellationToken::new();
    let _telemetry = supervisor.clone().spawn_telemetry_refresh(shutdown.clone());
    let _probe = tokio::spawn(SystemProbe::new(metrics.clone()).run(shutdown.clone()));

    if config.metrics_port != 0 {
        let state = AppState::new(metrics.clone(), supervisor.clone());
        let server = MetricsServer::new(config.metrics_port, state);
        let http_shutdown = shutdown.clone();
        let _http = tokio::spawn(async move {
            if let Err(e) = server.run(http_shutdown).await {
                tracing::error!(error = %e, "metrics endpoint exited with an error");
            }
        });
    } else {
        tracing::info!("metrics endpoint disabled (--metrics-port 0)");
    }

    let scanner_config = ScannerConfig {
        roots: config.roots.clone(),
        include_patterns: config.include_patterns.clone(),
        exclude_patterns: config.exclude_patterns.clone(),
        backoff: config.backoff.clone(),
    };
    let mut scanner_handle = tokio::spawn(run_scanner(
        scanner_config,
        queue.clone(),
        metrics.clone(),
        shutdown.clone(),
    ));

    let scan_outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, draining in-flight work");
            shutdown.cancel();
            (&mut scanner_handle).await
        }
        res = &mut scanner_handle => res,
    };

    let exit_code = match scan_outcome {
        Ok(Ok(stats)) => {
            tracing::info!(
                files_discovered = stats.files_discovered,
                bytes_discovered = stats.bytes_discovered,
                roots_walked = stats.roots_walked,
                io_errors_skipped = stats.io_errors_skipped,
                "scan complete"
            );
            0
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, kind = "ScanRootError", "scanner aborted fatally");
            shutdown.cancel();
            e.exit_code()
        }
        Err(join_err) => {
            tracing::error!(error = %join_err, "scanner task panicked");
            shutdown.cancel();
            4
        }
    };

    supervisor
        .stop(Duration::from_secs(cli.shutdown_timeout_secs))
        .await;
    shutdown.cancel();

    let snapshot = supervisor.snapshot();
    let total_processed: u64 = snapshot.iter().map(|w| w.files_processed).sum();
    tracing::info!(
        total_processed,
        exit_code,
        "sentinel shutdown complete"
    );

    exit_code
}
