use std::path::PathBuf;
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sentinel_core::{BackoffConfig, FileDescriptor, ScanStats, SentinelError};
use sentinel_metrics::SentinelMetrics;
use sentinel_queue::{OfferResult, WorkQueue};

/// Walker configuration for one run of the scanner (spec §4.2).
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub roots: Vec<PathBuf>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub backoff: BackoffConfig,
}

/// Label used for `files_discovered_total{scanner}` and, doubling as a
/// `worker` label, for `files_processed_total{worker,status="skipped"}`
/// when a per-file I/O error means a descriptor is never constructed
/// (spec §7: per-file `io-error` increments `skipped` exactly when the
/// file is never enqueued). A single filesystem scanner kind today;
/// kept as a constant so call sites never diverge.
const SCANNER_LABEL: &str = "filesystem";

/// Walks every configured root depth-first, applies include/exclude
/// globs, and pushes descriptors into `queue` under admission
/// backpressure. Runs to completion and closes the queue on success;
/// never closes it on a root-level failure, leaving that decision to
/// the supervisor (spec §4.2).
pub async fn run_scanner(
    config: ScannerConfig,
    queue: WorkQueue,
    metrics: SentinelMetrics,
    shutdown: CancellationToken,
) -> Result<ScanStats, SentinelError> {
    tokio::task::spawn_blocking(move || scan_blocking(config, queue, metrics, shutdown))
        .await
        .expect("scanner task panicked")
}

fn scan_blocking(
    config: ScannerConfig,
    queue: WorkQueue,
    metrics: SentinelMetrics,
    shutdown: CancellationToken,
) -> Result<ScanStats, SentinelError> {
    for root in &config.roots {
        std::fs::metadata(root).map_err(|e| {
            SentinelError::ScanRootError(format!("{}: {}", root.display(), e))
        })?;
    }

    let exclude_set = build_globset(&config.exclude_patterns);
    let include_set = build_globset(&config.include_patterns);

    let mut stats = ScanStats::default();

    'roots: for root in &config.roots {
        stats.roots_walked += 1;
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .git_exclude(true)
            .ignore(true)
            .build();

        for entry in walker {
            if shutdown.is_cancelled() {
                break 'roots;
            }

            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "scanner entry error, skipping");
                    stats.io_errors_skipped += 1;
                    metrics.record_file_processed(SCANNER_LABEL, "skipped");
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if let Some(set) = &exclude_set {
                if set.is_match(path) {
                    continue;
                }
            }
            if let Some(set) = &include_set {
                if !set.is_match(path) {
                    continue;
                }
            }

            let size = match entry.metadata() {
                Ok(m) => m.len(),
                Err(e) => {
                    warn!(error = %e, path = ?path, "failed to stat file, skipping");
                    stats.io_errors_skipped += 1;
                    metrics.record_file_processed(SCANNER_LABEL, "skipped");
                    continue;
                }
            };
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|s| s.to_ascii_lowercase());
            let desc = FileDescriptor::new(path.to_path_buf(), size, extension);

            if !offer_with_backoff(&queue, desc, &config.backoff, &metrics, &shutdown) {
                continue;
            }
            stats.files_discovered += 1;
            stats.bytes_discovered += size;
            metrics.record_files_discovered(SCANNER_LABEL, 1);
        }
    }

    queue.close();
    info!(
        files = stats.files_discovered,
        bytes = stats.bytes_discovered,
        roots = stats.roots_walked,
        io_errors_skipped = stats.io_errors_skipped,
        "scan complete"
    );
    Ok(stats)
}

/// Retries `queue.offer` with exponential backoff bounded at
/// `backoff.max_ms`, recording a `backpressure_events_total{component=
/// scanner}` observation on every rejection. Returns `false` if the
/// queue closed out from under the scanner (cancellation) or cancellation
/// won the race before the descriptor could be admitted.
fn offer_with_backoff(
    queue: &WorkQueue,
    desc: FileDescriptor,
    backoff: &BackoffConfig,
    metrics: &SentinelMetrics,
    shutdown: &CancellationToken,
) -> bool {
    let mut delay_ms = backoff.initial_ms;
    loop {
        match queue.offer(desc.clone()) {
            OfferResult::Accepted => return true,
            OfferResult::Closed => return false,
            OfferResult::RejectedFull => {
                metrics.record_backpressure_event("scanner");
                if shutdown.is_cancelled() {
                    return false;
                }
                std::thread::sleep(Duration::from_millis(delay_ms));
                delay_ms = ((delay_ms as f64) * backoff.multiplier) as u64;
                delay_ms = delay_ms.min(backoff.max_ms);
            }
        }
    }
}

fn build_globset(patterns: &[String]) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    let mut added = false;
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
                added = true;
            }
            Err(e) => warn!(pattern = %pattern, error = %e, "invalid glob pattern, ignoring"),
        }
    }
    if added {
        builder.build().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_pipeline_test_support::*;

    #[tokio::test]
    async fn empty_root_discovers_nothing_and_closes_queue() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = SentinelMetrics::new().unwrap();
        let queue = WorkQueue::new(16, metrics.clone(), "work");
        let config = ScannerConfig {
            roots: vec![dir.path().to_path_buf()],
            include_patterns: vec![],
            exclude_patterns: vec![],
            backoff: BackoffConfig::default(),
        };
        let stats = run_scanner(config, queue.clone(), metrics, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.files_discovered, 0);
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn discovers_files_written_under_root() {
        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path(), &["a.txt", "b.bin"]);
        let metrics = SentinelMetrics::new().unwrap();
        let queue = WorkQueue::new(16, metrics.clone(), "work");
        let config = ScannerConfig {
            roots: vec![dir.path().to_path_buf()],
            include_patterns: vec![],
            exclude_patterns: vec![],
            backoff: BackoffConfig::default(),
        };
        let stats = run_scanner(config, queue.clone(), metrics, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.files_discovered, 2);
    }

    #[tokio::test]
    async fn missing_root_is_fatal_and_leaves_queue_open() {
        let metrics = SentinelMetrics::new().unwrap();
        let queue = WorkQueue::new(16, metrics.clone(), "work");
        let config = ScannerConfig {
            roots: vec![PathBuf::from("/nonexistent/definitely/not/here")],
            include_patterns: vec![],
            exclude_patterns: vec![],
            backoff: BackoffConfig::default(),
        };
        let result = run_scanner(config, queue.clone(), metrics, CancellationToken::new()).await;
        assert!(matches!(result, Err(SentinelError::ScanRootError(_))));
        assert!(!queue.is_closed());
    }

    #[tokio::test]
    async fn exclude_pattern_drops_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path(), &["keep.txt", "skip.log"]);
        let metrics = SentinelMetrics::new().unwrap();
        let queue = WorkQueue::new(16, metrics.clone(), "work");
        let config = ScannerConfig {
            roots: vec![dir.path().to_path_buf()],
            include_patterns: vec![],
            exclude_patterns: vec!["**/*.log".to_string()],
            backoff: BackoffConfig::default(),
        };
        let stats = run_scanner(config, queue.clone(), metrics, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.files_discovered, 1);
    }
}

#[cfg(test)]
mod sentinel_pipeline_test_support {
    use std::path::Path;

    pub fn write_files(root: &Path, names: &[&str]) {
        for name in names {
            std::fs::write(root.join(name), b"x").unwrap();
        }
    }
}
