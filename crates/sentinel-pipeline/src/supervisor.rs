use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use sentinel_core::{RestartPolicyConfig, WorkerExitCause, WorkerKind, WorkerState, WorkerStatus};
use sentinel_metrics::{worker_label, SentinelMetrics};
use sentinel_predictor::Predictor;
use sentinel_queue::WorkQueue;

use crate::sink::ResultSink;
use crate::worker::Worker;

/// One worker to spawn at `start()` time: its device class, batch cap,
/// and the predictor handle it owns (spec §5: exclusive per GPU worker,
/// shareable behind the same `Arc` for CPU workers using a re-entrant
/// backend).
pub struct WorkerSpec {
    pub kind: WorkerKind,
    pub max_batch: usize,
    pub predictor: Arc<dyn Predictor>,
}

struct Slot {
    kind: WorkerKind,
    max_batch: usize,
    predictor: Arc<dyn Predictor>,
    state: Arc<ArcSwap<WorkerState>>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Owns worker lifecycles: spawns the configured mix, restarts workers
/// that panic or hit a fatal predictor error (bounded by `R` restarts
/// per `W` seconds), and drains everything on shutdown (spec §4.5).
pub struct Supervisor {
    queue: WorkQueue,
    sink: ResultSink,
    metrics: SentinelMetrics,
    restart_policy: RestartPolicyConfig,
    slots: DashMap<u32, Slot>,
    restart_windows: DashMap<u32, Mutex<VecDeque<Instant>>>,
    disabled_slots: DashMap<u32, ()>,
    next_id: AtomicU32,
    exits_tx: mpsc::UnboundedSender<(u32, WorkerExitCause)>,
    exits_rx: Mutex<Option<mpsc::UnboundedReceiver<(u32, WorkerExitCause)>>>,
    reaping: AtomicBool,
}

impl Supervisor {
    pub fn new(
        queue: WorkQueue,
        sink: ResultSink,
        metrics: SentinelMetrics,
        restart_policy: RestartPolicyConfig,
    ) -> Arc<Self> {
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            queue,
            sink,
            metrics,
            restart_policy,
            slots: DashMap::new(),
            restart_windows: DashMap::new(),
            disabled_slots: DashMap::new(),
            next_id: AtomicU32::new(0),
            exits_tx,
            exits_rx: Mutex::new(Some(exits_rx)),
            reaping: AtomicBool::new(false),
        })
    }

    /// Spawns the configured worker mix. May be called more than once
    /// (e.g. to grow the pool), though the common case is one call at
    /// startup.
    pub fn start(self: &Arc<Self>, specs: Vec<WorkerSpec>) {
        for spec in specs {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.spawn_worker(id, spec.kind, spec.max_batch, spec.predictor);
        }
    }

    /// Must be called exactly once; drives restart decisions as workers
    /// exit. Returns a handle the caller can simply let run in the
    /// background until the process exits.
    pub fn spawn_reaper(self: Arc<Self>) -> JoinHandle<()> {
        assert!(
            !self.reaping.swap(true, Ordering::SeqCst),
            "spawn_reaper called more than once"
        );
        let mut rx = self
            .exits_rx
            .lock()
            .take()
            .expect("reaper already spawned");
        tokio::spawn(async move {
            while let Some((id, cause)) = rx.recv().await {
                self.on_worker_exit(id, cause);
            }
        })
    }

    /// Background task refreshing aggregate gauges (`active_workers`,
    /// `file_processing_rate_per_second`, `worker_uptime_seconds`) on a
    /// 1-second cadence, mirroring the system probe's own cadence loop.
    pub fn spawn_telemetry_refresh(
        self: Arc<Self>,
        shutdown: tokio_util::sync::CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => self.refresh_telemetry(),
                }
            }
        })
    }

    fn refresh_telemetry(&self) {
        let mut active = 0usize;
        let mut rate_sum = 0.0;
        for entry in self.slots.iter() {
            let state = entry.state.load();
            let label = worker_label(entry.kind, *entry.key());
            self.metrics.set_worker_uptime(&label, state.uptime_seconds());
            if matches!(state.status, WorkerStatus::Running | WorkerStatus::Waiting) {
                active += 1;
                rate_sum += state.throughput_files_per_sec;
            }
        }
        self.metrics.set_active_workers(active);
        self.metrics.set_file_processing_rate(rate_sum);
    }

    /// Atomic read of every worker's current state, for the UI's
    /// worker-state stream (spec §6).
    pub fn snapshot(&self) -> Vec<WorkerState> {
        self.slots
            .iter()
            .map(|entry| (**entry.state.load()).clone())
            .collect()
    }

    /// Closes the queue (idempotent), lets every worker drain to
    /// exhaustion, and joins with `timeout`; escalates to a forceful
    /// `abort()` past the deadline, recording `worker_restarts_total{
    /// reason=shutdown}` only for those forced kills (spec §4.5).
    pub async fn stop(self: &Arc<Self>, timeout: Duration) {
        self.queue.close();

        let ids: Vec<u32> = self.slots.iter().map(|e| *e.key()).collect();
        let deadline = tokio::time::Instant::now() + timeout;

        for id in ids {
            let (handle_opt, label) = {
                let Some(slot) = self.slots.get(&id) else {
                    continue;
                };
                (slot.join_handle.lock().take(), worker_label(slot.kind, id))
            };
            let Some(handle) = handle_opt else {
                continue;
            };
            let abort_handle = handle.abort_handle();
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, handle).await {
                Ok(_) => {}
                Err(_elapsed) => {
                    abort_handle.abort();
                    self.metrics.record_worker_restart(&label, "shutdown");
                    tracing::warn!(worker = %label, "forceful termination after drain timeout");
                }
            }
        }
    }

    fn spawn_worker(
        self: &Arc<Self>,
        id: u32,
        kind: WorkerKind,
        max_batch: usize,
        predictor: Arc<dyn Predictor>,
    ) {
        let state = Arc::new(ArcSwap::from_pointee(WorkerState::new(id, kind)));
        let worker = Worker::new(
            id,
            kind,
            max_batch,
            self.queue.clone(),
            self.sink.clone(),
            predictor.clone(),
            self.metrics.clone(),
            state.clone(),
        );

        let tx = self.exits_tx.clone();
        let join_handle = tokio::spawn(async move {
            let cause = std::panic::AssertUnwindSafe(worker.run())
                .catch_unwind()
                .await
                .unwrap_or(WorkerExitCause::Panic);
            let _ = tx.send((id, cause));
        });

        self.slots.insert(
            id,
            Slot {
                kind,
                max_batch,
                predictor,
                state,
                join_handle: Mutex::new(Some(join_handle)),
            },
        );
        self.restart_windows.entry(id).or_insert_with(|| Mutex::new(VecDeque::new()));
    }

    fn on_worker_exit(self: &Arc<Self>, id: u32, cause: WorkerExitCause) {
        let Some(slot_state) = self.slots.get(&id).map(|s| s.state.clone()) else {
            return;
        };

        match cause {
            WorkerExitCause::Shutdown => {
                publish_status(&slot_state, WorkerStatus::Stopped);
            }
            WorkerExitCause::Panic | WorkerExitCause::FatalError => {
                if self.queue.is_closed() {
                    publish_status(&slot_state, WorkerStatus::Stopped);
                    return;
                }
                if self.disabled_slots.contains_key(&id) {
                    publish_status(&slot_state, WorkerStatus::Stopped);
                    return;
                }

                let reason = match cause {
                    WorkerExitCause::Panic => "panic",
                    WorkerExitCause::FatalError => "fatal_error",
                    WorkerExitCause::Shutdown => unreachable!(),
                };

                let (kind, max_batch, predictor) = {
                    let slot = self.slots.get(&id).expect("slot exists");
                    (slot.kind, slot.max_batch, slot.predictor.clone())
                };
                let label = worker_label(kind, id);

                let window = self
                    .restart_windows
                    .entry(id)
                    .or_insert_with(|| Mutex::new(VecDeque::new()));
                let mut times = window.lock();
                let now = Instant::now();
                let horizon = Duration::from_secs(self.restart_policy.window_secs);
                while times.front().is_some_and(|t| now.duration_since(*t) > horizon) {
                    times.pop_front();
                }

                if times.len() as u32 >= self.restart_policy.max_restarts {
                    drop(times);
                    self.disabled_slots.insert(id, ());
                    publish_status(&slot_state, WorkerStatus::Error);
                    tracing::error!(
                        worker = %label,
                        "restart budget of {} per {}s exceeded, slot disabled",
                        self.restart_policy.max_restarts,
                        self.restart_policy.window_secs
                    );
                    return;
                }
                times.push_back(now);
                drop(times);

                self.metrics.record_worker_restart(&label, reason);
                tracing::warn!(worker = %label, reason, "restarting worker");
                self.spawn_worker(id, kind, max_batch, predictor);
            }
        }
    }
}

fn publish_status(state: &Arc<ArcSwap<WorkerState>>, status: WorkerStatus) {
    let mut next = (**state.load()).clone();
    next.status = status;
    state.store(Arc::new(next));
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_predictor::MockPredictor;
    use std::sync::Arc as StdArc;

    fn restart_policy(max_restarts: u32, window_secs: u64) -> RestartPolicyConfig {
        RestartPolicyConfig {
            max_restarts,
            window_secs,
        }
    }

    #[tokio::test]
    async fn start_spawns_requested_workers() {
        let metrics = SentinelMetrics::new().unwrap();
        let queue = WorkQueue::new(16, metrics.clone(), "work");
        let (sink, _source) = crate::sink::result_channel(16);
        let sup = Supervisor::new(queue.clone(), sink, metrics, restart_policy(5, 60));
        sup.start(vec![WorkerSpec {
            kind: WorkerKind::Cpu,
            max_batch: 32,
            predictor: StdArc::new(MockPredictor::new()),
        }]);
        assert_eq!(sup.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn panic_triggers_restart_up_to_budget() {
        let metrics = SentinelMetrics::new().unwrap();
        let queue = WorkQueue::new(16, metrics.clone(), "work");
        let (sink, _source) = crate::sink::result_channel(16);
        let sup = Supervisor::new(queue.clone(), sink, metrics.clone(), restart_policy(2, 60));
        let _reaper = sup.clone().spawn_reaper();

        sup.start(vec![WorkerSpec {
            kind: WorkerKind::Cpu,
            max_batch: 32,
            predictor: StdArc::new(MockPredictor::new().with_panic_on_call(1)),
        }]);

        // Keep the queue open and feed it so the worker keeps trying
        // (and keeps panicking) across restarts, to exercise the budget.
        for i in 0..10u32 {
            queue.offer(sentinel_core::FileDescriptor::new(
                format!("f{i}").into(),
                1,
                None,
            ));
        }

        tokio::time::sleep(Duration::from_millis(500)).await;

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("worker_restarts_total"));
    }

    #[test]
    fn default_restart_policy_is_five_per_sixty_seconds() {
        let p = RestartPolicyConfig::default();
        assert_eq!(p.max_restarts, 5);
        assert_eq!(p.window_secs, 60);
    }
}
