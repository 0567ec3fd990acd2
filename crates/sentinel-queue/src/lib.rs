use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use sentinel_core::FileDescriptor;
use sentinel_metrics::SentinelMetrics;

/// How long a blocked `take` waits between cancellation/closed checks.
/// Small enough that shutdown latency stays well under the supervisor's
/// drain timeout, large enough not to spin.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferResult {
    Accepted,
    RejectedFull,
    Closed,
}

#[derive(Debug)]
pub enum TakeResult {
    Item(FileDescriptor),
    Closed,
}

/// A bounded, multi-producer multi-consumer queue over
/// `crossbeam-channel`, instrumented against a `SentinelMetrics` handle.
/// FIFO is guaranteed with a single producer; with multiple producers
/// fairness is best-effort, matching the channel's own guarantee.
///
/// Every successful `offer`/`take`/`try_take` refreshes both the
/// per-queue `queue_depth{queue}` gauge and the spec's own unlabeled
/// `files_in_queue` gauge (spec §6, §8.1, §8.3) from the same read of
/// `receiver.len()`.
///
/// Cloning a `WorkQueue` shares the same underlying channel and closed
/// flag — clone it once per producer/consumer task rather than
/// constructing a new one.
#[derive(Clone)]
pub struct WorkQueue {
    sender: Sender<FileDescriptor>,
    receiver: Receiver<FileDescriptor>,
    closed: Arc<AtomicBool>,
    metrics: SentinelMetrics,
    name: &'static str,
}

impl WorkQueue {
    pub fn new(capacity: usize, metrics: SentinelMetrics, name: &'static str) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            closed: Arc::new(AtomicBool::new(false)),
            metrics,
            name,
        }
    }

    /// Non-blocking enqueue. Never blocks the caller; on a full queue
    /// the caller (the scanner) is expected to back off and retry.
    pub fn offer(&self, desc: FileDescriptor) -> OfferResult {
        if self.closed.load(Ordering::Acquire) {
            return OfferResult::Closed;
        }
        match self.sender.try_send(desc) {
            Ok(()) => {
                self.metrics.record_queue_operation(self.name, "put");
                self.metrics.set_queue_depth(self.name, self.receiver.len());
                self.metrics.set_files_in_queue(self.receiver.len());
                OfferResult::Accepted
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.record_queue_operation(self.name, "full");
                OfferResult::RejectedFull
            }
            Err(TrySendError::Disconnected(_)) => OfferResult::Closed,
        }
    }

    /// Blocking dequeue with cooperative cancellation. Returns `Closed`
    /// once the queue has been closed *and* fully drained, or once
    /// `is_cancelled` starts returning true.
    pub fn take(&self, is_cancelled: impl Fn() -> bool) -> TakeResult {
        loop {
            if is_cancelled() {
                return TakeResult::Closed;
            }
            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(desc) => {
                    self.metrics.record_queue_operation(self.name, "get");
                    self.metrics.set_queue_depth(self.name, self.receiver.len());
                    self.metrics.set_files_in_queue(self.receiver.len());
                    return TakeResult::Item(desc);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.closed.load(Ordering::Acquire) && self.receiver.is_empty() {
                        return TakeResult::Closed;
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => return TakeResult::Closed,
            }
        }
    }

    /// Non-blocking dequeue, used by a worker's opportunistic batch-drain
    /// pass (spec §4.4 step 2). Never waits: an empty queue is reported
    /// immediately rather than treated as `closed`.
    pub fn try_take(&self) -> Option<FileDescriptor> {
        match self.receiver.try_recv() {
            Ok(desc) => {
                self.metrics.record_queue_operation(self.name, "get");
                self.metrics.set_queue_depth(self.name, self.receiver.len());
                self.metrics.set_files_in_queue(self.receiver.len());
                Some(desc)
            }
            Err(_) => {
                self.metrics.record_queue_operation(self.name, "empty");
                None
            }
        }
    }

    /// Idempotent. Subsequent `offer` calls fail; any in-flight or
    /// already-buffered items remain takeable until drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Non-blocking, best-effort size read for the `queue_depth` gauge.
    pub fn depth(&self) -> usize {
        self.receiver.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool as StdAtomicBool;
    use std::thread;

    fn test_metrics() -> SentinelMetrics {
        SentinelMetrics::new().unwrap()
    }

    fn desc(name: &str) -> FileDescriptor {
        FileDescriptor::new(std::path::PathBuf::from(name), 0, None)
    }

    #[test]
    fn offer_rejects_when_full() {
        let q = WorkQueue::new(1, test_metrics(), "work");
        assert_eq!(q.offer(desc("a")), OfferResult::Accepted);
        assert_eq!(q.offer(desc("b")), OfferResult::RejectedFull);
    }

    #[test]
    fn files_in_queue_gauge_tracks_depth_across_offer_and_take() {
        let metrics = test_metrics();
        let q = WorkQueue::new(4, metrics.clone(), "work");
        q.offer(desc("a"));
        q.offer(desc("b"));
        let text = metrics.encode_text().unwrap();
        assert!(text.contains("files_in_queue 2"));

        let never = || false;
        q.take(&never);
        let text = metrics.encode_text().unwrap();
        assert!(text.contains("files_in_queue 1"));
    }

    #[test]
    fn offer_after_close_is_closed() {
        let q = WorkQueue::new(4, test_metrics(), "work");
        q.close();
        assert_eq!(q.offer(desc("a")), OfferResult::Closed);
    }

    #[test]
    fn close_is_idempotent() {
        let q = WorkQueue::new(4, test_metrics(), "work");
        q.close();
        q.close();
        assert!(q.is_closed());
    }

    #[test]
    fn take_drains_then_reports_closed() {
        let q = WorkQueue::new(4, test_metrics(), "work");
        q.offer(desc("a"));
        q.close();
        let never = || false;
        match q.take(&never) {
            TakeResult::Item(d) => assert_eq!(d.path, std::path::PathBuf::from("a")),
            TakeResult::Closed => panic!("expected item before close"),
        }
        match q.take(&never) {
            TakeResult::Item(_) => panic!("expected closed"),
            TakeResult::Closed => {}
        }
    }

    #[test]
    fn take_respects_cancellation() {
        let q = WorkQueue::new(4, test_metrics(), "work");
        let cancelled = Arc::new(StdAtomicBool::new(false));
        let c = cancelled.clone();
        let handle = thread::spawn(move || q.take(move || c.load(Ordering::Acquire)));
        thread::sleep(Duration::from_millis(120));
        cancelled.store(true, Ordering::Release);
        match handle.join().unwrap() {
            TakeResult::Closed => {}
            TakeResult::Item(_) => panic!("expected cancellation to win"),
        }
    }

    #[test]
    fn try_take_drains_without_blocking() {
        let q = WorkQueue::new(4, test_metrics(), "work");
        assert!(q.try_take().is_none());
        q.offer(desc("a"));
        assert_eq!(q.try_take().unwrap().path, std::path::PathBuf::from("a"));
        assert!(q.try_take().is_none());
    }

    #[test]
    fn single_producer_is_fifo() {
        let q = WorkQueue::new(8, test_metrics(), "work");
        for i in 0..5 {
            q.offer(desc(&i.to_string()));
        }
        let never = || false;
        for i in 0..5 {
            match q.take(&never) {
                TakeResult::Item(d) => assert_eq!(d.path, std::path::PathBuf::from(i.to_string())),
                TakeResult::Closed => panic!("unexpected close"),
            }
        }
    }
}
