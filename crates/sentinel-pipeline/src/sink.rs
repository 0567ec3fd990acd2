use crossbeam_channel::{bounded, Receiver, Sender};
use sentinel_core::PredictionResult;

/// Ordered channel of categorization records consumed by an external
/// writer (spec §2 C9). Bounded at `2 × queue_capacity` by default
/// (spec §9 Open Question 2): once full, a worker's write blocks,
/// visible as worker `waiting` time, the same way the Work Queue
/// propagates backpressure onto the scanner.
#[derive(Clone)]
pub struct ResultSink {
    sender: Sender<PredictionResult>,
}

/// The read side handed to the external result consumer. Kept separate
/// from `ResultSink` so a worker can only ever write, never drain.
#[derive(Clone)]
pub struct ResultSource {
    receiver: Receiver<PredictionResult>,
}

/// Builds a bounded sink/source pair sharing one channel.
pub fn result_channel(capacity: usize) -> (ResultSink, ResultSource) {
    let (sender, receiver) = bounded(capacity);
    (ResultSink { sender }, ResultSource { receiver })
}

impl ResultSink {
    /// Blocking write. Intended to be called from a worker's blocking
    /// context (e.g. within `spawn_blocking`); applies backpressure once
    /// the sink fills. Returns the result back on failure, which only
    /// happens once every `ResultSource` has been dropped.
    pub fn write(&self, result: PredictionResult) -> Result<(), PredictionResult> {
        self.sender.send(result).map_err(|e| e.0)
    }
}

impl ResultSource {
    /// Non-blocking read, for UIs or tests that want to drain without
    /// waiting.
    pub fn try_recv(&self) -> Option<PredictionResult> {
        self.receiver.try_recv().ok()
    }

    /// Blocking iterator over all results until every `ResultSink` is
    /// dropped, for an external writer task.
    pub fn iter(&self) -> crossbeam_channel::Iter<'_, PredictionResult> {
        self.receiver.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn result(path: &str) -> PredictionResult {
        PredictionResult {
            source_path: PathBuf::from(path),
            category_path: "documents".to_string(),
            confidence: 0.5,
            tags: vec![],
            model_version: "test".to_string(),
        }
    }

    #[test]
    fn write_then_drain_round_trips() {
        let (sink, source) = result_channel(4);
        sink.write(result("a")).unwrap();
        let got = source.try_recv().unwrap();
        assert_eq!(got.source_path, PathBuf::from("a"));
        assert!(source.try_recv().is_none());
    }

    #[test]
    fn write_fails_once_source_dropped() {
        let (sink, source) = result_channel(1);
        drop(source);
        assert!(sink.write(result("a")).is_err());
    }
}
