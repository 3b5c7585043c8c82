//! Fan-in of per-batch failures.

use crate::pipeline::committer::BatchFailure;
use crossbeam_channel::{Receiver, Sender};
use tracing::warn;

/// Many-producer, single-consumer queue of batch failures.
///
/// Workers report through [`FailureSender`] clones without blocking each
/// other; the pipeline drains the queue once, after every batch is done.
#[derive(Debug)]
pub struct ErrorCollector {
    sender: Sender<BatchFailure>,
    receiver: Receiver<BatchFailure>,
}

impl ErrorCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    /// A handle for one producer.
    #[must_use]
    pub fn sender(&self) -> FailureSender {
        FailureSender(self.sender.clone())
    }

    /// Closes the collector and returns everything reported so far.
    #[must_use]
    pub fn drain(self) -> Vec<BatchFailure> {
        drop(self.sender);
        self.receiver.try_iter().collect()
    }
}

impl Default for ErrorCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer side of an [`ErrorCollector`].
#[derive(Debug, Clone)]
pub struct FailureSender(Sender<BatchFailure>);

impl FailureSender {
    /// Reports a failure.
    pub fn report(&self, failure: BatchFailure) {
        if let Err(err) = self.0.send(failure) {
            warn!(failure = %err.0, "failure reported after the collector was drained");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::pipeline::committer::FailureKind;

    fn failure(batch: u64) -> BatchFailure {
        BatchFailure {
            batch,
            first_line: batch * 10 + 1,
            kind: FailureKind::Commit {
                source: CoreError::ReadOnly,
            },
        }
    }

    #[test]
    fn drains_reports_from_many_threads() {
        let collector = ErrorCollector::new();
        std::thread::scope(|scope| {
            for batch in 0..6 {
                let sender = collector.sender();
                scope.spawn(move || sender.report(failure(batch)));
            }
        });

        let mut batches: Vec<u64> = collector.drain().iter().map(|f| f.batch).collect();
        batches.sort_unstable();
        assert_eq!(batches, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn empty_collector_drains_nothing() {
        assert!(ErrorCollector::new().drain().is_empty());
    }
}
