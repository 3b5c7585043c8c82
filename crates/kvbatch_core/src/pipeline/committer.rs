//! Applying one batch as one transaction.

use crate::error::CoreError;
use crate::pipeline::accumulator::Batch;
use crate::store::Store;
use crate::types::Version;
use thiserror::Error;

/// Something that went wrong while committing a batch.
#[derive(Debug, Error)]
#[error("batch {batch} (from line {first_line}): {kind}")]
pub struct BatchFailure {
    /// Index of the failed batch.
    pub batch: u64,
    /// Input line of the batch's first pair.
    pub first_line: u64,
    /// What failed.
    #[source]
    pub kind: FailureKind,
}

/// The step of a batch commit that failed.
#[derive(Debug, Error)]
pub enum FailureKind {
    /// A single pair was rejected by the transaction; the rest of the batch
    /// was still attempted.
    #[error("set failed for key {:?}: {source}", String::from_utf8_lossy(.key))]
    Set {
        /// Key of the rejected pair.
        key: Vec<u8>,
        /// Store error.
        source: CoreError,
    },

    /// The transaction could not be started or committed; none of the
    /// batch's pairs were written.
    #[error("commit failed: {source}")]
    Commit {
        /// Store error.
        source: CoreError,
    },
}

/// Result of committing one batch.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Index of the batch.
    pub index: u64,
    /// Pairs handed to the transaction.
    pub attempted: usize,
    /// Pairs durably written: the successful sets of a committed
    /// transaction, 0 if the commit failed.
    pub committed: usize,
    /// Version assigned by the commit.
    pub version: Option<Version>,
    /// Set and commit failures, in the order they happened.
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    /// Whether every pair was written.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Applies `batch` in its own write transaction and commits it.
///
/// Every pair is attempted even if earlier ones fail; the transaction is
/// committed with whatever was accepted. Nothing is retried.
pub fn commit_batch(store: &Store, batch: Batch) -> BatchOutcome {
    let index = batch.index();
    let first_line = batch.first_line();
    let attempted = batch.len();
    let failure = |kind| BatchFailure {
        batch: index,
        first_line,
        kind,
    };

    let mut txn = match store.begin_write() {
        Ok(txn) => txn,
        Err(source) => {
            return BatchOutcome {
                index,
                attempted: 0,
                committed: 0,
                version: None,
                failures: vec![failure(FailureKind::Commit { source })],
            }
        }
    };

    let mut failures = Vec::new();
    let mut accepted = 0;
    for pair in batch.into_pairs() {
        let key = pair.key.clone();
        match txn.set(pair.key, pair.value) {
            Ok(()) => accepted += 1,
            Err(source) => failures.push(failure(FailureKind::Set { key, source })),
        }
    }

    let (committed, version) = match txn.commit() {
        Ok(version) => (accepted, Some(version)),
        Err(source) => {
            failures.push(failure(FailureKind::Commit { source }));
            (0, None)
        }
    };

    BatchOutcome {
        index,
        attempted,
        committed,
        version,
        failures,
    }
}
