//! Completion tracking across committer workers.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};

/// Wait-group plus running totals for one pipeline run.
///
/// Every dispatched batch holds a [`Ticket`]; [`wait`](Self::wait) returns
/// once all tickets have been completed or dropped.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    in_flight: Mutex<usize>,
    idle: Condvar,
    committed: AtomicU64,
    attempted: AtomicU64,
    batches: AtomicU64,
    failed_batches: AtomicU64,
}

impl CompletionTracker {
    /// Creates an idle tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a dispatched batch.
    pub fn dispatch(&self) -> Ticket<'_> {
        *self.in_flight.lock() += 1;
        Ticket {
            tracker: self,
            completed: false,
        }
    }

    /// Blocks until every dispatched ticket is done.
    pub fn wait(&self) {
        let mut in_flight = self.in_flight.lock();
        while *in_flight > 0 {
            self.idle.wait(&mut in_flight);
        }
    }

    /// Batches dispatched but not yet done.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    /// Records written by committed batches.
    #[must_use]
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    /// Records handed to committers.
    #[must_use]
    pub fn attempted(&self) -> u64 {
        self.attempted.load(Ordering::Relaxed)
    }

    /// Batches completed.
    #[must_use]
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Completed batches that reported at least one failure.
    #[must_use]
    pub fn failed_batches(&self) -> u64 {
        self.failed_batches.load(Ordering::Relaxed)
    }

    fn release(&self) {
        let mut in_flight = self.in_flight.lock();
        *in_flight = in_flight.saturating_sub(1);
        if *in_flight == 0 {
            self.idle.notify_all();
        }
    }
}

/// Proof that one batch was dispatched.
///
/// Dropping a ticket without completing it (for example when a worker
/// unwinds) still releases it, so [`CompletionTracker::wait`] cannot hang.
#[derive(Debug)]
#[must_use = "a ticket must be completed or dropped when its batch is done"]
pub struct Ticket<'a> {
    tracker: &'a CompletionTracker,
    completed: bool,
}

impl Ticket<'_> {
    /// Reports the batch's counts and releases the ticket.
    ///
    /// Returns the records committed so far across the whole run, this
    /// batch included.
    pub fn complete(mut self, attempted: usize, committed: usize, failed: bool) -> u64 {
        let tracker = self.tracker;
        tracker
            .attempted
            .fetch_add(attempted as u64, Ordering::Relaxed);
        let total = tracker
            .committed
            .fetch_add(committed as u64, Ordering::Relaxed)
            + committed as u64;
        if failed {
            tracker.failed_batches.fetch_add(1, Ordering::Relaxed);
        }
        tracker.batches.fetch_add(1, Ordering::Relaxed);
        self.completed = true;
        tracker.release();
        total
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.tracker.release();
        }
    }
}
