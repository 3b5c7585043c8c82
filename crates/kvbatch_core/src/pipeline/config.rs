//! Pipeline configuration.

use crate::pipeline::error::{PipelineError, PipelineResult};
use std::num::NonZeroUsize;
use std::thread;

/// Default number of records per transaction.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Configuration for a [`BatchWriter`](crate::pipeline::BatchWriter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Maximum records per batch (one transaction each). Must be at least 1.
    pub batch_size: usize,
    /// Committer worker threads, which is also the most transactions open at
    /// once. The dispatch queue holds as many batches again. Must be at
    /// least 1.
    pub max_in_flight: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: thread::available_parallelism().map_or(4, NonZeroUsize::get),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the batch size.
    #[must_use]
    pub const fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the number of committer workers.
    #[must_use]
    pub const fn max_in_flight(mut self, workers: usize) -> Self {
        self.max_in_flight = workers;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if either value is 0.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::invalid_config("batch size must be at least 1"));
        }
        if self.max_in_flight == 0 {
            return Err(PipelineError::invalid_config(
                "max in-flight batches must be at least 1",
            ));
        }
        Ok(())
    }
}
