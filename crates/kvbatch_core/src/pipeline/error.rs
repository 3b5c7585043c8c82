//! Pipeline errors.

use crate::error::CoreError;
use crate::pipeline::committer::BatchFailure;
use kvbatch_codec::CodecError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error returned by a line mapper.
pub type MapError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by a pipeline run.
///
/// Every variant except [`PipelineError::Batches`] is fatal: it stopped the
/// run before the whole input was read.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The line mapper rejected a line.
    #[error("line {line_number}: cannot map {line:?}: {source}")]
    Mapping {
        /// 1-based line number.
        line_number: u64,
        /// The offending line.
        line: String,
        /// Mapper error.
        source: MapError,
    },

    /// A record's key or value could not be encoded.
    #[error("line {line_number}: cannot encode record: {source}")]
    Serialization {
        /// 1-based line number.
        line_number: u64,
        /// Codec error.
        source: CodecError,
    },

    /// A record produced a zero-length key.
    #[error("line {line_number}: record has an empty key")]
    EmptyKey {
        /// 1-based line number.
        line_number: u64,
    },

    /// Reading the input stream failed.
    #[error("cannot read input: {0}")]
    StreamRead(#[source] io::Error),

    /// Opening or preparing the store failed before any work began.
    #[error("setup failed: {0}")]
    Setup(#[from] CoreError),

    /// The pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Every committer worker exited while batches were still being
    /// dispatched.
    #[error("committer workers stopped before the input was consumed")]
    WorkersStopped,

    /// One or more batches failed to apply or commit.
    #[error(transparent)]
    Batches(#[from] BatchErrors),
}

impl PipelineError {
    /// Whether the error stopped the run before all input was read.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Batches(_))
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Per-batch failures from a run that otherwise read all of its input.
///
/// Displays as a heading followed by one failure per line.
#[derive(Debug)]
pub struct BatchErrors {
    failures: Vec<BatchFailure>,
}

impl BatchErrors {
    pub(crate) fn new(mut failures: Vec<BatchFailure>) -> Self {
        failures.sort_by_key(|f| f.batch);
        Self { failures }
    }

    /// The failures, ordered by batch index.
    #[must_use]
    pub fn failures(&self) -> &[BatchFailure] {
        &self.failures
    }

    /// Number of failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Always false for an aggregate produced by a run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for BatchErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "errors inserting records:")?;
        for failure in &self.failures {
            write!(f, "\n{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchErrors {}
