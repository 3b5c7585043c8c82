//! Concurrent batched write pipeline.
//!
//! ```text
//! lines ──► encode ──► accumulate ──► bounded queue ──► committer pool ──► store
//!  (caller thread)                                      │           │
//!                                                       ▼           ▼
//!                                             completion tracker  error collector
//! ```
//!
//! Each line goes through a [`LineMapper`] and becomes an [`EncodedPair`].
//! Pairs are cut into [`Batch`]es of at most `batch_size`, and each batch is
//! committed as its own transaction by one of `max_in_flight` worker threads.
//! Batches are dispatched in input order, but they may commit in any order.
//!
//! Errors come in two classes:
//!
//! - **Fatal**: unreadable input, a rejected line, an unencodable record.
//!   Reading stops at once; batches already dispatched finish and stay
//!   committed.
//! - **Per batch**: a rejected `set` or a failed commit. These are collected
//!   from every worker and returned together as [`BatchErrors`] after the
//!   whole input has been processed.

mod accumulator;
mod collector;
mod committer;
mod config;
mod encoder;
mod error;
mod record;
mod tracker;
mod writer;

pub use accumulator::{Batch, BatchAccumulator};
pub use collector::{ErrorCollector, FailureSender};
pub use committer::{commit_batch, BatchFailure, BatchOutcome, FailureKind};
pub use config::{PipelineConfig, DEFAULT_BATCH_SIZE};
pub use encoder::{encode_line, encode_record, EncodedPair};
pub use error::{BatchErrors, MapError, PipelineError, PipelineResult};
pub use record::{CompositeKey, KeyValue, LineMapper, Record, RecordKey};
pub use tracker::{CompletionTracker, Ticket};
pub use writer::{write_to_dir, BatchWriter, WriteSummary};
