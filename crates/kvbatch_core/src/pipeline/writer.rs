//! The batched write pipeline.

use crate::pipeline::accumulator::{Batch, BatchAccumulator};
use crate::pipeline::collector::{ErrorCollector, FailureSender};
use crate::pipeline::committer::commit_batch;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::encoder::encode_line;
use crate::pipeline::error::{BatchErrors, PipelineError, PipelineResult};
use crate::pipeline::record::LineMapper;
use crate::pipeline::tracker::{CompletionTracker, Ticket};
use crate::store::Store;
use crate::types::Version;
use crossbeam_channel::{Receiver, Sender};
use std::io::BufRead;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

type Job<'t> = (Batch, Ticket<'t>);

/// Totals of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    /// Records committed.
    pub records: u64,
    /// Batches committed.
    pub batches: u64,
    /// Wall time from the first line read to the last commit.
    pub elapsed: Duration,
    /// Store version after the last commit.
    pub version: Version,
}

impl WriteSummary {
    /// Committed records per second.
    #[must_use]
    pub fn records_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.records as f64 / secs
        } else {
            self.records as f64
        }
    }
}

/// Streams lines through a mapper into a store, one transaction per batch.
///
/// The caller's thread reads and encodes lines and cuts them into batches.
/// A fixed pool of `max_in_flight` workers commits them; the dispatch queue
/// holds at most `max_in_flight` more, and reading pauses while it is full.
///
/// ```rust
/// use kvbatch_core::pipeline::{BatchWriter, KeyValue, PipelineConfig};
/// use kvbatch_core::Store;
///
/// let store = Store::open_in_memory().unwrap();
/// let mapper = |line: &str| -> Result<KeyValue<String, String>, String> {
///     let (key, value) = line.split_once('=').ok_or("missing '='")?;
///     Ok(KeyValue::new(key.to_string(), value.to_string()))
/// };
///
/// let writer = BatchWriter::new(&store, mapper, PipelineConfig::new().batch_size(2));
/// let summary = writer.write_stream("a=1\nb=2\nc=3\n".as_bytes()).unwrap();
/// assert_eq!(summary.records, 3);
/// assert_eq!(summary.batches, 2);
/// ```
pub struct BatchWriter<'s, M> {
    store: &'s Store,
    mapper: M,
    config: PipelineConfig,
}

impl<'s, M: LineMapper> BatchWriter<'s, M> {
    /// Creates a writer over `store`.
    pub fn new(store: &'s Store, mapper: M, config: PipelineConfig) -> Self {
        Self {
            store,
            mapper,
            config,
        }
    }

    /// Pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Writes every line of `reader`.
    ///
    /// On a fatal error (unreadable input, a line the mapper rejects, a
    /// record that cannot be encoded) reading stops, the partly filled
    /// batch is discarded and nothing more is dispatched. Batches already
    /// dispatched still run to completion and stay committed; the fatal
    /// error is returned once they are done.
    ///
    /// # Errors
    ///
    /// Returns the fatal error, or [`PipelineError::Batches`] with every
    /// per-batch failure if the whole input was read but some batches did
    /// not fully commit.
    pub fn write_stream<R: BufRead>(&self, reader: R) -> PipelineResult<WriteSummary> {
        self.config.validate()?;
        let workers = self.config.max_in_flight;
        info!(
            batch_size = self.config.batch_size,
            max_in_flight = workers,
            "starting batched write"
        );

        let start = Instant::now();
        let tracker = CompletionTracker::new();
        let collector = ErrorCollector::new();

        let produced = thread::scope(|scope| {
            let (queue, jobs) = crossbeam_channel::bounded::<Job<'_>>(workers);
            for worker in 0..workers {
                let jobs = jobs.clone();
                let failures = collector.sender();
                let store = self.store;
                scope.spawn(move || run_committer(worker, store, &jobs, &failures));
            }
            drop(jobs);

            let produced = self.produce(reader, &queue, &tracker);
            drop(queue);
            tracker.wait();
            produced
        });

        let failures = collector.drain();
        let elapsed = start.elapsed();

        if let Err(fatal) = produced {
            warn!(
                committed = tracker.committed(),
                batches = tracker.batches(),
                batch_failures = failures.len(),
                error = %fatal,
                "write aborted"
            );
            return Err(fatal);
        }

        if !failures.is_empty() {
            warn!(
                committed = tracker.committed(),
                attempted = tracker.attempted(),
                failed_batches = tracker.failed_batches(),
                "write finished with batch failures"
            );
            return Err(BatchErrors::new(failures).into());
        }

        let summary = WriteSummary {
            records: tracker.committed(),
            batches: tracker.batches(),
            elapsed,
            version: self.store.version(),
        };
        info!(
            records = summary.records,
            batches = summary.batches,
            ?elapsed,
            records_per_sec = summary.records_per_second() as u64,
            "Inserted {} records in {:?}",
            summary.records,
            elapsed
        );
        Ok(summary)
    }

    fn produce<'t, R: BufRead>(
        &self,
        reader: R,
        queue: &Sender<Job<'t>>,
        tracker: &'t CompletionTracker,
    ) -> PipelineResult<()> {
        let mut accumulator = BatchAccumulator::new(self.config.batch_size);
        let mut line_number = 0u64;

        for line in reader.lines() {
            line_number += 1;
            let line = line.map_err(PipelineError::StreamRead)?;
            let pair = encode_line(&self.mapper, line_number, &line)?;
            if let Some(batch) = accumulator.push(line_number, pair) {
                dispatch(queue, tracker, batch)?;
            }
        }

        if let Some(batch) = accumulator.finish() {
            dispatch(queue, tracker, batch)?;
        }
        debug!(lines = line_number, "input exhausted");
        Ok(())
    }
}

impl<M> std::fmt::Debug for BatchWriter<'_, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchWriter")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn dispatch<'t>(
    queue: &Sender<Job<'t>>,
    tracker: &'t CompletionTracker,
    batch: Batch,
) -> PipelineResult<()> {
    debug!(
        batch = batch.index(),
        first_line = batch.first_line(),
        records = batch.len(),
        "dispatching batch"
    );
    let ticket = tracker.dispatch();
    queue
        .send((batch, ticket))
        .map_err(|_| PipelineError::WorkersStopped)
}

fn run_committer(worker: usize, store: &Store, jobs: &Receiver<Job<'_>>, failures: &FailureSender) {
    for (batch, ticket) in jobs {
        let outcome = commit_batch(store, batch);
        let failed = !outcome.is_success();
        if failed {
            warn!(
                worker,
                batch = outcome.index,
                committed = outcome.committed,
                failures = outcome.failures.len(),
                "batch finished with errors"
            );
        } else {
            debug!(
                worker,
                batch = outcome.index,
                records = outcome.committed,
                version = outcome.version.map(Version::as_u64),
                "batch committed"
            );
        }

        let (index, attempted, committed) = (outcome.index, outcome.attempted, outcome.committed);
        for failure in outcome.failures {
            failures.report(failure);
        }
        let total = ticket.complete(attempted, committed, failed);
        info!(batch = index, total, "Records: {}", total);
    }
}

/// Opens (or creates) the store in `dir`, writes every line of `reader`
/// into it and closes it.
///
/// # Errors
///
/// Returns [`PipelineError::Setup`] if the store cannot be opened, otherwise
/// as [`BatchWriter::write_stream`].
pub fn write_to_dir<R, M>(
    dir: &Path,
    reader: R,
    mapper: M,
    config: PipelineConfig,
) -> PipelineResult<WriteSummary>
where
    R: BufRead,
    M: LineMapper,
{
    info!(directory = %dir.display(), batch_size = config.batch_size, "opening store");
    let store = Store::open(dir)?;
    let result = BatchWriter::new(&store, mapper, config).write_stream(reader);
    store.close()?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::record::KeyValue;
    use std::io::{self, Read};

    type Pair = KeyValue<String, String>;

    fn kv(line: &str) -> Result<Pair, String> {
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("no '=' in {line:?}"))?;
        Ok(KeyValue::new(key.to_string(), value.to_string()))
    }

    fn input(count: usize) -> String {
        (0..count).map(|i| format!("key{i:04}=value{i}\n")).collect()
    }

    #[test]
    fn writes_all_lines() {
        let store = Store::open_in_memory().unwrap();
        let config = PipelineConfig::new().batch_size(7).max_in_flight(3);
        let summary = BatchWriter::new(&store, kv, config)
            .write_stream(input(100).as_bytes())
            .unwrap();

        assert_eq!(summary.records, 100);
        assert_eq!(summary.batches, 15);
        assert_eq!(summary.version, Version::new(15));
        assert_eq!(store.len(), 100);
    }

    #[test]
    fn crlf_lines_are_stripped() {
        let store = Store::open_in_memory().unwrap();
        BatchWriter::new(&store, kv, PipelineConfig::new())
            .write_stream("a=1\r\nb=2\r\n".as_bytes())
            .unwrap();
        let value: String = kvbatch_codec::from_cbor(&store.get(b"b").unwrap().unwrap()).unwrap();
        assert_eq!(value, "2");
    }

    #[test]
    fn empty_input_commits_nothing() {
        let store = Store::open_in_memory().unwrap();
        let summary = BatchWriter::new(&store, kv, PipelineConfig::new())
            .write_stream(io::empty())
            .unwrap();
        assert_eq!(summary.records, 0);
        assert_eq!(summary.batches, 0);
        assert_eq!(store.version(), Version::ZERO);
    }

    #[test]
    fn invalid_config_fails_before_reading() {
        let store = Store::open_in_memory().unwrap();
        let err = BatchWriter::new(&store, kv, PipelineConfig::new().batch_size(0))
            .write_stream(input(3).as_bytes())
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig { .. }));
        assert!(store.is_empty());
    }

    struct FailingReader {
        good: io::Cursor<Vec<u8>>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.good.read(buf)? {
                0 => Err(io::Error::other("disk on fire")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn read_error_is_fatal() {
        let store = Store::open_in_memory().unwrap();
        let reader = io::BufReader::new(FailingReader {
            good: io::Cursor::new(input(4).into_bytes()),
        });
        let config = PipelineConfig::new().batch_size(2).max_in_flight(1);
        let err = BatchWriter::new(&store, kv, config)
            .write_stream(reader)
            .unwrap_err();

        assert!(matches!(err, PipelineError::StreamRead(_)));
        assert!(err.is_fatal());
        // both full batches were dispatched before the error
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn read_only_store_reports_every_batch() {
        let dir = tempfile::tempdir().unwrap();
        drop(Store::open(dir.path()).unwrap());
        let store = Store::open_with_config(dir.path(), crate::StoreConfig::read_only()).unwrap();

        let config = PipelineConfig::new().batch_size(2).max_in_flight(2);
        let err = BatchWriter::new(&store, kv, config)
            .write_stream(input(5).as_bytes())
            .unwrap_err();

        match err {
            PipelineError::Batches(errors) => {
                assert_eq!(errors.len(), 3);
                let batches: Vec<u64> = errors.failures().iter().map(|f| f.batch).collect();
                assert_eq!(batches, vec![0, 1, 2]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn write_to_dir_persists() {
        let dir = tempfile::tempdir().unwrap();
        let summary =
            write_to_dir(dir.path(), input(10).as_bytes(), kv, PipelineConfig::new().batch_size(4))
                .unwrap();
        assert_eq!(summary.records, 10);

        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.len(), 10);
    }

    #[test]
    fn records_per_second_handles_zero_elapsed() {
        let summary = WriteSummary {
            records: 10,
            batches: 1,
            elapsed: Duration::ZERO,
            version: Version::new(1),
        };
        assert_eq!(summary.records_per_second(), 10.0);
    }
}
