//! Benchmark utilities.

use kvbatch_core::pipeline::{BatchWriter, KeyValue, PipelineConfig};
use kvbatch_core::Store;

/// Generates `count` CSV lines of three fields, each line `width` bytes or
/// a little more.
pub fn csv_input(count: usize, width: usize) -> String {
    let pad = "x".repeat(width.saturating_sub(24));
    (0..count)
        .map(|i| format!("key{i:08},field{},{pad}\n", i % 97))
        .collect()
}

/// Maps a CSV line to a record keyed by the whole line.
pub fn csv_mapper(line: &str) -> Result<KeyValue<String, Vec<String>>, String> {
    let fields: Vec<String> = line.split(',').map(str::to_string).collect();
    if fields.len() != 3 {
        return Err(format!("expected 3 fields, got {}", fields.len()));
    }
    Ok(KeyValue::new(line.to_string(), fields))
}

/// Returns an in-memory store holding `count` records.
pub fn populated_store(count: usize) -> Store {
    let store = Store::open_in_memory().expect("open in-memory store");
    BatchWriter::new(&store, csv_mapper, PipelineConfig::new())
        .write_stream(csv_input(count, 64).as_bytes())
        .expect("populate store");
    store
}
