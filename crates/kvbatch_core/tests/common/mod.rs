//! Shared fixtures for integration tests.

#![allow(dead_code)]

use kvbatch_codec::{from_cbor, CodecResult};
use kvbatch_core::pipeline::Record;
use kvbatch_core::{Store, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SAMPLE_INPUT: &str = "field11,field12,field13
field21,field22,field23
field31,field32,field33";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub field1: String,
    pub field2: String,
    pub field3: String,
}

impl SampleRecord {
    pub fn new(field1: &str, field2: &str, field3: &str) -> Self {
        Self {
            field1: field1.to_string(),
            field2: field2.to_string(),
            field3: field3.to_string(),
        }
    }
}

impl Record for SampleRecord {
    type Value = Self;

    fn key(&self) -> CodecResult<Vec<u8>> {
        Ok(format!("{},{},{}", self.field1, self.field2, self.field3).into_bytes())
    }

    fn value(&self) -> &Self {
        self
    }
}

pub fn csv_to_sample(line: &str) -> Result<SampleRecord, String> {
    match line.split(',').collect::<Vec<_>>().as_slice() {
        [a, b, c] => Ok(SampleRecord::new(a, b, c)),
        fields => Err(format!("expected 3 fields, got {}", fields.len())),
    }
}

pub fn sample_lines(count: usize) -> String {
    (0..count)
        .map(|i| format!("r{i:05},a{i},b{i}\n"))
        .collect()
}

/// Decodes every record of the store at `dir`, in key order.
pub fn read_dir(dir: &Path) -> Vec<SampleRecord> {
    let store = Store::open_with_config(dir, StoreConfig::read_only()).unwrap();
    read_store(&store)
}

pub fn read_store(store: &Store) -> Vec<SampleRecord> {
    store
        .snapshot()
        .iter()
        .map(|entry| from_cbor(entry.value).unwrap())
        .collect()
}
