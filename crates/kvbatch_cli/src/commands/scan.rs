//! Scan command implementation.

use kvbatch_codec::from_cbor;
use kvbatch_core::{EntryRef, Store, StoreConfig};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

/// Scan output.
#[derive(Debug, Serialize)]
pub struct ScanResult {
    /// Store path.
    pub path: String,
    /// Store version of the snapshot.
    pub version: u64,
    /// Keys in the store.
    pub total: usize,
    /// Entries printed.
    pub entries: Vec<ScanEntry>,
}

/// One printed entry.
#[derive(Debug, Serialize)]
pub struct ScanEntry {
    /// Key as UTF-8, or hex if it is not valid UTF-8.
    pub key: String,
    /// Value decoded from CBOR, or its hex bytes if it cannot be decoded.
    pub value: serde_json::Value,
    /// Version that wrote the entry.
    pub version: u64,
}

/// Runs the scan command.
pub fn run(
    path: &Path,
    prefix: Option<&str>,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open_with_config(path, StoreConfig::read_only())?;
    let result = scan(&store, path, prefix, limit);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn scan(store: &Store, path: &Path, prefix: Option<&str>, limit: Option<usize>) -> ScanResult {
    let snapshot = store.snapshot();
    let limit = limit.unwrap_or(usize::MAX);
    let entries = match prefix {
        Some(prefix) => snapshot
            .prefix(prefix.as_bytes())
            .take(limit)
            .map(to_entry)
            .collect(),
        None => snapshot.iter().take(limit).map(to_entry).collect(),
    };

    ScanResult {
        path: path.display().to_string(),
        version: snapshot.version().as_u64(),
        total: snapshot.len(),
        entries,
    }
}

fn to_entry(entry: EntryRef<'_>) -> ScanEntry {
    ScanEntry {
        key: std::str::from_utf8(entry.key).map_or_else(|_| hex(entry.key), str::to_string),
        value: from_cbor(entry.value).unwrap_or_else(|_| serde_json::Value::String(hex(entry.value))),
        version: entry.version.as_u64(),
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 2);
    out.push_str("0x");
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn print_text_output(result: &ScanResult) {
    for entry in &result.entries {
        println!("{} => {} (v{})", entry.key, entry.value, entry.version);
    }
    println!(
        "{} of {} entries at v{}",
        result.entries.len(),
        result.total,
        result.version
    );
}
