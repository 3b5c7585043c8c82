//! Backup, restore and verify commands.

use kvbatch_core::backup::read_backup_metadata;
use kvbatch_core::{create_backup, restore_backup, BackupMetadata, Store, StoreConfig};
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Backup verification result.
#[derive(Debug, Serialize)]
pub struct VerifyResult {
    /// Backup file path.
    pub path: String,
    /// Whether the backup is intact.
    pub valid: bool,
    /// Why the backup is invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Metadata of a valid backup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataView>,
}

/// Serializable view of [`BackupMetadata`].
#[derive(Debug, Serialize)]
pub struct MetadataView {
    /// Size in bytes.
    pub size: u64,
    /// Number of entries.
    pub entry_count: u64,
    /// Watermark version.
    pub version: u64,
    /// Lower bound of an incremental backup.
    pub since: u64,
    /// Whether the backup is incremental.
    pub incremental: bool,
    /// Creation time, Unix milliseconds.
    pub created_at_ms: u64,
}

impl From<&BackupMetadata> for MetadataView {
    fn from(metadata: &BackupMetadata) -> Self {
        Self {
            size: metadata.size,
            entry_count: metadata.entry_count,
            version: metadata.version.as_u64(),
            since: metadata.since.as_u64(),
            incremental: metadata.is_incremental(),
            created_at_ms: metadata.created_at_ms,
        }
    }
}

/// Creates a backup of the store in `db_path`.
pub fn create(
    db_path: &Path,
    output_dir: &Path,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Creating backup of {:?}", db_path);

    let report = create_backup(db_path, output_dir, name)?;

    println!("✓ Backup created successfully");
    println!("  Path: {:?}", report.path);
    print_metadata(&report.metadata);
    println!("  Elapsed: {:?}", report.elapsed);

    Ok(())
}

/// Restores the store in `db_path` from a backup file.
pub fn restore(
    db_path: &Path,
    input_path: &Path,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Restoring store from {:?}", input_path);

    // Validate before touching the target
    let metadata = read_backup_metadata(BufReader::new(File::open(input_path)?))?;

    if db_path.exists() {
        let existing = Store::open_with_config(db_path, StoreConfig::read_only())?.len();
        if existing > 0 {
            if !force {
                return Err(format!(
                    "store at {:?} already holds {existing} keys. Use --force to replace it.",
                    db_path
                )
                .into());
            }
            fs::remove_dir_all(db_path)?;
        }
    }

    let stats = restore_backup(db_path, input_path)?;

    println!("✓ Store restored successfully");
    println!("  Path: {:?}", db_path);
    println!("  Entries restored: {}", stats.applied);
    println!("  Version: {}", stats.metadata.version);
    println!(
        "  From backup created: {}",
        format_timestamp(metadata.created_at_ms)
    );

    Ok(())
}

/// Verifies a backup file without restoring it.
pub fn verify(input_path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!("Verifying backup {:?}", input_path);

    let file = File::open(input_path)?;
    let outcome = read_backup_metadata(BufReader::new(file));
    let result = VerifyResult {
        path: input_path.display().to_string(),
        valid: outcome.is_ok(),
        error: outcome.as_ref().err().map(ToString::to_string),
        metadata: outcome.as_ref().ok().map(MetadataView::from),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => match &outcome {
            Ok(metadata) => {
                println!("✓ Backup is valid");
                print_metadata(metadata);
            }
            Err(err) => println!("✗ Backup is invalid or corrupted: {err}"),
        },
    }

    if result.valid {
        Ok(())
    } else {
        Err("Backup verification failed".into())
    }
}

fn print_metadata(metadata: &BackupMetadata) {
    println!("  File size: {} bytes", metadata.size);
    println!("  Entries: {}", metadata.entry_count);
    println!("  Version: {}", metadata.version);
    if metadata.is_incremental() {
        println!("  Since: {}", metadata.since);
    }
    println!("  Created: {}", format_timestamp(metadata.created_at_ms));
}

fn format_timestamp(ms: u64) -> String {
    let secs = ms / 1000;
    let days = secs / 86_400;
    format!(
        "{} days, {:02}:{:02}:{:02} since epoch",
        days,
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated_store(path: &Path, keys: &[&str]) {
        let store = Store::open(path).unwrap();
        for key in keys {
            store.update(|txn| txn.set(*key, "v")).unwrap();
        }
        store.close().unwrap();
    }

    #[test]
    fn create_then_restore() {
        let temp = tempfile::tempdir().unwrap();
        let db = temp.path().join("db");
        populated_store(&db, &["a", "b"]);

        create(&db, &temp.path().join("out"), "db.bak").unwrap();
        let backup = temp.path().join("out").join("db.bak");
        verify(&backup, "json").unwrap();

        let restored = temp.path().join("restored");
        restore(&restored, &backup, false).unwrap();
        let store = Store::open(&restored).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn restore_refuses_non_empty_store_without_force() {
        let temp = tempfile::tempdir().unwrap();
        let db = temp.path().join("db");
        populated_store(&db, &["a"]);
        create(&db, temp.path(), "db.bak").unwrap();

        let target = temp.path().join("target");
        populated_store(&target, &["x", "y"]);
        let backup = temp.path().join("db.bak");

        assert!(restore(&target, &backup, false).is_err());
        restore(&target, &backup, true).unwrap();

        let store = Store::open(&target).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(b"x").unwrap().is_none());
    }

    #[test]
    fn verify_rejects_garbage() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("junk.bak");
        fs::write(&path, b"definitely not a backup").unwrap();
        assert!(verify(&path, "text").is_err());
    }

    #[test]
    fn timestamp_formatting() {
        assert_eq!(format_timestamp(0), "0 days, 00:00:00 since epoch");
        assert_eq!(format_timestamp(90_061_000), "1 days, 01:01:01 since epoch");
    }
}
