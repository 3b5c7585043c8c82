//! Backup and restore.
//!
//! A backup is a single stream holding every entry of one store snapshot
//! (or, for an incremental backup, every entry written after a watermark
//! version), each with the version of the commit that wrote it.
//!
//! ## Backup Format
//!
//! ```text
//! header  | magic "KVBK" (4) | version (2) | created_ms (8) | since (8) |
//! entry   | 0x01 | key_len (4) | key | value_len (4) | value | version (8) |
//! trailer | 0x00 | entry_count (8) | watermark (8) | crc32 (4) |
//! ```
//!
//! Integers are little-endian; the CRC covers every byte before it. Both
//! sides stream: neither writing nor reading a backup holds it in memory.
//!
//! ## Usage
//!
//! ```rust
//! use kvbatch_core::backup::{create_backup, restore_backup};
//! use kvbatch_core::Store;
//!
//! let temp = tempfile::tempdir().unwrap();
//! let source = temp.path().join("db");
//! {
//!     let store = Store::open(&source).unwrap();
//!     store.update(|txn| txn.set("k", "v")).unwrap();
//! }
//!
//! let report = create_backup(&source, &temp.path().join("backups"), "db.bak").unwrap();
//! let stats = restore_backup(&temp.path().join("restored"), &report.path).unwrap();
//! assert_eq!(stats.applied, 1);
//! ```

use crate::config::StoreConfig;
use crate::crc::Crc32;
use crate::error::{CoreError, CoreResult};
use crate::store::{LoadStats, Store};
use crate::types::Version;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::info;

/// Magic bytes opening every backup.
pub const BACKUP_MAGIC: [u8; 4] = *b"KVBK";

/// Current backup format version.
pub const BACKUP_VERSION: u16 = 1;

const TAG_ENTRY: u8 = 0x01;
const TAG_TRAILER: u8 = 0x00;

/// Metadata describing a complete backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupMetadata {
    /// When the backup was started (Unix timestamp in milliseconds).
    pub created_at_ms: u64,
    /// Entries at or below this version were left out.
    pub since: Version,
    /// Number of entries in the backup.
    pub entry_count: u64,
    /// Watermark: the store version the backup captures.
    pub version: Version,
    /// Total size of the backup in bytes.
    pub size: u64,
}

impl BackupMetadata {
    /// Whether this backup only holds entries newer than a watermark.
    #[must_use]
    pub fn is_incremental(&self) -> bool {
        self.since > Version::ZERO
    }
}

/// Streaming writer for the backup format.
pub struct BackupWriter<W: Write> {
    inner: W,
    crc: Crc32,
    created_at_ms: u64,
    since: Version,
    entry_count: u64,
    size: u64,
}

impl<W: Write> BackupWriter<W> {
    /// Writes the backup header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be written.
    pub fn new(inner: W, since: Version) -> CoreResult<Self> {
        let created_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let mut writer = Self {
            inner,
            crc: Crc32::new(),
            created_at_ms,
            since,
            entry_count: 0,
            size: 0,
        };
        writer.put(&BACKUP_MAGIC)?;
        writer.put(&BACKUP_VERSION.to_le_bytes())?;
        writer.put(&created_at_ms.to_le_bytes())?;
        writer.put(&since.as_u64().to_le_bytes())?;
        Ok(writer)
    }

    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if a key or value does not fit a 4-byte length or the
    /// write fails.
    pub fn write_entry(&mut self, key: &[u8], value: &[u8], version: Version) -> CoreResult<()> {
        self.put(&[TAG_ENTRY])?;
        self.put_bytes(key)?;
        self.put_bytes(value)?;
        self.put(&version.as_u64().to_le_bytes())?;
        self.entry_count += 1;
        Ok(())
    }

    /// Writes the trailer, flushes, and returns the backup's metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the trailer cannot be written or flushed.
    pub fn finish(mut self, watermark: Version) -> CoreResult<BackupMetadata> {
        self.put(&[TAG_TRAILER])?;
        self.put(&self.entry_count.to_le_bytes())?;
        self.put(&watermark.as_u64().to_le_bytes())?;
        let crc = self.crc.finish();
        self.inner.write_all(&crc.to_le_bytes())?;
        self.inner.flush()?;

        Ok(BackupMetadata {
            created_at_ms: self.created_at_ms,
            since: self.since,
            entry_count: self.entry_count,
            version: watermark,
            size: self.size + 4,
        })
    }

    fn put(&mut self, data: &[u8]) -> CoreResult<()> {
        self.inner.write_all(data)?;
        self.crc.update(data);
        self.size += data.len() as u64;
        Ok(())
    }

    fn put_bytes(&mut self, data: &[u8]) -> CoreResult<()> {
        let len = u32::try_from(data.len())
            .map_err(|_| CoreError::invalid_operation("backup field larger than 4 GiB"))?;
        self.put(&len.to_le_bytes())?;
        self.put(data)
    }
}

/// An entry read from a backup: key, value and the version that wrote it.
pub type BackupEntry = (Vec<u8>, Vec<u8>, Version);

/// Streaming reader for the backup format.
///
/// Entries are handed out before the trailer's checksum has been checked;
/// only once [`next_entry`](Self::next_entry) returns `Ok(None)` is the
/// backup known to be intact.
pub struct BackupReader<R: Read> {
    inner: R,
    crc: Crc32,
    created_at_ms: u64,
    since: Version,
    entries_read: u64,
    size: u64,
    complete: Option<BackupMetadata>,
}

impl<R: Read> BackupReader<R> {
    /// Reads and validates the backup header.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] for a bad magic, an unsupported
    /// format version, or a truncated header.
    pub fn new(inner: R) -> CoreResult<Self> {
        let mut reader = Self {
            inner,
            crc: Crc32::new(),
            created_at_ms: 0,
            since: Version::ZERO,
            entries_read: 0,
            size: 0,
            complete: None,
        };

        let magic: [u8; 4] = reader.array()?;
        if magic != BACKUP_MAGIC {
            return Err(CoreError::invalid_format("not a backup: bad magic"));
        }
        let version = u16::from_le_bytes(reader.array()?);
        if version != BACKUP_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported backup version {version}"
            )));
        }
        reader.created_at_ms = u64::from_le_bytes(reader.array()?);
        reader.since = Version::new(u64::from_le_bytes(reader.array()?));
        Ok(reader)
    }

    /// Reads the next entry, or validates the trailer and returns `None`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidFormat`] for truncation, an unknown tag, an
    ///   entry count that disagrees with the trailer, or trailing bytes
    /// - [`CoreError::ChecksumMismatch`] if the CRC does not match
    pub fn next_entry(&mut self) -> CoreResult<Option<BackupEntry>> {
        if self.complete.is_some() {
            return Ok(None);
        }

        let [tag] = self.array()?;
        match tag {
            TAG_ENTRY => {
                let key = self.bytes()?;
                let value = self.bytes()?;
                let version = Version::new(u64::from_le_bytes(self.array()?));
                self.entries_read += 1;
                Ok(Some((key, value, version)))
            }
            TAG_TRAILER => {
                self.read_trailer()?;
                Ok(None)
            }
            other => Err(CoreError::invalid_format(format!(
                "unknown backup tag {other:#04x} after {} entries",
                self.entries_read
            ))),
        }
    }

    /// Metadata of a fully read backup.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the trailer has not been
    /// reached yet.
    pub fn metadata(&self) -> CoreResult<BackupMetadata> {
        self.complete
            .ok_or_else(|| CoreError::invalid_operation("backup has not been fully read"))
    }

    fn read_trailer(&mut self) -> CoreResult<()> {
        let entry_count = u64::from_le_bytes(self.array()?);
        let watermark = Version::new(u64::from_le_bytes(self.array()?));
        let actual = self.crc.finish();

        let mut crc = [0u8; 4];
        read_exact(&mut self.inner, &mut crc)?;
        let expected = u32::from_le_bytes(crc);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch { expected, actual });
        }
        if entry_count != self.entries_read {
            return Err(CoreError::invalid_format(format!(
                "trailer counts {entry_count} entries, found {}",
                self.entries_read
            )));
        }
        let mut extra = [0u8; 1];
        if self.inner.read(&mut extra)? != 0 {
            return Err(CoreError::invalid_format("trailing bytes after backup trailer"));
        }

        self.complete = Some(BackupMetadata {
            created_at_ms: self.created_at_ms,
            since: self.since,
            entry_count,
            version: watermark,
            size: self.size + 4,
        });
        Ok(())
    }

    fn array<const N: usize>(&mut self) -> CoreResult<[u8; N]> {
        let mut buf = [0u8; N];
        read_exact(&mut self.inner, &mut buf)?;
        self.crc.update(&buf);
        self.size += N as u64;
        Ok(buf)
    }

    fn bytes(&mut self) -> CoreResult<Vec<u8>> {
        let len = u32::from_le_bytes(self.array()?) as u64;
        let mut buf = Vec::new();
        (&mut self.inner).take(len).read_to_end(&mut buf)?;
        if buf.len() as u64 != len {
            return Err(truncated());
        }
        self.crc.update(&buf);
        self.size += len;
        Ok(buf)
    }
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> CoreResult<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            truncated()
        } else {
            CoreError::Io(e)
        }
    })
}

fn truncated() -> CoreError {
    CoreError::invalid_format("backup is truncated")
}

/// Reads a whole backup, checking its structure and checksum, and returns
/// its metadata without applying anything.
///
/// # Errors
///
/// Returns the first format or checksum error found.
pub fn read_backup_metadata<R: Read>(reader: R) -> CoreResult<BackupMetadata> {
    let mut backup = BackupReader::new(reader)?;
    while backup.next_entry()?.is_some() {}
    backup.metadata()
}

/// Result of [`create_backup`].
#[derive(Debug, Clone)]
pub struct BackupReport {
    /// Path of the written backup file.
    pub path: PathBuf,
    /// Metadata of the written backup.
    pub metadata: BackupMetadata,
    /// Wall time spent.
    pub elapsed: Duration,
}

/// Backs up the store in `source_dir` to `backup_dir/backup_name`.
///
/// The store is opened read-only, so this can run while no writer holds the
/// directory. `backup_dir` is created if needed and an existing file of the
/// same name is replaced. A failed backup may leave a truncated file behind.
///
/// # Errors
///
/// - [`CoreError::DirectoryCreate`] if `backup_dir` cannot be created
/// - [`CoreError::FileCreate`] if the backup file cannot be created
/// - any error opening the store or writing the backup
pub fn create_backup(
    source_dir: &Path,
    backup_dir: &Path,
    backup_name: &str,
) -> CoreResult<BackupReport> {
    let start = Instant::now();
    let store = Store::open_with_config(source_dir, StoreConfig::read_only())?;

    fs::create_dir_all(backup_dir).map_err(|source| CoreError::DirectoryCreate {
        path: backup_dir.to_path_buf(),
        source,
    })?;
    let path = backup_dir.join(backup_name);
    let file = File::create(&path).map_err(|source| CoreError::FileCreate {
        path: path.clone(),
        source,
    })?;

    let mut writer = BufWriter::new(file);
    let metadata = store.backup(&mut writer, Version::ZERO)?;
    let file = writer.into_inner().map_err(|e| CoreError::Io(e.into_error()))?;
    file.sync_all()?;

    let elapsed = start.elapsed();
    info!(
        source = %source_dir.display(),
        path = %path.display(),
        entries = metadata.entry_count,
        version = metadata.version.as_u64(),
        ?elapsed,
        "backup created"
    );

    Ok(BackupReport {
        path,
        metadata,
        elapsed,
    })
}

/// Loads the backup file `backup_file` into the store at `target_dir`,
/// creating the store if it does not exist.
///
/// # Errors
///
/// Returns an error if the file cannot be opened, the store cannot be
/// opened, or the backup is invalid.
pub fn restore_backup(target_dir: &Path, backup_file: &Path) -> CoreResult<LoadStats> {
    let start = Instant::now();
    let file = File::open(backup_file)?;
    let store = Store::open(target_dir)?;
    let stats = store.load(BufReader::new(file))?;
    store.close()?;

    info!(
        target = %target_dir.display(),
        backup = %backup_file.display(),
        applied = stats.applied,
        skipped = stats.skipped,
        elapsed = ?start.elapsed(),
        "backup restored"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(entries: &[(&str, &str, u64)], since: u64, watermark: u64) -> Vec<u8> {
        let mut out = Vec::new();
        let mut writer = BackupWriter::new(&mut out, Version::new(since)).unwrap();
        for (key, value, version) in entries {
            writer
                .write_entry(key.as_bytes(), value.as_bytes(), Version::new(*version))
                .unwrap();
        }
        writer.finish(Version::new(watermark)).unwrap();
        out
    }

    fn read_all(data: &[u8]) -> CoreResult<(Vec<BackupEntry>, BackupMetadata)> {
        let mut reader = BackupReader::new(data)?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry()? {
            entries.push(entry);
        }
        Ok((entries, reader.metadata()?))
    }

    #[test]
    fn writes_and_reads_entries() {
        let data = sample(&[("a", "1", 1), ("b", "", 3)], 0, 3);
        let (entries, metadata) = read_all(&data).unwrap();

        assert_eq!(
            entries,
            vec![
                (b"a".to_vec(), b"1".to_vec(), Version::new(1)),
                (b"b".to_vec(), Vec::new(), Version::new(3)),
            ]
        );
        assert_eq!(metadata.entry_count, 2);
        assert_eq!(metadata.version, Version::new(3));
        assert_eq!(metadata.size, data.len() as u64);
        assert!(!metadata.is_incremental());
    }

    #[test]
    fn writer_metadata_matches_reader() {
        let mut out = Vec::new();
        let mut writer = BackupWriter::new(&mut out, Version::new(4)).unwrap();
        writer.write_entry(b"k", b"v", Version::new(5)).unwrap();
        let written = writer.finish(Version::new(5)).unwrap();

        let read = read_backup_metadata(out.as_slice()).unwrap();
        assert_eq!(written, read);
        assert!(read.is_incremental());
    }

    #[test]
    fn empty_backup_is_valid() {
        let data = sample(&[], 0, 0);
        let metadata = read_backup_metadata(data.as_slice()).unwrap();
        assert_eq!(metadata.entry_count, 0);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut data = sample(&[("a", "1", 1)], 0, 1);
        data[0] = b'X';
        assert!(matches!(
            read_backup_metadata(data.as_slice()),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn flipped_value_byte_fails_checksum() {
        let mut data = sample(&[("key", "value", 1)], 0, 1);
        // header (22) + tag (1) + key_len (4) + key (3) + value_len (4)
        data[34] ^= 0x01;
        assert!(matches!(
            read_backup_metadata(data.as_slice()),
            Err(CoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn truncation_anywhere_is_rejected() {
        let data = sample(&[("a", "1", 1), ("b", "2", 2)], 0, 2);
        for len in 0..data.len() {
            let result = read_backup_metadata(&data[..len]);
            assert!(
                matches!(result, Err(CoreError::InvalidFormat { .. })),
                "length {len} accepted"
            );
        }
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut data = sample(&[("a", "1", 1)], 0, 1);
        data.push(0);
        assert!(matches!(
            read_backup_metadata(data.as_slice()),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn metadata_before_trailer_is_an_error() {
        let data = sample(&[("a", "1", 1)], 0, 1);
        let mut reader = BackupReader::new(data.as_slice()).unwrap();
        assert!(reader.next_entry().unwrap().is_some());
        assert!(matches!(
            reader.metadata(),
            Err(CoreError::InvalidOperation { .. })
        ));
    }
}
