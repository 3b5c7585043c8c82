//! File backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A log stored in a single file.
///
/// `flush` hands buffered bytes to the OS; `sync` calls `File::sync_all`.
/// The file handle sits behind a mutex so reads (which seek) and appends
/// never interleave.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: File,
    size: u64,
}

impl FileBackend {
    /// Opens the log at `path`, creating an empty file if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(FileState { file, size }),
        })
    }

    /// Opens an existing log for reading only.
    ///
    /// Appends, syncs and truncation on the returned backend fail with an
    /// I/O error; nothing on disk is created or changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be read.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(FileState { file, size }),
        })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut state = self.inner.lock();
        let end = offset.saturating_add(len as u64);
        if end > state.size {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: state.size,
            });
        }

        let mut buffer = vec![0u8; len];
        if len > 0 {
            state.file.seek(SeekFrom::Start(offset))?;
            state.file.read_exact(&mut buffer)?;
        }
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let state = self.inner.get_mut();
        let offset = state.size;
        if data.is_empty() {
            return Ok(offset);
        }
        state.file.seek(SeekFrom::End(0))?;
        state.file.write_all(data)?;
        state.size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.get_mut().file.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.get_mut().file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().size)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let state = self.inner.get_mut();
        if new_size > state.size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: state.size,
            });
        }
        state.file.set_len(new_size)?;
        state.file.sync_all()?;
        state.size = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_read_back() {
        let dir = tempdir().unwrap();
        let mut log = FileBackend::open(&dir.path().join("wal.log")).unwrap();

        assert_eq!(log.append(b"hello").unwrap(), 0);
        assert_eq!(log.append(b" world").unwrap(), 5);
        assert_eq!(log.read_at(0, 11).unwrap(), b"hello world");
        assert_eq!(log.read_at(6, 5).unwrap(), b"world");
    }

    #[test]
    fn contents_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        {
            let mut log = FileBackend::open(&path).unwrap();
            log.append(b"durable").unwrap();
            log.sync().unwrap();
        }

        let log = FileBackend::open(&path).unwrap();
        assert_eq!(log.size().unwrap(), 7);
        assert_eq!(log.read_at(0, 7).unwrap(), b"durable");
    }

    #[test]
    fn truncate_drops_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let mut log = FileBackend::open(&path).unwrap();
        log.append(b"completepartial").unwrap();

        log.truncate(8).unwrap();
        assert_eq!(log.size().unwrap(), 8);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8);
        assert!(matches!(
            log.read_at(4, 8),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn read_only_log_reads_but_never_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        {
            let mut log = FileBackend::open(&path).unwrap();
            log.append(b"snapshot").unwrap();
            log.sync().unwrap();
        }

        let mut log = FileBackend::open_read_only(&path).unwrap();
        assert_eq!(log.path(), path);
        assert_eq!(log.read_at(0, 8).unwrap(), b"snapshot");
        assert!(matches!(log.append(b"more"), Err(StorageError::Io(_))));
        assert_eq!(log.size().unwrap(), 8);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8);
    }

    #[test]
    fn read_only_open_does_not_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.log");
        assert!(matches!(
            FileBackend::open_read_only(&path),
            Err(StorageError::Io(_))
        ));
        assert!(!path.exists());
    }
}
