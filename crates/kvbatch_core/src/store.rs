//! Store facade and recovery.

use crate::backup::{BackupMetadata, BackupReader, BackupWriter};
use crate::config::StoreConfig;
use crate::dir::{LockMode, StoreDir};
use crate::error::{CoreError, CoreResult};
use crate::transaction::WriteTransaction;
use crate::types::{TransactionId, Version};
use crate::wal::{WalManager, WalRecord};
use kvbatch_storage::{FileBackend, MemoryBackend, StorageBackend};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Read, Write};
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    version: Version,
}

type Table = BTreeMap<Vec<u8>, Entry>;

/// An embedded, ordered key-value store.
///
/// All state lives in an in-memory ordered table rebuilt from the
/// write-ahead log when the store is opened. The handle is `Sync`: share it
/// by reference across threads and give each thread its own
/// [`WriteTransaction`].
///
/// ```rust
/// use kvbatch_core::Store;
///
/// let store = Store::open_in_memory().unwrap();
/// store.update(|txn| txn.set("user:1", "ada")).unwrap();
///
/// let snapshot = store.snapshot();
/// let keys: Vec<_> = snapshot.iter().map(|e| e.key.to_vec()).collect();
/// assert_eq!(keys, vec![b"user:1".to_vec()]);
/// ```
pub struct Store {
    config: StoreConfig,
    dir: Option<StoreDir>,
    wal: WalManager,
    table: RwLock<Arc<Table>>,
    /// Last committed version; only written while `table` is write-locked.
    version: AtomicU64,
    next_txid: AtomicU64,
    commit_lock: Mutex<()>,
    closed: AtomicBool,
}

/// Result of loading a backup into a store.
#[derive(Debug, Clone)]
pub struct LoadStats {
    /// Metadata read from the backup trailer.
    pub metadata: BackupMetadata,
    /// Entries written into the store.
    pub applied: u64,
    /// Entries skipped because the store already held a newer version.
    pub skipped: u64,
}

/// Summary figures for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of live keys.
    pub entries: usize,
    /// Last committed version.
    pub version: Version,
    /// Size of the write-ahead log in bytes.
    pub wal_size: u64,
}

impl Store {
    /// Opens or creates a store in `path` with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or locked, or the
    /// WAL is corrupted.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Opens a store in `path`.
    ///
    /// Read-only stores take a shared lock, open an existing WAL without
    /// write access, never create the directory or the WAL and never repair
    /// a torn WAL tail.
    ///
    /// # Errors
    ///
    /// - [`CoreError::StoreLocked`] if another handle holds an incompatible lock
    /// - [`CoreError::DirectoryCreate`] if the directory cannot be created
    /// - [`CoreError::WalCorruption`] / [`CoreError::ChecksumMismatch`] if
    ///   replay finds corruption
    pub fn open_with_config(path: &Path, config: StoreConfig) -> CoreResult<Self> {
        let mode = if config.read_only {
            LockMode::Shared
        } else {
            LockMode::Exclusive
        };
        let dir = StoreDir::open(path, config.create_if_missing && !config.read_only, mode)?;

        let wal_path = dir.wal_path();
        let backend: Box<dyn StorageBackend> = match (config.read_only, wal_path.exists()) {
            (true, false) => Box::new(MemoryBackend::new()),
            (true, true) => Box::new(FileBackend::open_read_only(&wal_path)?),
            (false, _) => Box::new(FileBackend::open(&wal_path)?),
        };

        let store = Self::build(config, Some(dir), backend)?;
        info!(
            path = %path.display(),
            entries = store.len(),
            version = store.version().as_u64(),
            "store opened"
        );
        Ok(store)
    }

    /// Opens a store over an arbitrary log backend.
    ///
    /// # Errors
    ///
    /// Returns an error if replaying the backend's contents fails.
    pub fn open_with_backend(
        config: StoreConfig,
        backend: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        Self::build(config, None, backend)
    }

    /// Opens a fresh, non-persistent store.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the other constructors.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_in_memory_with_config(StoreConfig::default())
    }

    /// Opens a fresh, non-persistent store with custom limits.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the other constructors.
    pub fn open_in_memory_with_config(config: StoreConfig) -> CoreResult<Self> {
        Self::build(config, None, Box::new(MemoryBackend::new()))
    }

    fn build(
        config: StoreConfig,
        dir: Option<StoreDir>,
        backend: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        let wal = WalManager::new(backend, config.sync_on_commit);
        let recovered = Recovery::run(&wal, !config.read_only)?;

        Ok(Self {
            config,
            dir,
            wal,
            table: RwLock::new(Arc::new(recovered.table)),
            version: AtomicU64::new(recovered.version.as_u64()),
            next_txid: AtomicU64::new(recovered.max_txid + 1),
            commit_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// Store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Directory of a file-backed store.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(StoreDir::path)
    }

    /// Last committed version.
    #[must_use]
    pub fn version(&self) -> Version {
        Version::new(self.version.load(Ordering::SeqCst))
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summary figures for the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the WAL size cannot be read.
    pub fn stats(&self) -> CoreResult<StoreStats> {
        let snapshot = self.snapshot();
        Ok(StoreStats {
            entries: snapshot.len(),
            version: snapshot.version(),
            wal_size: self.wal.size()?,
        })
    }

    /// Begins a write transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreClosed`] or [`CoreError::ReadOnly`].
    pub fn begin_write(&self) -> CoreResult<WriteTransaction<'_>> {
        self.ensure_writable()?;
        let id = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        Ok(WriteTransaction::new(self, id, self.version()))
    }

    /// Runs `f` in a write transaction and commits it if `f` succeeds.
    ///
    /// # Errors
    ///
    /// Returns the error from `f` (the transaction is discarded) or from the
    /// commit.
    pub fn update<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> CoreResult<T>,
    {
        let mut txn = self.begin_write()?;
        let result = f(&mut txn)?;
        txn.commit()?;
        Ok(result)
    }

    /// Reads the committed value of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreClosed`] if the store has been closed.
    pub fn get(&self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.table.read().get(key).map(|entry| entry.value.clone()))
    }

    /// Takes a consistent, read-only view of the store.
    ///
    /// Commits made after this call are not visible through the snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let table = self.table.read();
        Snapshot {
            table: Arc::clone(&table),
            version: self.version(),
        }
    }

    /// Streams every entry written after `since` to `writer` in the backup
    /// format and returns the backup's metadata.
    ///
    /// The entries come from a single snapshot, so the backup is consistent
    /// even while commits continue. The metadata's `version` is the
    /// snapshot's version: pass it as `since` to take an incremental backup
    /// later.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreClosed`] or any write error.
    pub fn backup<W: Write>(&self, writer: W, since: Version) -> CoreResult<BackupMetadata> {
        self.ensure_open()?;
        let snapshot = self.snapshot();
        let mut backup = BackupWriter::new(writer, since)?;
        for entry in snapshot.iter().filter(|e| e.version > since) {
            backup.write_entry(entry.key, entry.value, entry.version)?;
        }
        backup.finish(snapshot.version())
    }

    /// Loads a backup stream into the store.
    ///
    /// Entries keep the versions they had in the backed-up store; an entry
    /// is skipped when the store already holds the same key at a newer
    /// version. Entries are applied in groups of
    /// [`StoreConfig::load_batch_size`] as they are read, so a backup whose
    /// checksum turns out bad at the end may have been partially applied.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReadOnly`] / [`CoreError::StoreClosed`], a format
    /// or checksum error from the backup, or a WAL write error.
    pub fn load<R: Read>(&self, reader: R) -> CoreResult<LoadStats> {
        self.ensure_writable()?;
        let chunk_size = self.config.load_batch_size.max(1);
        let mut backup = BackupReader::new(reader)?;
        let mut chunk = Vec::with_capacity(chunk_size);
        let mut applied = 0u64;
        let mut skipped = 0u64;

        while let Some(entry) = backup.next_entry()? {
            chunk.push(entry);
            if chunk.len() == chunk_size {
                let (a, s) = self.commit_loaded(std::mem::take(&mut chunk))?;
                applied += a;
                skipped += s;
            }
        }
        if !chunk.is_empty() {
            let (a, s) = self.commit_loaded(chunk)?;
            applied += a;
            skipped += s;
        }

        let metadata = backup.metadata()?;
        debug!(applied, skipped, "backup loaded");
        Ok(LoadStats {
            metadata,
            applied,
            skipped,
        })
    }

    /// Syncs the WAL and rejects further use of the handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(&self) -> CoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.config.read_only {
            self.wal.sync()?;
        }
        debug!(version = self.version().as_u64(), "store closed");
        Ok(())
    }

    pub(crate) fn commit_writes(
        &self,
        txid: TransactionId,
        read_version: Version,
        reads: &HashSet<Vec<u8>>,
        writes: BTreeMap<Vec<u8>, Vec<u8>>,
    ) -> CoreResult<Version> {
        self.ensure_writable()?;
        let _commit = self.commit_lock.lock();

        {
            let table = self.table.read();
            for key in reads {
                if table.get(key).is_some_and(|e| e.version > read_version) {
                    return Err(CoreError::TransactionConflict { key: key.clone() });
                }
            }
        }

        let version = self.version().next();
        let mut records: Vec<WalRecord> = writes
            .iter()
            .map(|(key, value)| WalRecord::Set {
                txid,
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        records.push(WalRecord::Commit { txid, version });
        self.wal.append_all(&records)?;

        let mut guard = self.table.write();
        let table = Arc::make_mut(&mut guard);
        for (key, value) in writes {
            table.insert(key, Entry { value, version });
        }
        self.version.store(version.as_u64(), Ordering::SeqCst);
        Ok(version)
    }

    fn commit_loaded(&self, entries: Vec<(Vec<u8>, Vec<u8>, Version)>) -> CoreResult<(u64, u64)> {
        let _commit = self.commit_lock.lock();

        let records: Vec<WalRecord> = entries
            .iter()
            .map(|(key, value, version)| WalRecord::Load {
                version: *version,
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        self.wal.append_all(&records)?;

        let mut guard = self.table.write();
        let table = Arc::make_mut(&mut guard);
        let mut max_version = self.version();
        let (mut applied, mut skipped) = (0, 0);
        for (key, value, version) in entries {
            if apply_loaded(table, key, value, version) {
                applied += 1;
            } else {
                skipped += 1;
            }
            max_version = max_version.max(version);
        }
        self.version.store(max_version.as_u64(), Ordering::SeqCst);
        Ok((applied, skipped))
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CoreError::StoreClosed);
        }
        Ok(())
    }

    fn ensure_writable(&self) -> CoreResult<()> {
        self.ensure_open()?;
        if self.config.read_only {
            return Err(CoreError::ReadOnly);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path())
            .field("version", &self.version())
            .field("read_only", &self.config.read_only)
            .finish()
    }
}

fn apply_loaded(table: &mut Table, key: Vec<u8>, value: Vec<u8>, version: Version) -> bool {
    match table.get(&key) {
        Some(existing) if existing.version > version => false,
        _ => {
            table.insert(key, Entry { value, version });
            true
        }
    }
}

/// State rebuilt from the WAL.
struct Recovery {
    table: Table,
    version: Version,
    max_txid: u64,
}

impl Recovery {
    fn run(wal: &WalManager, repair: bool) -> CoreResult<Self> {
        let mut table = Table::new();
        let mut pending: HashMap<TransactionId, Vec<(Vec<u8>, Vec<u8>)>> = HashMap::new();
        let mut version = Version::ZERO;
        let mut max_txid = 0u64;

        let stats = wal.replay(repair, |record| {
            match record {
                WalRecord::Set { txid, key, value } => {
                    max_txid = max_txid.max(txid.as_u64());
                    pending.entry(txid).or_default().push((key, value));
                }
                WalRecord::Commit { txid, version: v } => {
                    max_txid = max_txid.max(txid.as_u64());
                    for (key, value) in pending.remove(&txid).unwrap_or_default() {
                        table.insert(key, Entry { value, version: v });
                    }
                    version = version.max(v);
                }
                WalRecord::Load {
                    version: v,
                    key,
                    value,
                } => {
                    apply_loaded(&mut table, key, value, v);
                    version = version.max(v);
                }
            }
            Ok(())
        })?;

        let uncommitted: usize = pending.values().map(Vec::len).sum();
        if uncommitted > 0 {
            debug!(uncommitted, "dropped writes without a commit marker");
        }
        debug!(
            records = stats.records,
            entries = table.len(),
            version = version.as_u64(),
            "WAL replayed"
        );

        Ok(Self {
            table,
            version,
            max_txid,
        })
    }
}

/// A committed entry as seen through a [`Snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef<'a> {
    /// Key bytes.
    pub key: &'a [u8],
    /// Value bytes.
    pub value: &'a [u8],
    /// Version of the commit that wrote the entry.
    pub version: Version,
}

/// A consistent read-only view of the store at one version.
///
/// Iteration is in ascending key order.
#[derive(Debug, Clone)]
pub struct Snapshot {
    table: Arc<Table>,
    version: Version,
}

impl Snapshot {
    /// Version of the last commit visible in this snapshot.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the snapshot holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Value of `key`.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.table.get(key).map(|e| e.value.as_slice())
    }

    /// All entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = EntryRef<'_>> + '_ {
        self.table.iter().map(entry_ref)
    }

    /// Entries whose key starts with `prefix`, in key order.
    pub fn prefix<'a>(&'a self, prefix: &'a [u8]) -> impl Iterator<Item = EntryRef<'a>> + 'a {
        self.table
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(key, _)| key.starts_with(prefix))
            .map(entry_ref)
    }
}

fn entry_ref<'a>((key, entry): (&'a Vec<u8>, &'a Entry)) -> EntryRef<'a> {
    EntryRef {
        key,
        value: &entry.value,
        version: entry.version,
    }
}
