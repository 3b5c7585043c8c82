//! Write transactions.
//!
//! Any number of write transactions may be open on one [`Store`] at the same
//! time, from any number of threads. Writes are buffered in the transaction
//! and only reach the log and the table when it commits; commits are
//! serialized by the store and each one gets the next [`Version`].
//!
//! Conflict detection is optimistic: keys read through
//! [`WriteTransaction::get`] are remembered, and the commit fails with
//! [`CoreError::TransactionConflict`] if another transaction committed any of
//! them after this one began. Blind writes never conflict; the last commit
//! wins.

use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use crate::types::{TransactionId, Version};
use std::collections::{BTreeMap, HashSet};

/// A buffered write transaction.
///
/// Dropping a transaction without committing discards its writes.
pub struct WriteTransaction<'a> {
    store: &'a Store,
    id: TransactionId,
    read_version: Version,
    writes: BTreeMap<Vec<u8>, Vec<u8>>,
    reads: HashSet<Vec<u8>>,
}

impl<'a> WriteTransaction<'a> {
    pub(crate) fn new(store: &'a Store, id: TransactionId, read_version: Version) -> Self {
        Self {
            store,
            id,
            read_version,
            writes: BTreeMap::new(),
            reads: HashSet::new(),
        }
    }

    /// Transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Store version visible when the transaction began.
    #[must_use]
    pub fn read_version(&self) -> Version {
        self.read_version
    }

    /// Number of distinct keys written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Buffers a write of `value` under `key`.
    ///
    /// A later `set` of the same key in this transaction replaces the earlier
    /// one.
    ///
    /// # Errors
    ///
    /// - [`CoreError::EmptyKey`] for a zero-length key
    /// - [`CoreError::KeyTooLarge`] / [`CoreError::ValueTooLarge`] past the
    ///   store's configured limits
    /// - [`CoreError::TransactionTooBig`] once the entry limit is reached
    ///
    /// A failed `set` leaves the transaction usable.
    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> CoreResult<()> {
        let key = key.into();
        let value = value.into();
        let config = self.store.config();

        if key.is_empty() {
            return Err(CoreError::EmptyKey);
        }
        if key.len() > config.max_key_size {
            return Err(CoreError::KeyTooLarge {
                size: key.len(),
                limit: config.max_key_size,
            });
        }
        if value.len() > config.max_value_size {
            return Err(CoreError::ValueTooLarge {
                size: value.len(),
                limit: config.max_value_size,
            });
        }
        if self.writes.len() >= config.max_txn_entries && !self.writes.contains_key(&key) {
            return Err(CoreError::TransactionTooBig {
                limit: config.max_txn_entries,
            });
        }

        self.writes.insert(key, value);
        Ok(())
    }

    /// Reads `key`, seeing this transaction's own pending writes first.
    ///
    /// Keys read from the store join the conflict set.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreClosed`] if the store has been closed.
    pub fn get(&mut self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        if let Some(value) = self.writes.get(key) {
            return Ok(Some(value.clone()));
        }
        self.reads.insert(key.to_vec());
        self.store.get(key)
    }

    /// Commits the transaction and returns the version it was assigned.
    ///
    /// A transaction with no writes commits trivially and returns the
    /// version it read at.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionConflict`] on a read/write conflict,
    /// [`CoreError::ReadOnly`] / [`CoreError::StoreClosed`] if the store does
    /// not accept writes, or the WAL's I/O error.
    pub fn commit(self) -> CoreResult<Version> {
        if self.writes.is_empty() {
            return Ok(self.read_version);
        }
        self.store
            .commit_writes(self.id, self.read_version, &self.reads, self.writes)
    }

    /// Discards all buffered writes.
    pub fn discard(self) {}
}

impl std::fmt::Debug for WriteTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTransaction")
            .field("id", &self.id)
            .field("read_version", &self.read_version)
            .field("writes", &self.writes.len())
            .field("reads", &self.reads.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::StoreConfig;
    use crate::error::CoreError;
    use crate::store::Store;
    use crate::types::Version;

    #[test]
    fn set_and_commit() {
        let store = Store::open_in_memory().unwrap();
        let mut txn = store.begin_write().unwrap();
        txn.set(b"a".to_vec(), b"1".to_vec()).unwrap();
        txn.set("b", "2").unwrap();
        assert_eq!(txn.len(), 2);

        let version = txn.commit().unwrap();
        assert_eq!(version, Version::new(1));
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn reads_own_writes() {
        let store = Store::open_in_memory().unwrap();
        let mut txn = store.begin_write().unwrap();
        txn.set("k", "pending").unwrap();
        assert_eq!(txn.get(b"k").unwrap(), Some(b"pending".to_vec()));
        assert_eq!(store.get(b"k").unwrap(), None);
    }

    #[test]
    fn discard_drops_writes() {
        let store = Store::open_in_memory().unwrap();
        let mut txn = store.begin_write().unwrap();
        txn.set("k", "v").unwrap();
        txn.discard();
        assert_eq!(store.get(b"k").unwrap(), None);
        assert_eq!(store.version(), Version::ZERO);
    }

    #[test]
    fn empty_commit_keeps_version() {
        let store = Store::open_in_memory().unwrap();
        let txn = store.begin_write().unwrap();
        assert_eq!(txn.commit().unwrap(), Version::ZERO);
        assert_eq!(store.version(), Version::ZERO);
    }

    #[test]
    fn limits_reject_single_set_only() {
        let config = StoreConfig::new()
            .max_key_size(4)
            .max_value_size(4)
            .max_txn_entries(2);
        let store = Store::open_in_memory_with_config(config).unwrap();
        let mut txn = store.begin_write().unwrap();

        assert!(matches!(txn.set("", "v"), Err(CoreError::EmptyKey)));
        assert!(matches!(
            txn.set("toolong", "v"),
            Err(CoreError::KeyTooLarge { size: 7, limit: 4 })
        ));
        assert!(matches!(
            txn.set("k", "toolong"),
            Err(CoreError::ValueTooLarge { size: 7, limit: 4 })
        ));

        txn.set("a", "1").unwrap();
        txn.set("b", "2").unwrap();
        assert!(matches!(
            txn.set("c", "3"),
            Err(CoreError::TransactionTooBig { limit: 2 })
        ));
        // overwriting an existing key stays within the limit
        txn.set("a", "9").unwrap();

        txn.commit().unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"9".to_vec()));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn read_write_conflict_detected() {
        let store = Store::open_in_memory().unwrap();
        store.update(|txn| txn.set("counter", "0")).unwrap();

        let mut first = store.begin_write().unwrap();
        let mut second = store.begin_write().unwrap();
        first.get(b"counter").unwrap();
        second.get(b"counter").unwrap();

        first.set("counter", "1").unwrap();
        second.set("counter", "2").unwrap();

        first.commit().unwrap();
        assert!(matches!(
            second.commit(),
            Err(CoreError::TransactionConflict { .. })
        ));
        assert_eq!(store.get(b"counter").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn blind_writes_last_commit_wins() {
        let store = Store::open_in_memory().unwrap();
        let mut first = store.begin_write().unwrap();
        let mut second = store.begin_write().unwrap();
        first.set("k", "first").unwrap();
        second.set("k", "second").unwrap();

        second.commit().unwrap();
        first.commit().unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"first".to_vec()));
    }
}
