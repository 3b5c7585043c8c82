//! WAL record types and serialization.

use crate::error::{CoreError, CoreResult};
use crate::types::{TransactionId, Version};

/// Magic bytes opening every WAL record.
pub const WAL_MAGIC: [u8; 4] = *b"KWAL";

/// Current WAL format version.
pub const WAL_VERSION: u16 = 1;

/// Type byte of a WAL record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalRecordType {
    /// A key written by a transaction.
    Set = 1,
    /// A transaction's commit marker.
    Commit = 2,
    /// An entry restored from a backup, carrying its original version.
    Load = 3,
}

impl WalRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Set),
            2 => Some(Self::Commit),
            3 => Some(Self::Load),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A WAL record.
///
/// `Set` records only take effect once a `Commit` with the same transaction
/// ID follows them. `Load` records are self-committing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// A key written by a transaction.
    Set {
        /// Owning transaction.
        txid: TransactionId,
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
    },

    /// Commit marker.
    Commit {
        /// Committed transaction.
        txid: TransactionId,
        /// Version assigned to the commit.
        version: Version,
    },

    /// Entry restored from a backup.
    Load {
        /// Version the entry had in the backed-up store.
        version: Version,
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
    },
}

impl WalRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> WalRecordType {
        match self {
            Self::Set { .. } => WalRecordType::Set,
            Self::Commit { .. } => WalRecordType::Commit,
            Self::Load { .. } => WalRecordType::Load,
        }
    }

    /// Serializes the record payload (without envelope).
    ///
    /// # Errors
    ///
    /// Returns an error if a key or value does not fit a 4-byte length.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Self::Set { txid, key, value } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                put_bytes(&mut buf, key)?;
                put_bytes(&mut buf, value)?;
            }
            Self::Commit { txid, version } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                buf.extend_from_slice(&version.as_u64().to_le_bytes());
            }
            Self::Load {
                version,
                key,
                value,
            } => {
                buf.extend_from_slice(&version.as_u64().to_le_bytes());
                put_bytes(&mut buf, key)?;
                put_bytes(&mut buf, value)?;
            }
        }
        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WalCorruption`] if the payload is short or has
    /// trailing bytes.
    pub fn decode_payload(record_type: WalRecordType, payload: &[u8]) -> CoreResult<Self> {
        let mut cursor = PayloadCursor::new(payload);
        let record = match record_type {
            WalRecordType::Set => Self::Set {
                txid: TransactionId::new(cursor.u64()?),
                key: cursor.bytes()?,
                value: cursor.bytes()?,
            },
            WalRecordType::Commit => Self::Commit {
                txid: TransactionId::new(cursor.u64()?),
                version: Version::new(cursor.u64()?),
            },
            WalRecordType::Load => Self::Load {
                version: Version::new(cursor.u64()?),
                key: cursor.bytes()?,
                value: cursor.bytes()?,
            },
        };
        cursor.finish(record_type)?;
        Ok(record)
    }
}

fn put_bytes(buf: &mut Vec<u8>, data: &[u8]) -> CoreResult<()> {
    let len = u32::try_from(data.len())
        .map_err(|_| CoreError::invalid_operation("WAL field larger than 4 GiB"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(data);
    Ok(())
}

struct PayloadCursor<'a> {
    payload: &'a [u8],
    pos: usize,
}

impl<'a> PayloadCursor<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self { payload, pos: 0 }
    }

    fn take(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.payload.len())
            .ok_or_else(|| CoreError::wal_corruption("unexpected end of payload"))?;
        let slice = &self.payload[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u64(&mut self) -> CoreResult<u64> {
        let bytes: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| CoreError::wal_corruption("invalid u64"))?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn bytes(&mut self) -> CoreResult<Vec<u8>> {
        let len: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| CoreError::wal_corruption("invalid length"))?;
        let len = u32::from_le_bytes(len) as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn finish(self, record_type: WalRecordType) -> CoreResult<()> {
        if self.pos != self.payload.len() {
            return Err(CoreError::wal_corruption(format!(
                "trailing bytes in {:?} record: expected {} bytes, got {}",
                record_type,
                self.pos,
                self.payload.len()
            )));
        }
        Ok(())
    }
}
