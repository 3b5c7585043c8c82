//! WAL writer and replay.

use crate::crc::compute_crc32;
use crate::error::{CoreError, CoreResult};
use crate::wal::record::{WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};
use kvbatch_storage::StorageBackend;
use parking_lot::Mutex;
use tracing::warn;

/// magic (4) + version (2) + type (1) + length (4)
const HEADER_SIZE: usize = 11;

const CRC_SIZE: usize = 4;

/// Outcome of replaying the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Complete records read.
    pub records: usize,
    /// Bytes of valid log.
    pub valid_len: u64,
    /// Bytes of torn tail found after the last complete record.
    pub torn_bytes: u64,
}

/// Appends framed records to the log and replays them on open.
pub struct WalManager {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
}

impl WalManager {
    /// Creates a WAL over `backend`.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
        }
    }

    /// Frames `records` and appends them in one write, then makes them
    /// durable (fsync or flush depending on configuration).
    ///
    /// Returns the offset of the first record.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding, writing or syncing fails.
    pub fn append_all(&self, records: &[WalRecord]) -> CoreResult<u64> {
        let mut data = Vec::new();
        for record in records {
            encode_frame(record, &mut data)?;
        }

        let mut backend = self.backend.lock();
        let offset = backend.append(&data)?;
        if self.sync_on_commit {
            backend.sync()?;
        } else {
            backend.flush()?;
        }
        Ok(offset)
    }

    /// Forces everything written so far to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.backend.lock().sync()?;
        Ok(())
    }

    /// Current log size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Reads every complete record in order and hands it to `apply`.
    ///
    /// A header or payload cut short at the end of the log is a torn write
    /// from a crash and ends the replay cleanly; when `repair` is set the
    /// tail is truncated so later appends start on a record boundary. A bad
    /// magic, unknown type or checksum mismatch is fatal, and so is a length
    /// running past the end when a complete record still follows it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WalCorruption`] or [`CoreError::ChecksumMismatch`]
    /// on corruption, or whatever `apply` returns.
    pub fn replay<F>(&self, repair: bool, mut apply: F) -> CoreResult<ReplayStats>
    where
        F: FnMut(WalRecord) -> CoreResult<()>,
    {
        let mut backend = self.backend.lock();
        let size = backend.size()?;
        let mut offset = 0u64;
        let mut records = 0usize;

        while offset < size {
            if offset + HEADER_SIZE as u64 > size {
                break;
            }
            let header = backend.read_at(offset, HEADER_SIZE)?;
            if header[0..4] != WAL_MAGIC {
                return Err(CoreError::wal_corruption(format!(
                    "invalid magic at offset {offset}"
                )));
            }
            let version = u16::from_le_bytes([header[4], header[5]]);
            if version != WAL_VERSION {
                return Err(CoreError::wal_corruption(format!(
                    "unsupported WAL version {version} at offset {offset}"
                )));
            }
            let record_type = WalRecordType::from_byte(header[6]).ok_or_else(|| {
                CoreError::wal_corruption(format!(
                    "unknown record type {} at offset {offset}",
                    header[6]
                ))
            })?;
            let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

            let frame_len = (HEADER_SIZE + len + CRC_SIZE) as u64;
            if offset + frame_len > size {
                // Only the last frame can be torn; a complete frame after
                // this one means the length field itself is damaged.
                let rest_start = offset + HEADER_SIZE as u64;
                let rest = backend.read_at(rest_start, (size - rest_start) as usize)?;
                if let Some(at) = find_complete_frame(&rest) {
                    return Err(CoreError::wal_corruption(format!(
                        "record at offset {offset} claims {len} payload bytes past the end \
                         of the log, but a complete record follows at offset {}",
                        rest_start + at as u64
                    )));
                }
                break;
            }

            let body = backend.read_at(offset + HEADER_SIZE as u64, len + CRC_SIZE)?;
            let (payload, crc_bytes) = body.split_at(len);
            let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
            let mut framed = header;
            framed.extend_from_slice(payload);
            let actual = compute_crc32(&framed);
            if expected != actual {
                return Err(CoreError::ChecksumMismatch { expected, actual });
            }

            apply(WalRecord::decode_payload(record_type, payload)?)?;
            records += 1;
            offset += frame_len;
        }

        let torn_bytes = size - offset;
        if torn_bytes > 0 {
            warn!(offset, torn_bytes, "discarding torn WAL tail");
            if repair {
                backend.truncate(offset)?;
            }
        }

        Ok(ReplayStats {
            records,
            valid_len: offset,
            torn_bytes,
        })
    }
}

/// Position of the first checksummed frame inside `data`, if any.
fn find_complete_frame(data: &[u8]) -> Option<usize> {
    (0..data.len().saturating_sub(HEADER_SIZE + CRC_SIZE - 1)).find(|&at| {
        let header = &data[at..at + HEADER_SIZE];
        if header[0..4] != WAL_MAGIC
            || u16::from_le_bytes([header[4], header[5]]) != WAL_VERSION
            || WalRecordType::from_byte(header[6]).is_none()
        {
            return false;
        }
        let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;
        let end = at + HEADER_SIZE + len;
        if end + CRC_SIZE > data.len() {
            return false;
        }
        let crc = &data[end..end + CRC_SIZE];
        let expected = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
        compute_crc32(&data[at..end]) == expected
    })
}

fn encode_frame(record: &WalRecord, out: &mut Vec<u8>) -> CoreResult<()> {
    let payload = record.encode_payload()?;
    let len = u32::try_from(payload.len())
        .map_err(|_| CoreError::invalid_operation("WAL record payload too large"))?;

    let start = out.len();
    out.extend_from_slice(&WAL_MAGIC);
    out.extend_from_slice(&WAL_VERSION.to_le_bytes());
    out.push(record.record_type().as_byte());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    let crc = compute_crc32(&out[start..]);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TransactionId, Version};
    use kvbatch_storage::MemoryBackend;

    fn set(txid: u64, key: &[u8]) -> WalRecord {
        WalRecord::Set {
            txid: TransactionId::new(txid),
            key: key.to_vec(),
            value: b"v".to_vec(),
        }
    }

    fn commit(txid: u64, version: u64) -> WalRecord {
        WalRecord::Commit {
            txid: TransactionId::new(txid),
            version: Version::new(version),
        }
    }

    fn encoded(records: &[WalRecord]) -> Vec<u8> {
        let mut data = Vec::new();
        for record in records {
            encode_frame(record, &mut data).unwrap();
        }
        data
    }

    fn collect(wal: &WalManager, repair: bool) -> CoreResult<(Vec<WalRecord>, ReplayStats)> {
        let mut seen = Vec::new();
        let stats = wal.replay(repair, |r| {
            seen.push(r);
            Ok(())
        })?;
        Ok((seen, stats))
    }

    #[test]
    fn append_then_replay() {
        let wal = WalManager::new(Box::new(MemoryBackend::new()), true);
        let records = vec![set(1, b"a"), set(1, b"b"), commit(1, 1)];
        wal.append_all(&records).unwrap();

        let (seen, stats) = collect(&wal, true).unwrap();
        assert_eq!(seen, records);
        assert_eq!(stats.records, 3);
        assert_eq!(stats.torn_bytes, 0);
        assert_eq!(stats.valid_len, wal.size().unwrap());
    }

    #[test]
    fn torn_tail_is_truncated_when_repairing() {
        let mut data = encoded(&[set(1, b"a"), commit(1, 1)]);
        let good_len = data.len() as u64;
        let partial = encoded(&[set(2, b"b")]);
        data.extend_from_slice(&partial[..partial.len() - 3]);

        let wal = WalManager::new(Box::new(MemoryBackend::with_data(data)), false);
        let (seen, stats) = collect(&wal, true).unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(stats.valid_len, good_len);
        assert!(stats.torn_bytes > 0);
        assert_eq!(wal.size().unwrap(), good_len);
    }

    #[test]
    fn torn_tail_kept_without_repair() {
        let mut data = encoded(&[commit(1, 1)]);
        data.extend_from_slice(&WAL_MAGIC[..2]);
        let total = data.len() as u64;

        let wal = WalManager::new(Box::new(MemoryBackend::with_data(data)), false);
        let (seen, _) = collect(&wal, false).unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(wal.size().unwrap(), total);
    }

    #[test]
    fn damaged_length_before_complete_records_is_corruption() {
        let mut data = encoded(&[set(1, b"a"), commit(1, 1), set(2, b"b"), commit(2, 2)]);
        data[10] = 0x7f;
        let original = data.clone();

        let wal = WalManager::new(Box::new(MemoryBackend::with_data(data)), false);
        assert!(matches!(
            collect(&wal, true),
            Err(CoreError::WalCorruption { .. })
        ));
        assert_eq!(wal.size().unwrap(), original.len() as u64);
    }

    #[test]
    fn torn_payload_containing_magic_is_still_torn() {
        let mut data = encoded(&[commit(1, 1)]);
        let good_len = data.len() as u64;
        let partial = encoded(&[WalRecord::Set {
            txid: TransactionId::new(2),
            key: b"KWAL".to_vec(),
            value: vec![0; 64],
        }]);
        data.extend_from_slice(&partial[..partial.len() - 10]);

        let wal = WalManager::new(Box::new(MemoryBackend::with_data(data)), false);
        let (seen, stats) = collect(&wal, true).unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(stats.valid_len, good_len);
        assert_eq!(wal.size().unwrap(), good_len);
    }

    #[test]
    fn flipped_bit_fails_checksum() {
        let mut data = encoded(&[set(1, b"key"), commit(1, 1)]);
        data[HEADER_SIZE + 9] ^= 0xFF;

        let wal = WalManager::new(Box::new(MemoryBackend::with_data(data)), false);
        assert!(matches!(
            collect(&wal, true),
            Err(CoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut data = encoded(&[commit(1, 1)]);
        data[0] = b'X';

        let wal = WalManager::new(Box::new(MemoryBackend::with_data(data)), false);
        assert!(matches!(
            collect(&wal, true),
            Err(CoreError::WalCorruption { .. })
        ));
    }
}
