//! Record shapes accepted by the pipeline and the line mapper seam.

use crate::pipeline::error::MapError;
use kvbatch_codec::{to_cbor, CodecResult};
use serde::Serialize;

/// Something the pipeline can store: a key plus a serializable value.
///
/// A self-keying type derives its key from its own fields and stores
/// itself as the value:
///
/// ```rust
/// use kvbatch_codec::CodecResult;
/// use kvbatch_core::pipeline::Record;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Sample {
///     field1: String,
///     field2: String,
/// }
///
/// impl Record for Sample {
///     type Value = Self;
///
///     fn key(&self) -> CodecResult<Vec<u8>> {
///         Ok(format!("{},{}", self.field1, self.field2).into_bytes())
///     }
///
///     fn value(&self) -> &Self {
///         self
///     }
/// }
/// ```
///
/// Types that are not self-keying go through [`KeyValue`].
pub trait Record {
    /// Type serialized as the stored value.
    type Value: Serialize + ?Sized;

    /// Key bytes. Must not be empty.
    ///
    /// # Errors
    ///
    /// Returns an error if a structured key cannot be encoded.
    fn key(&self) -> CodecResult<Vec<u8>>;

    /// The value to serialize.
    fn value(&self) -> &Self::Value;
}

/// A key usable in a [`KeyValue`] record.
///
/// Strings and byte vectors are stored as-is; [`CompositeKey`] encodes its
/// fields with the record codec.
pub trait RecordKey {
    /// Key bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be encoded.
    fn key_bytes(&self) -> CodecResult<Vec<u8>>;
}

impl RecordKey for String {
    fn key_bytes(&self) -> CodecResult<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }
}

impl RecordKey for &str {
    fn key_bytes(&self) -> CodecResult<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }
}

impl RecordKey for Vec<u8> {
    fn key_bytes(&self) -> CodecResult<Vec<u8>> {
        Ok(self.clone())
    }
}

/// A structured key (usually a tuple of fields) encoded as an ordered
/// sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeKey<T>(pub T);

impl<T: Serialize> RecordKey for CompositeKey<T> {
    fn key_bytes(&self) -> CodecResult<Vec<u8>> {
        to_cbor(&self.0)
    }
}

/// An explicit key/value record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue<K, V> {
    /// Record key.
    pub key: K,
    /// Record value.
    pub value: V,
}

impl<K, V> KeyValue<K, V> {
    /// Creates a record from its parts.
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }
}

impl<K: RecordKey, V: Serialize> Record for KeyValue<K, V> {
    type Value = V;

    fn key(&self) -> CodecResult<Vec<u8>> {
        self.key.key_bytes()
    }

    fn value(&self) -> &V {
        &self.value
    }
}

/// Turns one input line into a record.
///
/// Implemented for any `Fn(&str) -> Result<R, E>` where `R` is a
/// [`Record`] and `E` converts into a boxed error (including `String`).
pub trait LineMapper {
    /// Record type produced.
    type Record: Record;

    /// Maps `line`, which has its line terminator stripped.
    ///
    /// # Errors
    ///
    /// Any error rejects the line and aborts the write.
    fn map_line(&self, line: &str) -> Result<Self::Record, MapError>;
}

impl<F, R, E> LineMapper for F
where
    F: Fn(&str) -> Result<R, E>,
    R: Record,
    E: Into<MapError>,
{
    type Record = R;

    fn map_line(&self, line: &str) -> Result<R, MapError> {
        self(line).map_err(Into::into)
    }
}
