//! # KVBatch Codec
//!
//! Serialization of record values and composite keys.
//!
//! Records are encoded as CBOR through `serde`, so anything that derives
//! `Serialize`/`Deserialize` round-trips losslessly: struct fields keep their
//! order, nested structs and enums survive, and tuples encode as ordered
//! arrays, which is what composite keys rely on.
//!
//! ## Usage
//!
//! ```
//! use kvbatch_codec::{from_cbor, to_cbor};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Row {
//!     name: String,
//!     tags: Vec<String>,
//! }
//!
//! let row = Row { name: "a".into(), tags: vec!["x".into()] };
//! let bytes = to_cbor(&row).unwrap();
//! let back: Row = from_cbor(&bytes).unwrap();
//! assert_eq!(row, back);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;

pub use error::{CodecError, CodecResult};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if the value's `Serialize`
/// implementation reports an error.
pub fn to_cbor<T>(value: &T) -> CodecResult<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(value, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decodes exactly one CBOR item from `bytes`.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] if the bytes are not valid CBOR for
/// `T`, or [`CodecError::TrailingBytes`] if input remains after the item.
pub fn from_cbor<T>(bytes: &[u8]) -> CodecResult<T>
where
    T: DeserializeOwned,
{
    let mut reader = bytes;
    let value = ciborium::de::from_reader(&mut reader)
        .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    if !reader.is_empty() {
        return Err(CodecError::TrailingBytes {
            remaining: reader.len(),
        });
    }
    Ok(value)
}
