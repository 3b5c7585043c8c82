//! Line to key/value encoding.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::record::{LineMapper, Record};
use kvbatch_codec::{to_cbor, CodecResult};

/// A key/value pair ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPair {
    /// Key bytes, never empty once produced by [`encode_line`].
    pub key: Vec<u8>,
    /// CBOR-encoded value.
    pub value: Vec<u8>,
}

/// Encodes a record's key and value.
///
/// # Errors
///
/// Returns the codec error if either part cannot be encoded.
pub fn encode_record<R: Record>(record: &R) -> CodecResult<EncodedPair> {
    Ok(EncodedPair {
        key: record.key()?,
        value: to_cbor(record.value())?,
    })
}

/// Maps one input line and encodes the resulting record.
///
/// # Errors
///
/// - [`PipelineError::Mapping`] if the mapper rejects the line
/// - [`PipelineError::Serialization`] if the record cannot be encoded
/// - [`PipelineError::EmptyKey`] if the record's key is empty
pub fn encode_line<M: LineMapper>(
    mapper: &M,
    line_number: u64,
    line: &str,
) -> PipelineResult<EncodedPair> {
    let record = mapper
        .map_line(line)
        .map_err(|source| PipelineError::Mapping {
            line_number,
            line: line.to_string(),
            source,
        })?;

    let pair = encode_record(&record)
        .map_err(|source| PipelineError::Serialization { line_number, source })?;
    if pair.key.is_empty() {
        return Err(PipelineError::EmptyKey { line_number });
    }
    Ok(pair)
}
