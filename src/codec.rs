//! Payload codec.
//!
//! Large payloads are stored as gzipped JSON; the threshold and the
//! decision to compress live in the store, this module only encodes and
//! decodes.

use std::io::{Read, Write};

use bytes::Bytes;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde_json::Value;

use crate::error::CacheError;

/// Serialize a payload and gzip it.
pub(crate) fn encode(value: &Value) -> Result<Bytes, CacheError> {
    let serialized = serde_json::to_vec(value)?;
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(serialized.len() / 2),
        Compression::default(),
    );
    encoder.write_all(&serialized)?;
    Ok(Bytes::from(encoder.finish()?))
}

/// Gunzip and deserialize a stored payload.
pub(crate) fn decode(bytes: &[u8]) -> Result<Value, CacheError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut serialized = Vec::new();
    decoder.read_to_end(&mut serialized)?;
    Ok(serde_json::from_slice(&serialized)?)
}

/// Serialized length of a payload; failures count as zero bytes.
pub(crate) fn serialized_len(value: &Value) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let value = json!({
            "series": ["one-punch", "berserk"],
            "chapters": (0..50).collect::<Vec<u32>>(),
        });

        let encoded = encode(&value).expect("encodes");
        let decoded = decode(&encoded).expect("decodes");
        assert_eq!(decoded, value);
    }

    #[test]
    fn large_payload_shrinks() {
        let value = json!(vec!["repetitive chapter title"; 200]);
        let encoded = encode(&value).expect("encodes");
        assert!(encoded.len() < serialized_len(&value));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode(b"definitely not gzip").is_err());
    }

    #[test]
    fn serialized_len_of_scalar() {
        assert_eq!(serialized_len(&json!(true)), 4);
    }
}
