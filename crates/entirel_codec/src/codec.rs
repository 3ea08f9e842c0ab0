//! Pluggable serializers for values stored in serialized columns.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Turns a structured [`Value`] into opaque bytes and back.
///
/// Implementations must be lossless for every value they encode:
/// `decode(encode(v)) == v`.
pub trait SerializeCodec: Send + Sync {
    /// Short identifier, for diagnostics.
    fn name(&self) -> &'static str;

    /// Encodes a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented.
    fn encode(&self, value: &Value) -> CodecResult<Vec<u8>>;

    /// Decodes bytes produced by [`SerializeCodec::encode`].
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are malformed.
    fn decode(&self, bytes: &[u8]) -> CodecResult<Value>;
}

/// CBOR codec backed by `ciborium`. The default for serialized columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl SerializeCodec for CborCodec {
    fn name(&self) -> &'static str {
        "cbor"
    }

    fn encode(&self, value: &Value) -> CodecResult<Vec<u8>> {
        to_cbor(value)
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Value> {
        from_cbor(bytes)
    }
}

/// JSON codec backed by `serde_json`, for human-readable storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl SerializeCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &Value) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CodecError::encoding_failed(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Value> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
    }
}

/// Encodes a value as CBOR.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buf)
}

/// Decodes a CBOR-encoded value.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid encoded [`Value`].
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::map([
            ("attributes", Value::List(vec!["a".into(), 3_i64.into()])),
            ("external", Value::Bool(true)),
            ("weight", Value::Float(0.5)),
        ])
    }

    #[test]
    fn cbor_preserves_nested_values() {
        let codec = CborCodec;
        let bytes = codec.encode(&sample()).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn json_preserves_nested_values() {
        let codec = JsonCodec;
        let bytes = codec.encode(&sample()).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn cbor_is_deterministic_for_maps() {
        let a = to_cbor(&sample()).unwrap();
        let b = to_cbor(&sample()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn garbage_fails_to_decode() {
        let err = CborCodec.decode(&[0xff, 0x00]).unwrap_err();
        assert!(matches!(err, CodecError::DecodingFailed { .. }));
        assert!(JsonCodec.decode(b"{").is_err());
    }
}
