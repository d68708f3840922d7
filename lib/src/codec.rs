//! Canonical serialization shared by transaction ids, spend messages, the
//! wire protocol and the on-disk chain file.
//!
//! Entities serialize to compact JSON objects tagged with a `_type` field
//! and emitted in lexicographic key order, so the same value always yields
//! the same bytes. Framed payloads are a u32 big-endian length followed by
//! the serialized bytes.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Canonical bytes of an entity. Key order is forced by round-tripping
/// through `serde_json::Value`, whose object map is sorted.
///
/// Entity serialization is infallible: every serialized type is a tree of
/// strings, integers, sequences and options.
pub fn serialize<T: Serialize>(value: &T) -> String {
    let value = serde_json::to_value(value).expect("entity does not serialize to a JSON tree");
    serde_json::to_string(&value).expect("JSON value does not render")
}

pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read the `_type` tag off a serialized payload without committing to a
/// concrete entity. Dispatch happens against the fixed table in
/// `network::Message::decode`.
pub fn peek_type(bytes: &[u8]) -> Result<String, CodecError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    value
        .get("_type")
        .and_then(|t| t.as_str())
        .map(str::to_owned)
        .ok_or(CodecError::MissingType)
}

/// Prefix a payload with its u32 big-endian length. The same framing is
/// used on the wire and for the chain file.
pub fn encode_framed(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}

pub fn decode_framed(framed: &[u8]) -> Result<&[u8], CodecError> {
    if framed.len() < 4 {
        return Err(CodecError::TruncatedFrame);
    }
    let len = u32::from_be_bytes([framed[0], framed[1], framed[2], framed[3]]) as usize;
    if framed.len() < 4 + len {
        return Err(CodecError::TruncatedFrame);
    }
    Ok(&framed[4..4 + len])
}

/// Serde helper for optional byte fields rendered as hex strings.
pub mod hex_bytes_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex_str: Option<String> = Option::deserialize(deserializer)?;
        hex_str
            .map(|s| hex::decode(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
