// src/utils/serialization.rs
//! Serialization helpers for the compact token format and response artifacts.

use ethers_core::utils::hex;
use serde::Serialize;
use serde_json::{Map, Value};

/// Name of the response field that carries the detached token. It is never
/// part of what the token signs.
pub const SIGNED_RESPONSE_TOKEN_FIELD: &str = "signedResponseToken";

/// Unpadded base64url, the segment encoding of compact JWS.
pub fn base64url_encode(data: &[u8]) -> String {
    base64::encode_config(data, base64::URL_SAFE_NO_PAD)
}

pub fn base64url_decode(data: &str) -> Result<Vec<u8>, String> {
    base64::decode_config(data, base64::URL_SAFE_NO_PAD)
        .map_err(|e| format!("Base64 decoding failed: {}", e))
}

/// Serializes a value to its JSON byte form. Struct fields keep declaration
/// order and maps keep insertion order, so the output is reproducible.
pub fn to_json_bytes<T: Serialize>(data: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(data)
}

/// Returns a copy of `payload` without its own token field.
pub fn strip_token_field(payload: &Map<String, Value>) -> Map<String, Value> {
    payload
        .iter()
        .filter(|(key, _)| key.as_str() != SIGNED_RESPONSE_TOKEN_FIELD)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// `"0x" + hex(json(payload))` for a payload that has already had its token
/// field removed.
pub fn encode_artifacts(payload: &Map<String, Value>) -> Result<String, serde_json::Error> {
    let bytes = to_json_bytes(payload)?;
    Ok(format!("0x{}", hex::encode(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base64url_has_no_padding() {
        let encoded = base64url_encode(b"ab");
        assert_eq!(encoded, "YWI");
        assert_eq!(base64url_decode(&encoded).unwrap(), b"ab");
    }

    #[test]
    fn artifacts_exclude_token_field() {
        let payload = json!({
            "did": "did:iden3:billions:test:x",
            "response": "ok",
            "signedResponseToken": "a..b"
        });
        let map = payload.as_object().unwrap();
        let stripped = strip_token_field(map);
        assert!(!stripped.contains_key(SIGNED_RESPONSE_TOKEN_FIELD));

        let artifacts = encode_artifacts(&stripped).unwrap();
        assert!(artifacts.starts_with("0x"));
        let decoded = hex::decode(&artifacts[2..]).unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            r#"{"did":"did:iden3:billions:test:x","response":"ok"}"#
        );
    }
}
