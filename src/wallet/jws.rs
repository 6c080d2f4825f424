// src/wallet/jws.rs
//! Compact `ES256K-R` tokens bound to an agent DID.
//!
//! Two token shapes are produced:
//!
//! - challenge tokens, body `{"from": did, "challenge": n}`, sent whole;
//! - artifact tokens, body `{"from": did, "artifacts": "0x..", "challenge": n}`,
//!   sent detached as `header..signature`. The artifacts travel next to the
//!   token and the receiver rebuilds the body with [`reconstruct_detached`].
//!
//! The signature covers `base64url(header) "." base64url(body)` exactly as
//! serialized here, so body field order is part of the wire format.

use crate::error::{AgentError, Result};
use crate::models::did::DidDocument;
use crate::utils::challenge::Challenge;
use crate::utils::serialization::{
    base64url_decode, base64url_encode, encode_artifacts, strip_token_field, to_json_bytes,
};
use crate::wallet::key_management::{KeyRef, KeyStore, SignatureAlgorithm};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ES256K_R: &str = "ES256K-R";
const TOKEN_TYPE: &str = "JWT";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JwsHeader {
    pub alg: String,
    pub typ: String,
    /// Verification method of the issuing DID, `"<did>#<fragment>"`.
    pub kid: String,
}

impl JwsHeader {
    /// DID part of `kid`.
    pub fn issuer(&self) -> &str {
        self.kid.split('#').next().unwrap_or_default()
    }
}

#[derive(Serialize)]
struct ChallengeBody<'a> {
    from: &'a str,
    challenge: Challenge,
}

#[derive(Serialize)]
struct ArtifactBody<'a> {
    from: &'a str,
    artifacts: &'a str,
    challenge: Challenge,
}

/// The three segments of a compact token, still encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactParts<'a> {
    pub header: &'a str,
    pub body: &'a str,
    pub signature: &'a str,
}

impl<'a> CompactParts<'a> {
    pub fn split(token: &'a str) -> Result<Self> {
        let mut segments = token.split('.');
        match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(header), Some(body), Some(signature), None) => Ok(Self { header, body, signature }),
            _ => Err(AgentError::MalformedToken(
                "expected three dot-separated segments".into(),
            )),
        }
    }

    pub fn is_detached(&self) -> bool {
        self.body.is_empty()
    }

    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.body)
    }

    pub fn decode_header(&self) -> Result<JwsHeader> {
        let bytes = base64url_decode(self.header).map_err(AgentError::MalformedToken)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AgentError::MalformedToken(format!("invalid header: {}", e)))
    }

    pub fn decode_body(&self) -> Result<Value> {
        let bytes = base64url_decode(self.body).map_err(AgentError::MalformedToken)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AgentError::MalformedToken(format!("invalid body: {}", e)))
    }

    pub fn decode_signature(&self) -> Result<Vec<u8>> {
        base64url_decode(self.signature).map_err(AgentError::MalformedToken)
    }
}

/// Signs `{from: did, challenge}` as a compact token.
pub async fn pack_challenge(
    store: &dyn KeyStore,
    key: &KeyRef,
    did: &str,
    challenge: Challenge,
    document: &DidDocument,
) -> Result<String> {
    let body = to_json_bytes(&ChallengeBody { from: did, challenge })?;
    sign_compact(store, key, &body, document).await
}

/// Signs `{from: did, artifacts: hex(json(payload)), challenge}` and returns
/// the detached form `header..signature`.
///
/// Any `signedResponseToken` field in `payload` is excluded from the artifacts.
pub async fn pack_artifacts(
    store: &dyn KeyStore,
    key: &KeyRef,
    payload: &Map<String, Value>,
    did: &str,
    challenge: Challenge,
    document: &DidDocument,
) -> Result<String> {
    let artifacts = encode_artifacts(&strip_token_field(payload))?;
    let body = artifact_body_bytes(did, &artifacts, challenge)?;
    let token = sign_compact(store, key, &body, document).await?;
    detach(&token)
}

/// Blanks the body segment of a compact token.
pub fn detach(token: &str) -> Result<String> {
    let parts = CompactParts::split(token)?;
    Ok(format!("{}..{}", parts.header, parts.signature))
}

/// Rebuilds a full token from a detached one and the out-of-band body fields.
pub fn reconstruct_detached(
    token: &str,
    did: &str,
    artifacts: &str,
    challenge: Challenge,
) -> Result<String> {
    let parts = CompactParts::split(token)?;
    if !parts.is_detached() {
        return Err(AgentError::MalformedToken("token is not detached".into()));
    }
    let body = base64url_encode(&artifact_body_bytes(did, artifacts, challenge)?);
    Ok(format!("{}.{}.{}", parts.header, body, parts.signature))
}

fn artifact_body_bytes(did: &str, artifacts: &str, challenge: Challenge) -> Result<Vec<u8>> {
    Ok(to_json_bytes(&ArtifactBody { from: did, artifacts, challenge })?)
}

async fn sign_compact(
    store: &dyn KeyStore,
    key: &KeyRef,
    body: &[u8],
    document: &DidDocument,
) -> Result<String> {
    let kid = document
        .signing_kid()
        .ok_or_else(|| AgentError::SigningFailure("DID document has no authentication method".into()))?;
    let header = JwsHeader {
        alg: ES256K_R.to_string(),
        typ: TOKEN_TYPE.to_string(),
        kid: kid.to_string(),
    };

    let signing_input = format!(
        "{}.{}",
        base64url_encode(&to_json_bytes(&header)?),
        base64url_encode(body)
    );

    let signature = store
        .sign(key, signing_input.as_bytes(), SignatureAlgorithm::Es256kR)
        .await
        .map_err(|e| match e {
            AgentError::SigningFailure(_) => e,
            other => AgentError::SigningFailure(other.to_string()),
        })?;
    if signature.len() != 65 {
        return Err(AgentError::SigningFailure(format!(
            "{} signature must be 65 bytes, got {}",
            ES256K_R,
            signature.len()
        )));
    }

    Ok(format!("{}.{}", signing_input, base64url_encode(&signature)))
}
