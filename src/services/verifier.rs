// src/services/verifier.rs
//! Verification of DID-bound tokens.
//!
//! All policies share [`verify_token`]: the signer recovered from the
//! `ES256K-R` signature must be the Ethereum address in the DID document
//! built from `(did, eth_address)`. On top of that:
//!
//! - DID proofs require the exact challenge the verifier issued;
//! - owner-auth tokens are bearer tokens, valid for
//!   [`OWNER_AUTH_VALIDITY_SECS`] after their challenge timestamp;
//! - signed responses must carry artifacts matching the response payload.
//!
//! There is no seen-set. Replay protection is the freshness window only.

use crate::error::{AgentError, Result};
use crate::models::did::DidDocument;
use crate::utils::challenge::{challenge_in_range, Challenge};
use crate::utils::crypto::{recover_address, sha256};
use crate::utils::serialization::{encode_artifacts, strip_token_field, SIGNED_RESPONSE_TOKEN_FIELD};
use crate::wallet::jws::{reconstruct_detached, CompactParts, ES256K_R};
use ethers_core::types::Address;
use ethers_core::utils::to_checksum;
use serde::Serialize;
use serde_json::{Map, Value};

/// Lifetime of an owner-auth token, counted from its challenge.
pub const OWNER_AUTH_VALIDITY_SECS: i64 = 300;

/// Verified token body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenBody {
    pub from: String,
    pub challenge: Challenge,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<String>,
}

/// Checks the signature of a full (non-detached) token and decodes its body.
///
/// # Arguments
/// * `token` - Compact token with all three segments present
/// * `did` - DID the token must be issued by
/// * `eth_address` - Address controlling `did`
///
/// # Returns
/// The decoded body, or `MalformedToken` / `InvalidSignature`
pub fn verify_token(token: &str, did: &str, eth_address: Address) -> Result<TokenBody> {
    let document = DidDocument::for_ethereum_controller(did, eth_address);
    let parts = CompactParts::split(token)?;
    if parts.is_detached() {
        return Err(AgentError::MalformedToken(
            "detached token must be reconstructed before verification".into(),
        ));
    }

    let header = parts.decode_header()?;
    if header.alg != ES256K_R {
        return Err(AgentError::MalformedToken(format!("unsupported alg `{}`", header.alg)));
    }

    let method = document.find_method(&header.kid).ok_or_else(|| {
        AgentError::InvalidSignature(format!("kid `{}` is not a method of {}", header.kid, did))
    })?;
    let expected = method.address().ok_or_else(|| {
        AgentError::InvalidSignature(format!("method {} has no usable address", method.id))
    })?;

    let signature = parts.decode_signature()?;
    let digest = sha256(parts.signing_input().as_bytes());
    let signer = recover_address(&digest, &signature).map_err(AgentError::InvalidSignature)?;
    if signer != expected {
        return Err(AgentError::InvalidSignature(format!(
            "signed by {}, expected {}",
            to_checksum(&signer, None),
            to_checksum(&expected, None)
        )));
    }

    let body = parts.decode_body()?;
    let from = body
        .get("from")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::MalformedToken("missing `from`".into()))?;
    let challenge = body
        .get("challenge")
        .and_then(Value::as_i64)
        .ok_or_else(|| AgentError::MalformedToken("missing `challenge`".into()))?;
    if !challenge_in_range(challenge) {
        return Err(AgentError::MalformedToken(format!(
            "challenge {} is outside the 32-bit range",
            challenge
        )));
    }
    if from != did {
        return Err(AgentError::MalformedToken(format!(
            "token issued by {}, expected {}",
            from, did
        )));
    }

    Ok(TokenBody {
        from: from.to_string(),
        challenge,
        artifacts: body.get("artifacts").and_then(Value::as_str).map(str::to_string),
    })
}

/// Proof of DID control in answer to `expected_challenge`.
pub fn verify_did_proof(
    token: &str,
    did: &str,
    eth_address: Address,
    expected_challenge: Challenge,
) -> Result<TokenBody> {
    let body = verify_token(token, did, eth_address)?;
    if body.challenge != expected_challenge {
        return Err(AgentError::ChallengeMismatch {
            expected: expected_challenge,
            actual: body.challenge,
        });
    }
    Ok(body)
}

/// Owner-auth bearer token, valid while `challenge + 300 >= now`.
///
/// [`verify_token`] already bounds the challenge to 32 bits.
pub fn verify_owner_auth(token: &str, did: &str, eth_address: Address, now: i64) -> Result<TokenBody> {
    let body = verify_token(token, did, eth_address)?;
    let expires_at = body
        .challenge
        .checked_add(OWNER_AUTH_VALIDITY_SECS)
        .ok_or_else(|| AgentError::MalformedToken(format!("challenge {} overflows", body.challenge)))?;
    if expires_at < now {
        return Err(AgentError::ChallengeExpired {
            challenge: body.challenge,
            expired_at: expires_at,
        });
    }
    Ok(body)
}

/// Verifies a signed response: `payload` carries the detached token in
/// `signedResponseToken` and `artifacts` is the hex string sent next to it.
pub fn verify_response_artifacts(
    payload: &Map<String, Value>,
    artifacts: &str,
    did: &str,
    eth_address: Address,
) -> Result<TokenBody> {
    let token = payload
        .get(SIGNED_RESPONSE_TOKEN_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::MalformedToken(format!("missing `{}`", SIGNED_RESPONSE_TOKEN_FIELD)))?;
    let challenge = payload
        .get("challenge")
        .and_then(Value::as_i64)
        .ok_or_else(|| AgentError::MalformedToken("response has no `challenge`".into()))?;

    let full = reconstruct_detached(token, did, artifacts, challenge)?;
    let body = verify_token(&full, did, eth_address)?;

    let recomputed = encode_artifacts(&strip_token_field(payload))?;
    if body.artifacts.as_deref() != Some(recomputed.as_str()) {
        return Err(AgentError::ArtifactMismatch);
    }
    Ok(body)
}
