// src/error.rs
//! Error taxonomy for identity, token and attestation operations.
//!
//! Every variant is terminal for the operation that produced it. Nothing in
//! the crate retries internally; the caller decides whether to re-invoke.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("no key of type {0} found in the key store")]
    NoKeyFound(String),

    #[error("signing failed: {0}")]
    SigningFailure(String),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("invalid token signature: {0}")]
    InvalidSignature(String),

    #[error("challenge mismatch: expected {expected}, got {actual}")]
    ChallengeMismatch { expected: i64, actual: i64 },

    #[error("challenge {challenge} expired at {expired_at}")]
    ChallengeExpired { challenge: i64, expired_at: i64 },

    #[error("signed artifacts do not match the response payload")]
    ArtifactMismatch,

    #[error("address is authenticated as {registered}, expected {expected}")]
    IdentityMismatch { expected: String, registered: String },

    #[error("auth method `{0}` is not registered on the verifier contract")]
    AuthMethodUnavailable(String),

    #[error("authentication transaction confirmed but address is still unmapped")]
    AuthenticationFailed,

    #[error("no receipt returned for transaction")]
    NoReceipt,

    #[error("transaction receipt {0} has no logs")]
    NoLogs(String),

    #[error(
        "insufficient balance: {address} holds {balance} wei, at least {required} wei is needed. \
         Fund the agent address before retrying"
    )]
    InsufficientBalance {
        address: String,
        balance: String,
        required: String,
    },

    #[error("ownership mismatch: {0}")]
    OwnershipMismatch(String),

    #[error("missing blockchain configuration: {0}")]
    MissingBlockchainConfig(&'static str),

    #[error("invalid DID: {0}")]
    InvalidDid(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} lock poisoned by a panicked holder")]
    LockPoisoned(&'static str),

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl AgentError {
    pub fn rpc(err: impl std::fmt::Display) -> Self {
        Self::Rpc(err.to_string())
    }

    pub fn abi(err: impl std::fmt::Display) -> Self {
        Self::Abi(err.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            AgentError::MalformedToken(_)
            | AgentError::InvalidDid(_)
            | AgentError::InvalidInput(_)
            | AgentError::Serialization(_) => StatusCode::BAD_REQUEST,
            AgentError::InvalidSignature(_)
            | AgentError::ChallengeMismatch { .. }
            | AgentError::ChallengeExpired { .. }
            | AgentError::ArtifactMismatch => StatusCode::UNAUTHORIZED,
            AgentError::IdentityMismatch { .. } | AgentError::OwnershipMismatch(_) => {
                StatusCode::CONFLICT
            }
            AgentError::UnknownTool(_) => StatusCode::NOT_FOUND,
            AgentError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            AgentError::Rpc(_)
            | AgentError::NoReceipt
            | AgentError::NoLogs(_)
            | AgentError::AuthMethodUnavailable(_)
            | AgentError::AuthenticationFailed => StatusCode::BAD_GATEWAY,
            AgentError::NoKeyFound(_)
            | AgentError::SigningFailure(_)
            | AgentError::MissingBlockchainConfig(_)
            | AgentError::Abi(_)
            | AgentError::LockPoisoned(_)
            | AgentError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
