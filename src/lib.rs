// src/lib.rs
//! Self-sovereign identity for autonomous agents.
//!
//! An agent holds a secp256k1 key, derives an Ethereum-controlled DID from
//! it, proves control of that DID with `ES256K-R` tokens and records
//! ownership facts as attestations on an on-chain registry.
//!
//! ## Layout
//! - [`utils`]: challenge generation, hashing and encoding helpers
//! - [`models`]: DID and attestation data
//! - [`wallet`]: key store, identity resolution, token codec, ownership tracker
//! - [`contracts`]: calldata for the registry and auth-verifier contracts
//! - [`blockchain`]: chain access traits and the JSON-RPC client
//! - [`services`]: verifier, attestation client, agent session, tools and HTTP

pub mod blockchain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;
pub mod wallet;

pub use error::{AgentError, Result};
