// src/models/attestation.rs
//! Attestation records exchanged with the on-chain attestation registry.

use crate::models::did::Identity;
use ethers_core::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

/// One side of an attestation: the attester or the recipient.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttestationParty {
    pub did: String,
    pub numeric_id: U256,
    pub eth_address: Address,
}

impl From<&Identity> for AttestationParty {
    fn from(identity: &Identity) -> Self {
        Self {
            did: identity.did.clone(),
            numeric_id: identity.numeric_id,
            eth_address: identity.eth_address,
        }
    }
}

/// Attestation as submitted to `recordAttestation`.
///
/// `data` is ABI-encoded and its layout depends on `schema_id`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttestationRecord {
    pub schema_id: H256,
    pub attester: AttestationParty,
    pub recipient: AttestationParty,
    pub expiration_time: u64,
    pub revocable: bool,
    pub ref_id: H256,
    pub data: Bytes,
}

/// Attestation as stored by the registry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredAttestation {
    pub id: H256,
    pub schema_id: H256,
    pub attester: AttestationParty,
    pub recipient: AttestationParty,
    pub time: u64,
    pub expiration_time: u64,
    pub revocation_time: u64,
    pub revocable: bool,
    pub ref_id: H256,
    pub data: Bytes,
}

impl StoredAttestation {
    pub fn is_revoked(&self) -> bool {
        self.revocation_time != 0
    }
}

/// Result of a confirmed `recordAttestation` transaction.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttestationReceipt {
    pub attestation_id: H256,
    pub tx_hash: H256,
}
