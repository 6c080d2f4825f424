// src/contracts/attestation_registry.rs
//! Attestation registry contract interface.
//!
//! `recordAttestation` emits [`AttestationRecordedFilter`], whose first
//! indexed topic is the new attestation id; [`attestation_id_from_receipt`]
//! reads it back.

use crate::error::{AgentError, Result};
use crate::models::attestation::{AttestationParty, AttestationRecord, StoredAttestation};
use crate::models::did::Identity;
use ethers_contract::{EthAbiCodec, EthAbiType, EthCall, EthEvent};
use ethers_core::types::{Address, Bytes, TransactionReceipt, H256, U256};
use ethers_core::utils::hex;

/// `(string did, uint256 id, address ethAddress)` party tuple.
#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType)]
pub struct Party {
    pub did: String,
    pub numeric_id: U256,
    pub eth_address: Address,
}

/// Argument of `recordAttestation`.
#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType)]
pub struct AttestationRequest {
    pub schema_id: [u8; 32],
    pub attester: Party,
    pub recipient: Party,
    pub expiration_time: u64,
    pub revocable: bool,
    pub ref_id: [u8; 32],
    pub data: Bytes,
}

/// Attestation tuple returned by `getAttestation`.
#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType)]
pub struct Attestation {
    pub id: [u8; 32],
    pub schema_id: [u8; 32],
    pub attester: Party,
    pub recipient: Party,
    pub time: u64,
    pub expiration_time: u64,
    pub revocation_time: u64,
    pub revocable: bool,
    pub ref_id: [u8; 32],
    pub data: Bytes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(
    name = "recordAttestation",
    abi = "recordAttestation((bytes32,(string,uint256,address),(string,uint256,address),uint64,bool,bytes32,bytes))"
)]
pub struct RecordAttestationCall {
    pub request: AttestationRequest,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "getAttestation", abi = "getAttestation(bytes32)")]
pub struct GetAttestationCall {
    pub id: [u8; 32],
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct GetAttestationReturn(pub Attestation);

/// One page of the ids of attestations received by `recipient`.
#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(
    name = "getAttestationIdsByRecipient",
    abi = "getAttestationIdsByRecipient(uint256,uint256,uint256)"
)]
pub struct GetAttestationIdsByRecipientCall {
    pub recipient: U256,
    pub offset: U256,
    pub limit: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct GetAttestationIdsByRecipientReturn(pub Vec<[u8; 32]>);

#[derive(Clone, Debug, Default, PartialEq, Eq, EthEvent)]
#[ethevent(
    name = "AttestationRecorded",
    abi = "AttestationRecorded(bytes32,bytes32,uint256,uint256)"
)]
pub struct AttestationRecordedFilter {
    #[ethevent(indexed)]
    pub id: [u8; 32],
    #[ethevent(indexed)]
    pub schema_id: [u8; 32],
    pub attester_id: U256,
    pub recipient_id: U256,
}

/// `data` payload of a DID-auth attestation:
/// `abi.encode(string did, uint256 id, address ethAddress, string token)`.
#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct DidAuthData {
    pub did: String,
    pub numeric_id: U256,
    pub eth_address: Address,
    pub token: String,
}

impl DidAuthData {
    /// # Arguments
    /// * `identity` - The agent identity being attested
    /// * `token` - A plain challenge token signed by that identity
    pub fn new(identity: &Identity, token: &str) -> Self {
        Self {
            did: identity.did.clone(),
            numeric_id: identity.numeric_id,
            eth_address: identity.eth_address,
            token: token.to_string(),
        }
    }
}

/// Ownership attestations carry no payload.
pub fn ownership_data() -> Bytes {
    Bytes::new()
}

/// Attestation id emitted by a `recordAttestation` transaction.
///
/// # Returns
/// `receipt.logs[0].topics[1]`, or [`AgentError::NoLogs`] when the receipt
/// has no logs or the first log carries no id topic.
pub fn attestation_id_from_receipt(receipt: &TransactionReceipt) -> Result<H256> {
    let tx = format!("0x{}", hex::encode(receipt.transaction_hash.as_bytes()));
    let log = receipt
        .logs
        .first()
        .ok_or_else(|| AgentError::NoLogs(tx.clone()))?;
    log.topics
        .get(1)
        .copied()
        .ok_or_else(|| AgentError::NoLogs(format!("{} (first log has no indexed attestation id)", tx)))
}

impl From<&AttestationParty> for Party {
    fn from(party: &AttestationParty) -> Self {
        Self {
            did: party.did.clone(),
            numeric_id: party.numeric_id,
            eth_address: party.eth_address,
        }
    }
}

impl From<Party> for AttestationParty {
    fn from(party: Party) -> Self {
        Self {
            did: party.did,
            numeric_id: party.numeric_id,
            eth_address: party.eth_address,
        }
    }
}

impl From<&AttestationRecord> for AttestationRequest {
    fn from(record: &AttestationRecord) -> Self {
        Self {
            schema_id: record.schema_id.to_fixed_bytes(),
            attester: (&record.attester).into(),
            recipient: (&record.recipient).into(),
            expiration_time: record.expiration_time,
            revocable: record.revocable,
            ref_id: record.ref_id.to_fixed_bytes(),
            data: record.data.clone(),
        }
    }
}

impl From<AttestationRequest> for AttestationRecord {
    fn from(request: AttestationRequest) -> Self {
        Self {
            schema_id: H256::from(request.schema_id),
            attester: request.attester.into(),
            recipient: request.recipient.into(),
            expiration_time: request.expiration_time,
            revocable: request.revocable,
            ref_id: H256::from(request.ref_id),
            data: request.data,
        }
    }
}

impl From<&StoredAttestation> for Attestation {
    fn from(stored: &StoredAttestation) -> Self {
        Self {
            id: stored.id.to_fixed_bytes(),
            schema_id: stored.schema_id.to_fixed_bytes(),
            attester: (&stored.attester).into(),
            recipient: (&stored.recipient).into(),
            time: stored.time,
            expiration_time: stored.expiration_time,
            revocation_time: stored.revocation_time,
            revocable: stored.revocable,
            ref_id: stored.ref_id.to_fixed_bytes(),
            data: stored.data.clone(),
        }
    }
}

impl From<Attestation> for StoredAttestation {
    fn from(attestation: Attestation) -> Self {
        Self {
            id: H256::from(attestation.id),
            schema_id: H256::from(attestation.schema_id),
            attester: attestation.attester.into(),
            recipient: attestation.recipient.into(),
            time: attestation.time,
            expiration_time: attestation.expiration_time,
            revocation_time: attestation.revocation_time,
            revocable: attestation.revocable,
            ref_id: H256::from(attestation.ref_id),
            data: attestation.data,
        }
    }
}
