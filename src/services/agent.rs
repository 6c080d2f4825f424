// src/services/agent.rs
//! Agent session: the identity-bound operations exposed to callers.
//!
//! One session owns one key store, one ownership tracker and the clients
//! needed to reach the chain. Operations that read or write the tracker run
//! under a single operation lock, so at most one proof or attestation flow
//! is in flight per identity.

use crate::blockchain::{ChainReader, WalletAdapter};
use crate::config::AppConfig;
use crate::contracts::attestation_registry::{ownership_data, DidAuthData};
use crate::error::{AgentError, Result};
use crate::models::attestation::{
    AttestationParty, AttestationReceipt, AttestationRecord, StoredAttestation,
};
use crate::models::did::{eth_address_from_did, numeric_id_from_did};
use crate::services::attestation::AttestationClient;
use crate::utils::challenge::{challenge_in_range, generate_challenge, Challenge};
use crate::utils::serialization::{encode_artifacts, SIGNED_RESPONSE_TOKEN_FIELD};
use crate::wallet::identity::{self, KeyGeneration, KeyGenerator, ResolvedIdentity};
use crate::wallet::jws::{pack_artifacts, pack_challenge};
use crate::wallet::key_management::{KeyStore, KeyType};
use crate::wallet::ownership_state::{OwnershipState, OwnershipStep};
use ethers_core::abi::AbiEncode;
use ethers_core::types::{Address, H256};
use log::info;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};

const AGENT_KEY_TYPE: KeyType = KeyType::Secp256k1;

/// A response payload carrying its own signature.
///
/// `payload` always holds `did`, `ethAddress`, `challenge`, `response` and
/// `signedResponseToken`. `artifacts` is set when the token is detached and
/// must travel next to the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedResponse {
    pub payload: Map<String, Value>,
    pub artifacts: Option<String>,
}

/// Result of an idempotent attestation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AttestationOutcome {
    Recorded(AttestationReceipt),
    #[serde(rename_all = "camelCase")]
    AlreadyRecorded { tx_hash: H256 },
}

impl AttestationOutcome {
    pub fn tx_hash(&self) -> H256 {
        match self {
            AttestationOutcome::Recorded(receipt) => receipt.tx_hash,
            AttestationOutcome::AlreadyRecorded { tx_hash } => *tx_hash,
        }
    }
}

pub struct AgentSession {
    keys: Arc<dyn KeyStore>,
    wallet: Arc<dyn WalletAdapter>,
    attestations: AttestationClient,
    config: AppConfig,
    key_generator: KeyGenerator,
    state: Mutex<OwnershipState>,
    operation: tokio::sync::Mutex<()>,
}

impl AgentSession {
    pub fn new(
        keys: Arc<dyn KeyStore>,
        wallet: Arc<dyn WalletAdapter>,
        chain: Arc<dyn ChainReader>,
        config: AppConfig,
    ) -> Self {
        let attestations = AttestationClient::new(
            wallet.clone(),
            chain,
            config.registry.clone(),
            config.fees,
        );
        Self {
            keys,
            wallet,
            attestations,
            config,
            key_generator: KeyGenerator::new(),
            state: Mutex::new(OwnershipState::new()),
            operation: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn attestations(&self) -> &AttestationClient {
        &self.attestations
    }

    /// Reuses the most recent key, or creates one. A new key starts a new
    /// identity, so the ownership tracker is cleared.
    pub async fn generate_keys(&self) -> Result<KeyGeneration> {
        let _op = self.operation.lock().await;
        let generation = self
            .key_generator
            .ensure_key(self.keys.as_ref(), AGENT_KEY_TYPE)
            .await?;
        if generation.is_new() {
            self.state()?.reset();
        }
        Ok(generation)
    }

    pub async fn identity(&self) -> Result<ResolvedIdentity> {
        identity::resolve(
            self.keys.as_ref(),
            AGENT_KEY_TYPE,
            &self.config.did,
            self.wallet.as_ref(),
        )
        .await
    }

    /// Answers a verifier's challenge with a plain challenge token.
    ///
    /// # Arguments
    /// * `challenge` - Timestamp issued by the verifier, within the signed 32-bit range
    ///
    /// # Returns
    /// A payload whose `signedResponseToken` commits to `challenge`
    pub async fn prove_did(&self, challenge: Challenge) -> Result<SignedResponse> {
        if !challenge_in_range(challenge) {
            return Err(AgentError::InvalidInput(format!(
                "challenge {} is outside the 32-bit range",
                challenge
            )));
        }
        let resolved = self.identity().await?;
        let response = format!("DID {} proves control for challenge {}", resolved.identity.did, challenge);
        self.challenge_response(&resolved, challenge, response).await
    }

    /// Bearer token for the owner, valid for a limited time after issue.
    pub async fn owner_auth_token(&self) -> Result<SignedResponse> {
        let resolved = self.identity().await?;
        let response = format!("Owner authentication token for {}", resolved.identity.did);
        self.challenge_response(&resolved, generate_challenge(), response).await
    }

    /// Wraps `fields` in a response payload signed with a detached
    /// artifacts token.
    ///
    /// Fields named like the base payload keys are ignored.
    ///
    /// # Arguments
    /// * `response` - Human-readable summary placed under `response`
    /// * `fields` - Operation-specific fields merged into the payload
    pub async fn sign_response(
        &self,
        response: &str,
        fields: Map<String, Value>,
    ) -> Result<SignedResponse> {
        let resolved = self.identity().await?;
        let identity = &resolved.identity;
        let challenge = generate_challenge();

        let mut payload = base_payload(identity.did.as_str(), &identity.checksum_address(), challenge, response);
        for (name, value) in fields {
            if !payload.contains_key(&name) && name != SIGNED_RESPONSE_TOKEN_FIELD {
                payload.insert(name, value);
            }
        }

        let artifacts = encode_artifacts(&payload)?;
        let token = pack_artifacts(
            self.keys.as_ref(),
            &resolved.key,
            &payload,
            &identity.did,
            challenge,
            &identity.document(),
        )
        .await?;
        payload.insert(SIGNED_RESPONSE_TOKEN_FIELD.to_string(), Value::String(token));

        Ok(SignedResponse { payload, artifacts: Some(artifacts) })
    }

    /// Authenticates the agent and records a self-attestation of its DID.
    /// Does nothing if one was already recorded for this identity.
    ///
    /// # Returns
    /// [`AttestationOutcome::Recorded`] with the new attestation, or
    /// [`AttestationOutcome::AlreadyRecorded`] with the earlier transaction
    pub async fn create_did_auth_attestation(&self) -> Result<AttestationOutcome> {
        let _op = self.operation.lock().await;
        let recorded = self.state()?.did_auth_attestation_tx();
        if let Some(tx_hash) = recorded {
            info!("DID-auth attestation already recorded in {:?}", tx_hash);
            return Ok(AttestationOutcome::AlreadyRecorded { tx_hash });
        }

        let resolved = self.identity().await?;
        let identity = &resolved.identity;
        let schema_id = self.config.registry.did_auth_schema_id()?;

        self.attestations
            .ensure_balance(identity.eth_address, self.config.min_balance())
            .await?;
        self.attestations.authenticate(&resolved.key, identity).await?;

        let token = pack_challenge(
            self.keys.as_ref(),
            &resolved.key,
            &identity.did,
            generate_challenge(),
            &identity.document(),
        )
        .await?;

        let agent = AttestationParty::from(identity);
        let record = AttestationRecord {
            schema_id,
            attester: agent.clone(),
            recipient: agent,
            expiration_time: 0,
            revocable: true,
            ref_id: H256::zero(),
            data: DidAuthData::new(identity, &token).encode().into(),
        };
        let receipt = self.attestations.send_attestation(&resolved.key, &record).await?;
        self.state()?
            .record(OwnershipStep::DidAuthAttestation, receipt.tx_hash);
        Ok(AttestationOutcome::Recorded(receipt))
    }

    /// Records the agent's attestation that it is owned by the configured
    /// owner. Does nothing if one was already recorded for this identity.
    pub async fn attest_ownership_to_owner(&self) -> Result<AttestationOutcome> {
        let _op = self.operation.lock().await;
        let recorded = self.state()?.owner_attestation_from_agent_tx();
        if let Some(tx_hash) = recorded {
            info!("Ownership attestation already recorded in {:?}", tx_hash);
            return Ok(AttestationOutcome::AlreadyRecorded { tx_hash });
        }

        let resolved = self.identity().await?;
        let identity = &resolved.identity;
        let owner = self.owner()?;
        let schema_id = self.config.registry.ownership_schema_id()?;

        self.attestations
            .ensure_balance(identity.eth_address, self.config.min_balance())
            .await?;
        self.attestations.authenticate(&resolved.key, identity).await?;

        let record = AttestationRecord {
            schema_id,
            attester: AttestationParty::from(identity),
            recipient: owner,
            expiration_time: 0,
            revocable: true,
            ref_id: H256::zero(),
            data: ownership_data(),
        };
        let receipt = self.attestations.send_attestation(&resolved.key, &record).await?;
        self.state()?
            .record(OwnershipStep::OwnerAttestationFromAgent, receipt.tx_hash);
        Ok(AttestationOutcome::Recorded(receipt))
    }

    /// Accepts the owner's attestation of this agent, identified by the
    /// owner's transaction hash. Reads the chain only.
    ///
    /// # Errors
    /// [`AgentError::OwnershipMismatch`] if the attestation is revoked or was
    /// not issued by the configured owner to this agent under the ownership
    /// schema. The tracker is left untouched.
    pub async fn set_ownership(&self, owner_tx_hash: H256) -> Result<AttestationOutcome> {
        let _op = self.operation.lock().await;
        let recorded = self.state()?.owner_attestation_from_owner_tx();
        if let Some(tx_hash) = recorded {
            info!("Owner attestation already accepted from {:?}", tx_hash);
            return Ok(AttestationOutcome::AlreadyRecorded { tx_hash });
        }

        let resolved = self.identity().await?;
        let identity = &resolved.identity;
        let owner = self.owner()?;
        let schema_id = self.config.registry.ownership_schema_id()?;

        let attestation_id = self.attestations.attestation_id_from_tx(owner_tx_hash).await?;
        let stored = self.attestations.get_attestation(attestation_id).await?;

        if stored.schema_id != schema_id {
            return Err(AgentError::OwnershipMismatch(format!(
                "attestation {:?} uses schema {:?}, expected {:?}",
                attestation_id, stored.schema_id, schema_id
            )));
        }
        if stored.is_revoked() {
            return Err(AgentError::OwnershipMismatch(format!(
                "attestation {:?} was revoked at {}",
                attestation_id, stored.revocation_time
            )));
        }
        if stored.recipient.numeric_id != identity.numeric_id {
            return Err(AgentError::OwnershipMismatch(format!(
                "attestation {:?} names agent {}, this agent is {}",
                attestation_id, stored.recipient.numeric_id, identity.numeric_id
            )));
        }
        if stored.attester.numeric_id != owner.numeric_id {
            return Err(AgentError::OwnershipMismatch(format!(
                "attestation {:?} was issued by {}, configured owner is {}",
                attestation_id, stored.attester.numeric_id, owner.numeric_id
            )));
        }

        self.state()?
            .record(OwnershipStep::OwnerAttestationFromOwner, owner_tx_hash);
        info!("Accepted ownership attestation {:?} from {}", attestation_id, owner.did);
        Ok(AttestationOutcome::Recorded(AttestationReceipt {
            attestation_id,
            tx_hash: owner_tx_hash,
        }))
    }

    pub fn ownership_status(&self) -> Result<OwnershipState> {
        Ok(*self.state()?)
    }

    /// All attestations naming this agent as recipient.
    ///
    /// # Arguments
    /// * `page_size` - Ids fetched per registry call
    pub async fn list_received_attestations(&self, page_size: u64) -> Result<Vec<StoredAttestation>> {
        let resolved = self.identity().await?;
        self.attestations
            .list_attestations(resolved.identity.numeric_id, page_size)
            .await
    }

    async fn challenge_response(
        &self,
        resolved: &ResolvedIdentity,
        challenge: Challenge,
        response: String,
    ) -> Result<SignedResponse> {
        let identity = &resolved.identity;
        let token = pack_challenge(
            self.keys.as_ref(),
            &resolved.key,
            &identity.did,
            challenge,
            &identity.document(),
        )
        .await?;

        let mut payload = base_payload(&identity.did, &identity.checksum_address(), challenge, &response);
        payload.insert(SIGNED_RESPONSE_TOKEN_FIELD.to_string(), Value::String(token));
        Ok(SignedResponse { payload, artifacts: None })
    }

    fn owner(&self) -> Result<AttestationParty> {
        let did = self
            .config
            .owner_did
            .as_deref()
            .ok_or(AgentError::MissingBlockchainConfig("owner_did"))?;
        Ok(AttestationParty {
            did: did.to_string(),
            numeric_id: numeric_id_from_did(did)?,
            eth_address: eth_address_from_did(did)?.unwrap_or_else(Address::zero),
        })
    }

    fn state(&self) -> Result<MutexGuard<'_, OwnershipState>> {
        self.state
            .lock()
            .map_err(|_| AgentError::LockPoisoned("ownership state"))
    }
}

fn base_payload(did: &str, eth_address: &str, challenge: Challenge, response: &str) -> Map<String, Value> {
    let value = json!({
        "did": did,
        "ethAddress": eth_address,
        "challenge": challenge,
        "response": response,
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
