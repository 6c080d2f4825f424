// src/wallet/ownership_state.rs
//! Record of which attestation steps have completed for the active identity.
//!
//! Each field is written once, after its transaction is confirmed, and read
//! before deciding whether to submit again. Only a fresh key pair clears them.

use ethers_core::types::H256;
use log::warn;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipState {
    did_auth_attestation_tx: Option<H256>,
    owner_attestation_from_agent_tx: Option<H256>,
    owner_attestation_from_owner_tx: Option<H256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipStep {
    DidAuthAttestation,
    OwnerAttestationFromAgent,
    OwnerAttestationFromOwner,
}

impl OwnershipState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, step: OwnershipStep) -> Option<H256> {
        *self.slot(step)
    }

    pub fn is_done(&self, step: OwnershipStep) -> bool {
        self.get(step).is_some()
    }

    /// Records a confirmed transaction for `step`. Returns `false` and keeps
    /// the existing hash if the step was already recorded.
    pub fn record(&mut self, step: OwnershipStep, tx_hash: H256) -> bool {
        let slot = self.slot_mut(step);
        match *slot {
            Some(existing) => {
                warn!("{:?} already recorded as {:?}, ignoring {:?}", step, existing, tx_hash);
                false
            }
            None => {
                *slot = Some(tx_hash);
                true
            }
        }
    }

    /// Clears every step. Called when a new key pair replaces the identity.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn did_auth_attestation_tx(&self) -> Option<H256> {
        self.did_auth_attestation_tx
    }

    pub fn owner_attestation_from_agent_tx(&self) -> Option<H256> {
        self.owner_attestation_from_agent_tx
    }

    pub fn owner_attestation_from_owner_tx(&self) -> Option<H256> {
        self.owner_attestation_from_owner_tx
    }

    fn slot(&self, step: OwnershipStep) -> &Option<H256> {
        match step {
            OwnershipStep::DidAuthAttestation => &self.did_auth_attestation_tx,
            OwnershipStep::OwnerAttestationFromAgent => &self.owner_attestation_from_agent_tx,
            OwnershipStep::OwnerAttestationFromOwner => &self.owner_attestation_from_owner_tx,
        }
    }

    fn slot_mut(&mut self, step: OwnershipStep) -> &mut Option<H256> {
        match step {
            OwnershipStep::DidAuthAttestation => &mut self.did_auth_attestation_tx,
            OwnershipStep::OwnerAttestationFromAgent => &mut self.owner_attestation_from_agent_tx,
            OwnershipStep::OwnerAttestationFromOwner => &mut self.owner_attestation_from_owner_tx,
        }
    }
}
