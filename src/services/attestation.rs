// src/services/attestation.rs
//! On-chain attestation client.
//!
//! Talks to two contracts through [`WalletAdapter`] and [`ChainReader`]:
//! the auth verifier, which maps an Ethereum address to an identity id, and
//! the attestation registry, which stores attestations between identities.
//!
//! Nothing here retries. A failed call or transaction is returned to the
//! caller as-is; the only local recovery is the gas-estimate fallback.

use crate::blockchain::{ChainReader, FeeData, WalletAdapter};
use crate::config::{FeeOverrides, RegistryConfig};
use crate::contracts::attestation_registry::{
    attestation_id_from_receipt, GetAttestationCall, GetAttestationIdsByRecipientCall,
    GetAttestationIdsByRecipientReturn, GetAttestationReturn, RecordAttestationCall,
};
use crate::contracts::auth_verifier::{
    AuthMethodExistsCall, AuthMethodExistsReturn, AuthResponse, GetIdByAddressCall,
    GetIdByAddressReturn, SubmitResponseCall, ETH_IDENTITY_AUTH_METHOD,
};
use crate::contracts::{calldata, decode};
use crate::error::{AgentError, Result};
use crate::models::attestation::{AttestationReceipt, AttestationRecord, StoredAttestation};
use crate::models::did::Identity;
use crate::wallet::key_management::KeyRef;
use ethers_core::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, Eip1559TransactionRequest,
    TransactionReceipt, H256, U256,
};
use log::{debug, info, warn};
use std::sync::Arc;

/// Gas limit used when the node cannot estimate a transaction.
pub const FALLBACK_GAS_LIMIT: u64 = 10_000_000;

pub struct AttestationClient {
    wallet: Arc<dyn WalletAdapter>,
    chain: Arc<dyn ChainReader>,
    registry: RegistryConfig,
    fees: FeeOverrides,
}

impl AttestationClient {
    /// # Arguments
    /// * `wallet` - Signs and sends transactions for agent keys
    /// * `chain` - Read access to contracts, balances and receipts
    /// * `registry` - Contract addresses and schema ids
    /// * `fees` - Operator fee overrides, missing fields come from the network
    pub fn new(
        wallet: Arc<dyn WalletAdapter>,
        chain: Arc<dyn ChainReader>,
        registry: RegistryConfig,
        fees: FeeOverrides,
    ) -> Self {
        Self { wallet, chain, registry, fees }
    }

    /// Makes sure the auth verifier maps the key's address to `identity`.
    ///
    /// Already authenticated addresses are accepted without a transaction as
    /// long as they map to the same identity id. Otherwise an `ethIdentity`
    /// response is submitted and the mapping is read back.
    ///
    /// # Errors
    /// - [`AgentError::IdentityMismatch`] if the address maps to another id
    /// - [`AgentError::AuthMethodUnavailable`] if the verifier has no `ethIdentity` method
    /// - [`AgentError::AuthenticationFailed`] if the mapping is still empty after confirmation
    pub async fn authenticate(&self, key: &KeyRef, identity: &Identity) -> Result<U256> {
        let verifier = self.registry.auth_verifier()?;

        let registered = self.registered_id(verifier, identity.eth_address).await?;
        if !registered.is_zero() {
            ensure_same_identity(identity, registered)?;
            debug!("{} is already authenticated", identity.did);
            return Ok(registered);
        }

        let method_exists = self
            .chain
            .call(
                verifier,
                calldata(AuthMethodExistsCall {
                    method: ETH_IDENTITY_AUTH_METHOD.to_string(),
                }),
            )
            .await?;
        if !decode::<AuthMethodExistsReturn>(&method_exists)?.0 {
            return Err(AgentError::AuthMethodUnavailable(ETH_IDENTITY_AUTH_METHOD.to_string()));
        }

        let submission =
            SubmitResponseCall::authenticate(AuthResponse::eth_identity(identity.numeric_id));
        let receipt = self.submit(key, verifier, calldata(submission)).await?;
        info!(
            "Authentication response for {} confirmed in {:?}",
            identity.did, receipt.transaction_hash
        );

        let registered = self.registered_id(verifier, identity.eth_address).await?;
        if registered.is_zero() {
            return Err(AgentError::AuthenticationFailed);
        }
        ensure_same_identity(identity, registered)?;
        Ok(registered)
    }

    /// Records `record` in the attestation registry.
    ///
    /// # Arguments
    /// * `key` - Key paying for and signing the transaction
    /// * `record` - Attestation to record
    ///
    /// # Returns
    /// The id the registry emitted for the attestation and the transaction hash
    pub async fn send_attestation(
        &self,
        key: &KeyRef,
        record: &AttestationRecord,
    ) -> Result<AttestationReceipt> {
        let registry = self.registry.attestation_registry()?;
        let receipt = self
            .submit(key, registry, calldata(RecordAttestationCall { request: record.into() }))
            .await?;
        let attestation_id = attestation_id_from_receipt(&receipt)?;
        info!(
            "Attestation {:?} recorded in {:?} ({} -> {})",
            attestation_id, receipt.transaction_hash, record.attester.did, record.recipient.did
        );
        Ok(AttestationReceipt {
            attestation_id,
            tx_hash: receipt.transaction_hash,
        })
    }

    /// Reads a stored attestation by id.
    ///
    /// # Arguments
    /// * `id` - Attestation id, as emitted when it was recorded
    pub async fn get_attestation(&self, id: H256) -> Result<StoredAttestation> {
        let registry = self.registry.attestation_registry()?;
        let data = self
            .chain
            .call(registry, calldata(GetAttestationCall { id: id.to_fixed_bytes() }))
            .await?;
        Ok(decode::<GetAttestationReturn>(&data)?.0.into())
    }

    /// Reads the attestation id emitted by an already mined transaction.
    pub async fn attestation_id_from_tx(&self, tx_hash: H256) -> Result<H256> {
        let receipt = self
            .chain
            .transaction_receipt(tx_hash)
            .await?
            .ok_or(AgentError::NoReceipt)?;
        attestation_id_from_receipt(&receipt)
    }

    /// Every attestation received by `recipient`, fetched one page at a time.
    ///
    /// Stops at the first page shorter than `page_size`.
    ///
    /// # Arguments
    /// * `recipient` - Numeric identity id of the recipient
    /// * `page_size` - Ids requested per call, must be positive
    pub async fn list_attestations(
        &self,
        recipient: U256,
        page_size: u64,
    ) -> Result<Vec<StoredAttestation>> {
        if page_size == 0 {
            return Err(AgentError::InvalidInput("page size must be positive".into()));
        }
        let registry = self.registry.attestation_registry()?;

        let mut attestations = Vec::new();
        let mut offset = 0u64;
        loop {
            let page = GetAttestationIdsByRecipientCall {
                recipient,
                offset: U256::from(offset),
                limit: U256::from(page_size),
            };
            let data = self.chain.call(registry, calldata(page)).await?;
            let ids = decode::<GetAttestationIdsByRecipientReturn>(&data)?.0;
            debug!("Page at offset {} holds {} attestation ids", offset, ids.len());

            let last_page = (ids.len() as u64) < page_size;
            for id in ids {
                attestations.push(self.get_attestation(H256::from(id)).await?);
            }
            if last_page {
                break;
            }
            offset += page_size;
        }
        Ok(attestations)
    }

    /// Fails with a funding hint when `address` holds less than `minimum` wei.
    ///
    /// # Returns
    /// The current balance of `address` in wei
    pub async fn ensure_balance(&self, address: Address, minimum: U256) -> Result<U256> {
        let balance = self.chain.balance(address).await?;
        if balance < minimum {
            return Err(AgentError::InsufficientBalance {
                address: format!("{:?}", address),
                balance: balance.to_string(),
                required: minimum.to_string(),
            });
        }
        Ok(balance)
    }

    async fn registered_id(&self, verifier: Address, address: Address) -> Result<U256> {
        let data = self
            .chain
            .call(verifier, calldata(GetIdByAddressCall { addr: address }))
            .await?;
        Ok(decode::<GetIdByAddressReturn>(&data)?.0)
    }

    async fn submit(&self, key: &KeyRef, to: Address, calldata: Bytes) -> Result<TransactionReceipt> {
        let from = self.wallet.address_for_key(key).await?;
        let fees = self.resolve_fees().await?;

        let mut request: TypedTransaction = Eip1559TransactionRequest::new()
            .from(from)
            .to(to)
            .data(calldata)
            .max_fee_per_gas(fees.max_fee_per_gas)
            .max_priority_fee_per_gas(fees.max_priority_fee_per_gas)
            .into();

        let gas = match self.wallet.estimate_gas(key, &request).await {
            Ok(gas) => gas,
            Err(e) => {
                warn!("Gas estimation failed ({}), using {}", e, FALLBACK_GAS_LIMIT);
                U256::from(FALLBACK_GAS_LIMIT)
            }
        };
        request.set_gas(gas);
        debug!("Sending transaction from {:?} to {:?} with gas {}", from, to, gas);

        self.wallet
            .send_transaction(key, request)
            .await?
            .ok_or(AgentError::NoReceipt)
    }

    async fn resolve_fees(&self) -> Result<FeeData> {
        match (self.fees.max_fee_per_gas, self.fees.max_priority_fee_per_gas) {
            (Some(max_fee), Some(priority)) => Ok(FeeData {
                max_fee_per_gas: U256::from(max_fee),
                max_priority_fee_per_gas: U256::from(priority),
            }),
            (max_fee, priority) => {
                let network = self.chain.fee_data().await?;
                Ok(FeeData {
                    max_fee_per_gas: max_fee.map(U256::from).unwrap_or(network.max_fee_per_gas),
                    max_priority_fee_per_gas: priority
                        .map(U256::from)
                        .unwrap_or(network.max_priority_fee_per_gas),
                })
            }
        }
    }
}

fn ensure_same_identity(identity: &Identity, registered: U256) -> Result<()> {
    if registered != identity.numeric_id {
        return Err(AgentError::IdentityMismatch {
            expected: identity.numeric_id.to_string(),
            registered: registered.to_string(),
        });
    }
    Ok(())
}
