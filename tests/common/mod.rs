#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use agent_did::blockchain::{ChainReader, FeeData, WalletAdapter};
use agent_did::config::{AppConfig, RegistryConfig};
use agent_did::contracts::attestation_registry::{
    AttestationRecordedFilter, GetAttestationCall, GetAttestationIdsByRecipientCall,
    GetAttestationIdsByRecipientReturn, GetAttestationReturn, RecordAttestationCall,
};
use agent_did::contracts::auth_verifier::{
    AuthMethodExistsCall, AuthMethodExistsReturn, GetIdByAddressCall, GetIdByAddressReturn,
    SubmitResponseCall,
};
use agent_did::contracts::decode;
use agent_did::error::{AgentError, Result};
use agent_did::models::attestation::{AttestationParty, AttestationRecord, StoredAttestation};
use agent_did::models::did::{DidConfig, Identity};
use agent_did::services::agent::AgentSession;
use agent_did::utils::crypto::address_from_public_key;
use agent_did::wallet::key_management::{KeyRef, KeyStore, LocalKeyStore};
use async_trait::async_trait;
use ethers::contract::EthEvent;
use ethers_core::abi::AbiEncode;
use ethers_core::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, Log, NameOrAddress,
    TransactionReceipt, H256, U256,
};

pub fn registry_address() -> Address {
    Address::from_low_u64_be(0xaa)
}

pub fn verifier_address() -> Address {
    Address::from_low_u64_be(0xbb)
}

pub fn did_auth_schema() -> H256 {
    H256::from_low_u64_be(0x5151)
}

pub fn ownership_schema() -> H256 {
    H256::from_low_u64_be(0x0e0e)
}

/// Identity of the agent owner used across tests.
pub fn owner_identity() -> Identity {
    Identity::build(&DidConfig::default(), Address::from_low_u64_be(0x0123_4567)).unwrap()
}

pub fn test_config() -> AppConfig {
    AppConfig {
        registry: RegistryConfig {
            attestation_registry: Some(registry_address()),
            auth_verifier: Some(verifier_address()),
            did_auth_schema_id: Some(did_auth_schema()),
            ownership_schema_id: Some(ownership_schema()),
        },
        owner_did: Some(owner_identity().did),
        min_balance_wei: 1_000,
        ..AppConfig::default()
    }
}

/// Mutable state of the in-memory chain.
pub struct ChainState {
    pub registered_ids: HashMap<Address, U256>,
    pub auth_method_exists: bool,
    /// Whether `submitResponse` maps the sender to the submitted id.
    pub register_on_submit: bool,
    pub balance: U256,
    pub fail_gas_estimation: bool,
    pub drop_receipts: bool,
    pub attestations: Vec<StoredAttestation>,
    pub receipts: HashMap<H256, TransactionReceipt>,
    pub sent: Vec<TypedTransaction>,
    pub id_pages_served: usize,
    next_nonce: u64,
}

/// Auth verifier and attestation registry simulated in memory. Calldata is
/// decoded with the crate's own contract bindings.
pub struct FakeChain {
    keys: Arc<LocalKeyStore>,
    pub state: Mutex<ChainState>,
}

impl FakeChain {
    pub fn new(keys: Arc<LocalKeyStore>) -> Self {
        Self {
            keys,
            state: Mutex::new(ChainState {
                registered_ids: HashMap::new(),
                auth_method_exists: true,
                register_on_submit: true,
                balance: U256::exp10(18),
                fail_gas_estimation: false,
                drop_receipts: false,
                attestations: Vec::new(),
                receipts: HashMap::new(),
                sent: Vec::new(),
                id_pages_served: 0,
                next_nonce: 1,
            }),
        }
    }

    pub fn with_state(self, f: impl FnOnce(&mut ChainState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }

    /// Stores an attestation as if someone else had sent it and returns the
    /// hash of that transaction.
    pub fn insert_attestation(
        &self,
        schema_id: H256,
        attester: AttestationParty,
        recipient: AttestationParty,
    ) -> H256 {
        let mut state = self.state.lock().unwrap();
        let (_, receipt) = state.store_attestation(schema_id, attester, recipient, Bytes::new());
        receipt.transaction_hash
    }
}

impl ChainState {
    fn next_hash(&mut self, base: u64) -> H256 {
        self.next_nonce += 1;
        H256::from_low_u64_be(base + self.next_nonce)
    }

    fn store_attestation(
        &mut self,
        schema_id: H256,
        attester: AttestationParty,
        recipient: AttestationParty,
        data: Bytes,
    ) -> (H256, TransactionReceipt) {
        let attestation_id = self.next_hash(0xa000);
        let tx_hash = self.next_hash(0xf000);
        self.attestations.push(StoredAttestation {
            id: attestation_id,
            schema_id,
            attester,
            recipient,
            time: 1_700_000_000,
            expiration_time: 0,
            revocation_time: 0,
            revocable: true,
            ref_id: H256::zero(),
            data,
        });
        let receipt = TransactionReceipt {
            transaction_hash: tx_hash,
            logs: vec![Log {
                address: registry_address(),
                topics: vec![AttestationRecordedFilter::signature(), attestation_id],
                ..Default::default()
            }],
            ..Default::default()
        };
        self.receipts.insert(tx_hash, receipt.clone());
        (attestation_id, receipt)
    }
}

#[async_trait]
impl WalletAdapter for FakeChain {
    async fn address_for_key(&self, key: &KeyRef) -> Result<Address> {
        let public = self.keys.public_key(key).await?;
        address_from_public_key(&public).map_err(AgentError::SigningFailure)
    }

    async fn send_transaction(
        &self,
        key: &KeyRef,
        request: TypedTransaction,
    ) -> Result<Option<TransactionReceipt>> {
        let from = self.address_for_key(key).await?;
        let to = match request.to() {
            Some(NameOrAddress::Address(to)) => *to,
            _ => return Err(AgentError::Rpc("transaction has no recipient".into())),
        };
        let data = request.data().cloned().unwrap_or_default();

        let mut state = self.state.lock().unwrap();
        state.sent.push(request);
        if state.drop_receipts {
            return Ok(None);
        }

        if to == verifier_address() {
            let call: SubmitResponseCall = decode(&data)?;
            if state.register_on_submit {
                state
                    .registered_ids
                    .insert(from, call.auth_response.eth_identity_id()?);
            }
            let tx_hash = state.next_hash(0xf000);
            let receipt = TransactionReceipt {
                transaction_hash: tx_hash,
                ..Default::default()
            };
            state.receipts.insert(tx_hash, receipt.clone());
            return Ok(Some(receipt));
        }

        if to == registry_address() {
            let call: RecordAttestationCall = decode(&data)?;
            let record = AttestationRecord::from(call.request);
            let (_, receipt) =
                state.store_attestation(record.schema_id, record.attester, record.recipient, record.data);
            return Ok(Some(receipt));
        }

        Err(AgentError::Rpc(format!("unexpected transaction to {:?}", to)))
    }

    async fn estimate_gas(&self, _key: &KeyRef, _request: &TypedTransaction) -> Result<U256> {
        if self.state.lock().unwrap().fail_gas_estimation {
            return Err(AgentError::Rpc("execution reverted".into()));
        }
        Ok(U256::from(150_000))
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let mut state = self.state.lock().unwrap();

        if to == verifier_address() {
            if let Ok(call) = decode::<GetIdByAddressCall>(&data) {
                let registered = state.registered_ids.get(&call.addr).copied().unwrap_or_default();
                return Ok(GetIdByAddressReturn(registered).encode().into());
            }
            if decode::<AuthMethodExistsCall>(&data).is_ok() {
                return Ok(AuthMethodExistsReturn(state.auth_method_exists).encode().into());
            }
        }
        if to == registry_address() {
            if let Ok(call) = decode::<GetAttestationCall>(&data) {
                let id = H256::from(call.id);
                let stored = state
                    .attestations
                    .iter()
                    .find(|a| a.id == id)
                    .ok_or_else(|| AgentError::Rpc(format!("no attestation {:?}", id)))?;
                return Ok(GetAttestationReturn(stored.into()).encode().into());
            }
            if let Ok(call) = decode::<GetAttestationIdsByRecipientCall>(&data) {
                state.id_pages_served += 1;
                let ids: Vec<[u8; 32]> = state
                    .attestations
                    .iter()
                    .filter(|a| a.recipient.numeric_id == call.recipient)
                    .skip(call.offset.as_usize())
                    .take(call.limit.as_usize())
                    .map(|a| a.id.to_fixed_bytes())
                    .collect();
                return Ok(GetAttestationIdsByRecipientReturn(ids).encode().into());
            }
        }

        Err(AgentError::Rpc(format!("unexpected call to {:?}", to)))
    }

    async fn fee_data(&self) -> Result<FeeData> {
        Ok(FeeData {
            max_fee_per_gas: U256::from(30_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
        })
    }

    async fn balance(&self, _address: Address) -> Result<U256> {
        Ok(self.state.lock().unwrap().balance)
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>> {
        Ok(self.state.lock().unwrap().receipts.get(&tx_hash).cloned())
    }
}

/// A session over a fresh key store and the given chain.
pub fn session_with(
    configure: impl FnOnce(&mut ChainState),
) -> (Arc<AgentSession>, Arc<FakeChain>, Arc<LocalKeyStore>) {
    session_with_config(test_config(), configure)
}

pub fn session_with_config(
    config: AppConfig,
    configure: impl FnOnce(&mut ChainState),
) -> (Arc<AgentSession>, Arc<FakeChain>, Arc<LocalKeyStore>) {
    let keys = Arc::new(LocalKeyStore::new());
    let chain = Arc::new(FakeChain::new(keys.clone()).with_state(configure));
    let session = Arc::new(AgentSession::new(
        keys.clone(),
        chain.clone(),
        chain.clone(),
        config,
    ));
    (session, chain, keys)
}
