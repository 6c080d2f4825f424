// src/blockchain/evm_client.rs
//! EVM JSON-RPC client.
//!
//! Implements [`WalletAdapter`] and [`ChainReader`] over an `ethers` HTTP
//! provider. Transactions are signed locally with keys held by a
//! [`LocalKeyStore`].

use crate::blockchain::{ChainReader, FeeData, WalletAdapter};
use crate::error::{AgentError, Result};
use crate::wallet::key_management::{KeyRef, LocalKeyStore};
use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers_core::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, TransactionReceipt,
    TransactionRequest, H256, U256,
};
use log::{debug, info};
use std::sync::Arc;

/// Client for an EVM chain reachable over HTTP JSON-RPC.
#[derive(Clone)]
pub struct EvmClient {
    provider: Provider<Http>,
    chain_id: u64,
    keys: Arc<LocalKeyStore>,
}

impl EvmClient {
    /// Connects to `rpc_url` and reads the chain id from the node.
    ///
    /// # Errors
    /// Returns [`AgentError::Rpc`] if the URL is invalid or the node is unreachable.
    pub async fn connect(rpc_url: &str, keys: Arc<LocalKeyStore>) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url).map_err(AgentError::rpc)?;
        let chain_id = provider.get_chainid().await.map_err(AgentError::rpc)?.as_u64();
        info!("Connected to {} (chain id {})", rpc_url, chain_id);
        Ok(Self { provider, chain_id, keys })
    }

    /// Builds a client for a known chain id without contacting the node.
    pub fn with_chain_id(rpc_url: &str, chain_id: u64, keys: Arc<LocalKeyStore>) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url).map_err(AgentError::rpc)?;
        Ok(Self { provider, chain_id, keys })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn wallet(&self, key: &KeyRef) -> Result<LocalWallet> {
        let signing_key = self.keys.signing_key(key)?;
        Ok(LocalWallet::from(signing_key).with_chain_id(self.chain_id))
    }
}

#[async_trait]
impl WalletAdapter for EvmClient {
    async fn address_for_key(&self, key: &KeyRef) -> Result<Address> {
        Ok(self.wallet(key)?.address())
    }

    async fn send_transaction(
        &self,
        key: &KeyRef,
        request: TypedTransaction,
    ) -> Result<Option<TransactionReceipt>> {
        let wallet = self.wallet(key)?;
        let client = SignerMiddleware::new(self.provider.clone(), wallet);

        let pending = client
            .send_transaction(request, None)
            .await
            .map_err(AgentError::rpc)?;
        info!("Submitted transaction {:?}", pending.tx_hash());

        pending.await.map_err(AgentError::rpc)
    }

    async fn estimate_gas(&self, key: &KeyRef, request: &TypedTransaction) -> Result<U256> {
        let mut request = request.clone();
        request.set_from(self.address_for_key(key).await?);
        self.provider
            .estimate_gas(&request, None)
            .await
            .map_err(AgentError::rpc)
    }
}

#[async_trait]
impl ChainReader for EvmClient {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        debug!("eth_call to {:?} ({} bytes)", to, data.len());
        let request: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.provider
            .call(&request, None)
            .await
            .map_err(AgentError::rpc)
    }

    async fn fee_data(&self) -> Result<FeeData> {
        let (max_fee_per_gas, max_priority_fee_per_gas) = self
            .provider
            .estimate_eip1559_fees(None)
            .await
            .map_err(AgentError::rpc)?;
        Ok(FeeData { max_fee_per_gas, max_priority_fee_per_gas })
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(AgentError::rpc)
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(AgentError::rpc)
    }
}
