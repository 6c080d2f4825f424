// src/blockchain/mod.rs
//! Blockchain collaborators.
//!
//! The attestation pipeline only talks to the chain through these two traits,
//! so it can run against a live RPC node ([`evm_client::EvmClient`]) or an
//! in-memory chain in tests.

pub mod evm_client;

use crate::error::Result;
use crate::wallet::key_management::KeyRef;
use async_trait::async_trait;
use ethers_core::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, TransactionReceipt, H256, U256,
};

/// Current EIP-1559 fee suggestion from the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeData {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Signs and submits transactions on behalf of a key.
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    async fn address_for_key(&self, key: &KeyRef) -> Result<Address>;

    /// Signs, submits and waits for inclusion. `None` when the node dropped
    /// the transaction without a receipt.
    async fn send_transaction(
        &self,
        key: &KeyRef,
        request: TypedTransaction,
    ) -> Result<Option<TransactionReceipt>>;

    async fn estimate_gas(&self, key: &KeyRef, request: &TypedTransaction) -> Result<U256>;
}

/// Read-only chain access.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// `eth_call` against `to` with raw calldata.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;

    async fn fee_data(&self) -> Result<FeeData>;

    async fn balance(&self, address: Address) -> Result<U256>;

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>>;
}
