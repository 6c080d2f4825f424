// src/contracts/auth_verifier.rs
//! Auth-verifier contract interface.
//!
//! The verifier maps an Ethereum address to the numeric identity id it has
//! authenticated. An unauthenticated address maps to zero.

use crate::contracts::decode;
use crate::error::{AgentError, Result};
use ethers_contract::{EthAbiCodec, EthAbiType, EthCall};
use ethers_core::abi::AbiEncode;
use ethers_core::types::{Address, Bytes, U256};

/// Auth method proving that the sender address controls an identity id.
pub const ETH_IDENTITY_AUTH_METHOD: &str = "ethIdentity";

/// `(string authMethod, bytes proof)` argument of `submitResponse`.
#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType)]
pub struct AuthResponse {
    pub auth_method: String,
    pub proof: Bytes,
}

/// `(uint256 requestId, bytes zkProof, bytes data)` query response.
/// Authentication alone submits none.
#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType)]
pub struct QueryResponse {
    pub request_id: U256,
    pub zk_proof: Bytes,
    pub data: Bytes,
}

impl AuthResponse {
    /// `ethIdentity` proof: `abi.encode(uint256 identityId)`.
    pub fn eth_identity(numeric_id: U256) -> Self {
        Self {
            auth_method: ETH_IDENTITY_AUTH_METHOD.to_string(),
            proof: numeric_id.encode().into(),
        }
    }

    /// Identity id claimed by an `ethIdentity` proof.
    pub fn eth_identity_id(&self) -> Result<U256> {
        if self.auth_method != ETH_IDENTITY_AUTH_METHOD {
            return Err(AgentError::Abi(format!(
                "auth method `{}` carries no identity id",
                self.auth_method
            )));
        }
        decode(&self.proof)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "getIdByAddress", abi = "getIdByAddress(address)")]
pub struct GetIdByAddressCall {
    pub addr: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct GetIdByAddressReturn(pub U256);

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "authMethodExists", abi = "authMethodExists(string)")]
pub struct AuthMethodExistsCall {
    pub method: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct AuthMethodExistsReturn(pub bool);

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(
    name = "submitResponse",
    abi = "submitResponse((string,bytes),(uint256,bytes,bytes)[],bytes)"
)]
pub struct SubmitResponseCall {
    pub auth_response: AuthResponse,
    pub responses: Vec<QueryResponse>,
    pub cross_chain_proofs: Bytes,
}

impl SubmitResponseCall {
    /// Authentication only: no query responses and no cross-chain proofs.
    ///
    /// # Arguments
    /// * `auth_response` - Proof that the sender controls an identity
    pub fn authenticate(auth_response: AuthResponse) -> Self {
        Self {
            auth_response,
            responses: Vec::new(),
            cross_chain_proofs: Bytes::new(),
        }
    }
}
