// src/models/did.rs
//! Decentralized Identifier (DID) data model for Ethereum-controlled identities.
//!
//! An identity is derived deterministically from an Ethereum address:
//!
//! ```text
//! genesis  = [0u8; 7] || address                 (27 bytes)
//! type     = [method byte, network flag]          (2 bytes)
//! checksum = u16 sum of type || genesis, LE      (2 bytes)
//! id       = type || genesis || checksum          (31 bytes)
//! did      = did:<method>:<blockchain>:<network>:<base58(id)>
//! ```
//!
//! The numeric identifier used by on-chain registries is `id` read as a
//! little-endian unsigned integer.

use crate::error::{AgentError, Result};
use ethers_core::types::{Address, U256};
use ethers_core::utils::to_checksum;
use serde::{Deserialize, Serialize};
use std::fmt;

const ID_LEN: usize = 31;
const GENESIS_LEN: usize = 27;
const ETH_GENESIS_PREFIX: usize = 7;

/// Fragment of the single verification method in an agent's DID document.
pub const VERIFICATION_METHOD_FRAGMENT: &str = "ethereum-based-id";

const VERIFICATION_METHOD_TYPE: &str = "EcdsaSecp256k1RecoveryMethod2020";
const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DidMethod {
    Iden3,
    PolygonId,
}

impl DidMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DidMethod::Iden3 => "iden3",
            DidMethod::PolygonId => "polygonid",
        }
    }

    fn byte(&self) -> u8 {
        match self {
            DidMethod::Iden3 => 0b0000_0001,
            DidMethod::PolygonId => 0b0000_0010,
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "iden3" => Ok(DidMethod::Iden3),
            "polygonid" => Ok(DidMethod::PolygonId),
            other => Err(AgentError::InvalidDid(format!("unsupported method `{}`", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Blockchain {
    ReadOnly,
    Polygon,
    Privado,
    Billions,
}

impl Blockchain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Blockchain::ReadOnly => "readonly",
            Blockchain::Polygon => "polygon",
            Blockchain::Privado => "privado",
            Blockchain::Billions => "billions",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "readonly" => Ok(Blockchain::ReadOnly),
            "polygon" => Ok(Blockchain::Polygon),
            "privado" => Ok(Blockchain::Privado),
            "billions" => Ok(Blockchain::Billions),
            other => Err(AgentError::InvalidDid(format!("unsupported blockchain `{}`", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    Main,
    Test,
    Mumbai,
    Amoy,
    #[serde(rename = "")]
    NoNetwork,
}

impl NetworkId {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkId::Main => "main",
            NetworkId::Test => "test",
            NetworkId::Mumbai => "mumbai",
            NetworkId::Amoy => "amoy",
            NetworkId::NoNetwork => "",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "main" => Ok(NetworkId::Main),
            "test" => Ok(NetworkId::Test),
            "mumbai" => Ok(NetworkId::Mumbai),
            "amoy" => Ok(NetworkId::Amoy),
            other => Err(AgentError::InvalidDid(format!("unsupported network `{}`", other))),
        }
    }
}

fn network_flag(blockchain: Blockchain, network: NetworkId) -> Result<u8> {
    let flag = match (blockchain, network) {
        (Blockchain::ReadOnly, NetworkId::NoNetwork) => 0b0000_0000,
        (Blockchain::Polygon, NetworkId::Main) => 0b0001_0000 | 0b0000_0001,
        (Blockchain::Polygon, NetworkId::Mumbai) => 0b0001_0000 | 0b0000_0010,
        (Blockchain::Polygon, NetworkId::Amoy) => 0b0001_0000 | 0b0000_0011,
        (Blockchain::Privado, NetworkId::Main) => 0b1010_0000 | 0b0000_0001,
        (Blockchain::Privado, NetworkId::Test) => 0b1010_0000 | 0b0000_0010,
        (Blockchain::Billions, NetworkId::Main) => 0b1011_0000 | 0b0000_0001,
        (Blockchain::Billions, NetworkId::Test) => 0b1011_0000 | 0b0000_0010,
        (b, n) => {
            return Err(AgentError::InvalidDid(format!(
                "network `{}` is not defined for blockchain `{}`",
                n.as_str(),
                b.as_str()
            )))
        }
    };
    Ok(flag)
}

/// DID parameters taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DidConfig {
    pub method: DidMethod,
    pub blockchain: Blockchain,
    pub network: NetworkId,
}

impl Default for DidConfig {
    fn default() -> Self {
        Self {
            method: DidMethod::Iden3,
            blockchain: Blockchain::Billions,
            network: NetworkId::Test,
        }
    }
}

/// An agent identity bound to one Ethereum address.
///
/// Never cached across key changes; rebuild it from the active key instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub method: DidMethod,
    pub blockchain: Blockchain,
    pub network: NetworkId,
    pub eth_address: Address,
    pub numeric_id: U256,
    pub did: String,
}

impl Identity {
    /// Builds the identity for `address` under the given DID parameters.
    pub fn build(config: &DidConfig, address: Address) -> Result<Self> {
        let id = eth_identity_id(config, address)?;
        let did = format_did(config, &id);
        Ok(Self {
            method: config.method,
            blockchain: config.blockchain,
            network: config.network,
            eth_address: address,
            numeric_id: U256::from_little_endian(&id),
            did,
        })
    }

    /// Parses an Ethereum-controlled DID back into an identity.
    pub fn from_did(did: &str) -> Result<Self> {
        let parsed = ParsedDid::parse(did)?;
        let address = parsed.eth_address().ok_or_else(|| {
            AgentError::InvalidDid(format!("{} is not controlled by an Ethereum address", did))
        })?;
        Ok(Self {
            method: parsed.config.method,
            blockchain: parsed.config.blockchain,
            network: parsed.config.network,
            eth_address: address,
            numeric_id: parsed.numeric_id(),
            did: did.to_string(),
        })
    }

    pub fn checksum_address(&self) -> String {
        to_checksum(&self.eth_address, None)
    }

    /// DID document with this identity's address as the sole verification method.
    pub fn document(&self) -> DidDocument {
        DidDocument::for_ethereum_controller(&self.did, self.eth_address)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.did)
    }
}

/// Convenience wrapper around [`Identity::build`] returning only the DID string.
pub fn build_did(config: &DidConfig, address: Address) -> Result<String> {
    Ok(Identity::build(config, address)?.did)
}

/// Numeric registry identifier of any well-formed DID, Ethereum-controlled or not.
pub fn numeric_id_from_did(did: &str) -> Result<U256> {
    Ok(ParsedDid::parse(did)?.numeric_id())
}

/// Ethereum address embedded in a DID's genesis, if it has one.
pub fn eth_address_from_did(did: &str) -> Result<Option<Address>> {
    Ok(ParsedDid::parse(did)?.eth_address())
}

fn eth_identity_id(config: &DidConfig, address: Address) -> Result<[u8; ID_LEN]> {
    let typ = [config.method.byte(), network_flag(config.blockchain, config.network)?];

    let mut genesis = [0u8; GENESIS_LEN];
    genesis[ETH_GENESIS_PREFIX..].copy_from_slice(address.as_bytes());

    let mut id = [0u8; ID_LEN];
    id[..2].copy_from_slice(&typ);
    id[2..2 + GENESIS_LEN].copy_from_slice(&genesis);
    let sum = checksum(&id[..2 + GENESIS_LEN]);
    id[2 + GENESIS_LEN..].copy_from_slice(&sum);
    Ok(id)
}

fn checksum(bytes: &[u8]) -> [u8; 2] {
    let sum = bytes
        .iter()
        .fold(0u16, |acc, b| acc.wrapping_add(*b as u16));
    sum.to_le_bytes()
}

fn format_did(config: &DidConfig, id: &[u8; ID_LEN]) -> String {
    let encoded = bs58::encode(id).into_string();
    if config.blockchain == Blockchain::ReadOnly {
        format!("did:{}:{}", config.method.as_str(), encoded)
    } else {
        format!(
            "did:{}:{}:{}:{}",
            config.method.as_str(),
            config.blockchain.as_str(),
            config.network.as_str(),
            encoded
        )
    }
}

struct ParsedDid {
    config: DidConfig,
    id: [u8; ID_LEN],
}

impl ParsedDid {
    fn parse(did: &str) -> Result<Self> {
        let parts: Vec<&str> = did.split(':').collect();
        let (method, blockchain, network, encoded) = match parts.as_slice() {
            ["did", method, encoded] => (
                DidMethod::parse(method)?,
                Blockchain::ReadOnly,
                NetworkId::NoNetwork,
                *encoded,
            ),
            ["did", method, blockchain, network, encoded] => (
                DidMethod::parse(method)?,
                Blockchain::parse(blockchain)?,
                NetworkId::parse(network)?,
                *encoded,
            ),
            _ => return Err(AgentError::InvalidDid(format!("malformed DID `{}`", did))),
        };

        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| AgentError::InvalidDid(format!("invalid base58 id: {}", e)))?;
        let id: [u8; ID_LEN] = bytes.as_slice().try_into().map_err(|_| {
            AgentError::InvalidDid(format!("id must be {} bytes, got {}", ID_LEN, bytes.len()))
        })?;

        if checksum(&id[..2 + GENESIS_LEN]) != id[2 + GENESIS_LEN..] {
            return Err(AgentError::InvalidDid("id checksum mismatch".into()));
        }

        let config = DidConfig { method, blockchain, network };
        let expected_typ = [method.byte(), network_flag(blockchain, network)?];
        if id[..2] != expected_typ {
            return Err(AgentError::InvalidDid(
                "id type does not match DID method and network".into(),
            ));
        }

        Ok(Self { config, id })
    }

    fn numeric_id(&self) -> U256 {
        U256::from_little_endian(&self.id)
    }

    fn eth_address(&self) -> Option<Address> {
        let genesis = &self.id[2..2 + GENESIS_LEN];
        if genesis[..ETH_GENESIS_PREFIX].iter().all(|b| *b == 0) {
            Some(Address::from_slice(&genesis[ETH_GENESIS_PREFIX..]))
        } else {
            None
        }
    }
}

/// A DID Document whose only verification method is an Ethereum address
/// checked by public-key recovery.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    pub verification_method: Vec<VerificationMethod>,
    pub authentication: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub controller: String,
    pub ethereum_address: String,
}

impl DidDocument {
    pub fn for_ethereum_controller(did: &str, address: Address) -> Self {
        let vm_id = format!("{}#{}", did, VERIFICATION_METHOD_FRAGMENT);
        DidDocument {
            context: vec![DID_CONTEXT.to_string()],
            id: did.to_string(),
            verification_method: vec![VerificationMethod {
                id: vm_id.clone(),
                method_type: VERIFICATION_METHOD_TYPE.to_string(),
                controller: did.to_string(),
                ethereum_address: to_checksum(&address, None),
            }],
            authentication: vec![vm_id],
        }
    }

    /// Key id used in token headers signed for this document.
    pub fn signing_kid(&self) -> Option<&str> {
        self.authentication.first().map(String::as_str)
    }

    pub fn find_method(&self, kid: &str) -> Option<&VerificationMethod> {
        self.verification_method.iter().find(|vm| vm.id == kid)
    }
}

impl VerificationMethod {
    pub fn address(&self) -> Option<Address> {
        self.ethereum_address.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Address {
        "0x1f9090aaE28b8a3dCeaDf281B0F12828e676c326".parse().unwrap()
    }

    #[test]
    fn did_round_trips_through_parse() {
        let config = DidConfig::default();
        let identity = Identity::build(&config, address()).unwrap();
        assert!(identity.did.starts_with("did:iden3:billions:test:"));

        let parsed = Identity::from_did(&identity.did).unwrap();
        assert_eq!(parsed, identity);
    }

    #[test]
    fn numeric_id_is_little_endian_id() {
        let config = DidConfig::default();
        let identity = Identity::build(&config, address()).unwrap();
        let id = eth_identity_id(&config, address()).unwrap();

        // Low byte is the method byte, second byte the network flag.
        assert_eq!(identity.numeric_id.byte(0), 0x01);
        assert_eq!(identity.numeric_id.byte(1), 0xB2);
        assert_eq!(identity.numeric_id, U256::from_little_endian(&id));
        assert_eq!(numeric_id_from_did(&identity.did).unwrap(), identity.numeric_id);
    }

    #[test]
    fn build_is_deterministic_and_network_sensitive() {
        let test = DidConfig::default();
        let main = DidConfig { network: NetworkId::Main, ..test };
        assert_eq!(build_did(&test, address()).unwrap(), build_did(&test, address()).unwrap());
        assert_ne!(build_did(&test, address()).unwrap(), build_did(&main, address()).unwrap());
    }

    #[test]
    fn readonly_did_has_short_form() {
        let config = DidConfig {
            method: DidMethod::Iden3,
            blockchain: Blockchain::ReadOnly,
            network: NetworkId::NoNetwork,
        };
        let did = build_did(&config, address()).unwrap();
        assert_eq!(did.split(':').count(), 3);
        assert_eq!(eth_address_from_did(&did).unwrap(), Some(address()));
    }

    #[test]
    fn rejects_undefined_network() {
        let config = DidConfig {
            method: DidMethod::Iden3,
            blockchain: Blockchain::Billions,
            network: NetworkId::Amoy,
        };
        assert!(matches!(Identity::build(&config, address()), Err(AgentError::InvalidDid(_))));
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let config = DidConfig::default();
        let mut id = eth_identity_id(&config, address()).unwrap();
        id[30] ^= 0xff;
        let did = format_did(&config, &id);
        assert!(matches!(Identity::from_did(&did), Err(AgentError::InvalidDid(_))));
    }

    #[test]
    fn rejects_mislabelled_network() {
        let did = build_did(&DidConfig::default(), address()).unwrap();
        let relabelled = did.replace(":test:", ":main:");
        assert!(Identity::from_did(&relabelled).is_err());
    }

    #[test]
    fn document_exposes_single_method() {
        let identity = Identity::build(&DidConfig::default(), address()).unwrap();
        let doc = identity.document();
        let kid = doc.signing_kid().unwrap();
        assert_eq!(kid, format!("{}#ethereum-based-id", identity.did));
        assert_eq!(doc.find_method(kid).unwrap().address(), Some(address()));
    }

    #[test]
    fn document_serializes_checksummed_address() {
        let identity = Identity::build(&DidConfig::default(), address()).unwrap();
        let value = serde_json::to_value(identity.document()).unwrap();
        let method = &value["verificationMethod"][0];
        assert_eq!(method["type"], "EcdsaSecp256k1RecoveryMethod2020");
        assert_eq!(method["controller"], identity.did.as_str());
        assert_eq!(method["ethereumAddress"], to_checksum(&address(), None).as_str());
        assert!(method.get("blockchainAccountId").is_none());
    }
}
