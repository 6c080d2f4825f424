// src/config.rs
//! Runtime configuration.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults
//! 2. optional `agent.toml` in the working directory
//! 3. `AGENT__*` environment variables (a `.env` file is loaded first),
//!    nested with `__`, e.g. `AGENT__REGISTRY__AUTH_VERIFIER=0x...`

use crate::error::{AgentError, Result};
use crate::models::did::DidConfig;
use config::{Config, Environment, File};
use ethers_core::types::{Address, H256, U256};
use serde::Deserialize;

const CONFIG_FILE: &str = "agent";
const ENV_PREFIX: &str = "AGENT";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Read from the node when absent.
    #[serde(default)]
    pub chain_id: Option<u64>,
    /// Hex private key imported into the local key store at startup.
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub did: DidConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub fees: FeeOverrides,
    /// DID of the human or organisation owning this agent.
    #[serde(default)]
    pub owner_did: Option<String>,
    /// Minimum agent balance, in wei, required before submitting an attestation.
    #[serde(default = "default_min_balance_wei")]
    pub min_balance_wei: u64,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_rpc_url() -> String {
    "http://localhost:8545".to_string()
}

fn default_min_balance_wei() -> u64 {
    // 0.001 ETH
    1_000_000_000_000_000
}

/// Contract addresses and schema ids. All optional so that identity-only
/// operations work without any chain configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    pub attestation_registry: Option<Address>,
    pub auth_verifier: Option<Address>,
    pub did_auth_schema_id: Option<H256>,
    pub ownership_schema_id: Option<H256>,
}

impl RegistryConfig {
    pub fn attestation_registry(&self) -> Result<Address> {
        self.attestation_registry
            .ok_or(AgentError::MissingBlockchainConfig("registry.attestation_registry"))
    }

    pub fn auth_verifier(&self) -> Result<Address> {
        self.auth_verifier
            .ok_or(AgentError::MissingBlockchainConfig("registry.auth_verifier"))
    }

    pub fn did_auth_schema_id(&self) -> Result<H256> {
        self.did_auth_schema_id
            .ok_or(AgentError::MissingBlockchainConfig("registry.did_auth_schema_id"))
    }

    pub fn ownership_schema_id(&self) -> Result<H256> {
        self.ownership_schema_id
            .ok_or(AgentError::MissingBlockchainConfig("registry.ownership_schema_id"))
    }
}

/// Explicit EIP-1559 fee settings in wei. Unset values come from the network.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FeeOverrides {
    pub max_fee_per_gas: Option<u64>,
    pub max_priority_fee_per_gas: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

impl AppConfig {
    /// Loads `.env`, `agent.toml` and the environment.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let config = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        Ok(config.try_deserialize()?)
    }

    pub fn min_balance(&self) -> U256 {
        U256::from(self.min_balance_wei)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: None,
            private_key: None,
            did: DidConfig::default(),
            registry: RegistryConfig::default(),
            fees: FeeOverrides::default(),
            owner_did: None,
            min_balance_wei: default_min_balance_wei(),
            server: ServerConfig::default(),
        }
    }
}
