// src/main.rs

//! # Agent DID - Main Entry Point
//!
//! Loads configuration, connects to the chain and serves the agent tools
//! over HTTP.
//!
//! ## Configuration
//! Read from an optional `agent.toml` and `AGENT__*` environment variables
//! (see [`agent_did::config`]). Commonly set:
//! - `AGENT__RPC_URL`: JSON-RPC endpoint
//! - `AGENT__PRIVATE_KEY`: agent key to import instead of generating one
//! - `AGENT__REGISTRY__ATTESTATION_REGISTRY`, `AGENT__REGISTRY__AUTH_VERIFIER`
//! - `AGENT__OWNER_DID`

use agent_did::blockchain::evm_client::EvmClient;
use agent_did::config::AppConfig;
use agent_did::services::agent::AgentSession;
use agent_did::services::api_server::ApiServer;
use agent_did::services::tools::ToolRegistry;
use agent_did::wallet::key_management::LocalKeyStore;
use anyhow::Context;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = AppConfig::load().context("failed to load configuration")?;

    let keys = Arc::new(LocalKeyStore::new());
    if let Some(private_key) = &config.private_key {
        let key = keys
            .import_private_key(private_key)
            .context("failed to import AGENT__PRIVATE_KEY")?;
        info!("Imported agent key {}", key.key_id);
    }

    let client = match config.chain_id {
        Some(chain_id) => EvmClient::with_chain_id(&config.rpc_url, chain_id, keys.clone()),
        None => EvmClient::connect(&config.rpc_url, keys.clone()).await,
    }
    .with_context(|| format!("failed to connect to {}", config.rpc_url))?;
    let client = Arc::new(client);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;

    let session = Arc::new(AgentSession::new(keys, client.clone(), client, config));
    let tools = ToolRegistry::for_session(session);
    info!("Registered tools: {:?}", tools.descriptors().iter().map(|t| &t.name).collect::<Vec<_>>());

    ApiServer::new(tools).run(addr).await?;
    Ok(())
}
