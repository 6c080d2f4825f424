// src/services/tools.rs
//! Named, schema-described operations callable by an external agent loop.
//!
//! Each tool is registered explicitly with its input schema, a typed handler
//! and an output policy. Inputs are validated by deserializing into the
//! handler's input type; unknown fields are rejected.

use crate::error::{AgentError, Result};
use crate::services::agent::{AgentSession, SignedResponse};
use ethers_core::types::H256;
use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

const DEFAULT_PAGE_SIZE: u64 = 20;

/// How a tool's output reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputPolicy {
    /// Returned as produced.
    Plain,
    /// Wrapped by [`AgentSession::sign_response`].
    SignedArtifacts,
}

/// What a handler produces: a human-readable message plus structured fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub message: String,
    pub fields: Map<String, Value>,
}

impl ToolOutput {
    pub fn new(message: impl Into<String>, fields: Value) -> Self {
        let fields = match fields {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("result".into(), other);
                map
            }
        };
        Self { message: message.into(), fields }
    }

    /// Output that is already a signed payload.
    pub fn signed(signed: SignedResponse) -> Self {
        let message = signed
            .payload
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self { message, fields: signed.payload }
    }
}

/// Reply to a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolReply {
    pub response: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_policy: OutputPolicy,
}

type Handler = Arc<dyn Fn(Arc<AgentSession>, Value) -> BoxFuture<'static, Result<ToolOutput>> + Send + Sync>;

struct Tool {
    description: String,
    input_schema: Value,
    output_policy: OutputPolicy,
    handler: Handler,
}

pub struct ToolRegistry {
    session: Arc<AgentSession>,
    tools: BTreeMap<String, Tool>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoInput {}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ProveDidInput {
    challenge: i64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct SetOwnershipInput {
    tx_hash: H256,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct ListAttestationsInput {
    #[serde(default = "default_page_size")]
    page_size: u64,
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {}, "additionalProperties": false })
}

impl ToolRegistry {
    pub fn new(session: Arc<AgentSession>) -> Self {
        Self { session, tools: BTreeMap::new() }
    }

    /// Registry with every agent operation.
    pub fn for_session(session: Arc<AgentSession>) -> Self {
        let mut registry = Self::new(session);

        registry.register(
            "generate_keys",
            "Create the agent key pair if none exists and return the agent DID",
            empty_schema(),
            OutputPolicy::SignedArtifacts,
            |session, _: NoInput| async move {
                let generation = session.generate_keys().await?;
                let identity = session.identity().await?.identity;
                let message = if generation.is_new() {
                    format!("Created a new key pair for {}", identity.did)
                } else {
                    format!("Using the existing key pair for {}", identity.did)
                };
                Ok::<_, AgentError>(ToolOutput::new(message, json!({ "created": generation.is_new() })))
            },
        );

        registry.register(
            "get_identity",
            "Return the agent DID, Ethereum address and DID document",
            empty_schema(),
            OutputPolicy::SignedArtifacts,
            |session, _: NoInput| async move {
                let identity = session.identity().await?.identity;
                Ok::<_, AgentError>(ToolOutput::new(
                    format!("Agent identity is {}", identity.did),
                    json!({
                        "numericId": identity.numeric_id.to_string(),
                        "didDocument": identity.document(),
                    }),
                ))
            },
        );

        registry.register(
            "prove_did",
            "Sign a verifier challenge to prove control of the agent DID",
            json!({
                "type": "object",
                "properties": { "challenge": { "type": "integer" } },
                "required": ["challenge"],
                "additionalProperties": false
            }),
            OutputPolicy::Plain,
            |session, input: ProveDidInput| async move {
                Ok::<_, AgentError>(ToolOutput::signed(session.prove_did(input.challenge).await?))
            },
        );

        registry.register(
            "owner_auth_token",
            "Issue a short-lived authentication token for the agent owner",
            empty_schema(),
            OutputPolicy::Plain,
            |session, _: NoInput| async move {
                Ok::<_, AgentError>(ToolOutput::signed(session.owner_auth_token().await?))
            },
        );

        registry.register(
            "create_did_auth_attestation",
            "Authenticate the agent on chain and record its DID-auth attestation",
            empty_schema(),
            OutputPolicy::SignedArtifacts,
            |session, _: NoInput| async move {
                let outcome = session.create_did_auth_attestation().await?;
                Ok::<_, AgentError>(ToolOutput::new(
                    format!("DID-auth attestation in transaction {:?}", outcome.tx_hash()),
                    serde_json::to_value(outcome)?,
                ))
            },
        );

        registry.register(
            "attest_ownership_to_owner",
            "Record that the agent is owned by the configured owner",
            empty_schema(),
            OutputPolicy::SignedArtifacts,
            |session, _: NoInput| async move {
                let outcome = session.attest_ownership_to_owner().await?;
                Ok::<_, AgentError>(ToolOutput::new(
                    format!("Ownership attestation in transaction {:?}", outcome.tx_hash()),
                    serde_json::to_value(outcome)?,
                ))
            },
        );

        registry.register(
            "set_ownership",
            "Accept the owner's attestation of this agent from its transaction hash",
            json!({
                "type": "object",
                "properties": { "txHash": { "type": "string", "pattern": "^0x[0-9a-fA-F]{64}$" } },
                "required": ["txHash"],
                "additionalProperties": false
            }),
            OutputPolicy::SignedArtifacts,
            |session, input: SetOwnershipInput| async move {
                let outcome = session.set_ownership(input.tx_hash).await?;
                Ok::<_, AgentError>(ToolOutput::new(
                    format!("Ownership accepted from transaction {:?}", outcome.tx_hash()),
                    serde_json::to_value(outcome)?,
                ))
            },
        );

        registry.register(
            "ownership_status",
            "Report which ownership steps have completed",
            empty_schema(),
            OutputPolicy::SignedArtifacts,
            |session, _: NoInput| async move {
                let state = session.ownership_status()?;
                Ok::<_, AgentError>(ToolOutput::new("Ownership status", serde_json::to_value(state)?))
            },
        );

        registry.register(
            "list_received_attestations",
            "List attestations naming this agent as recipient",
            json!({
                "type": "object",
                "properties": { "pageSize": { "type": "integer", "minimum": 1 } },
                "additionalProperties": false
            }),
            OutputPolicy::SignedArtifacts,
            |session, input: ListAttestationsInput| async move {
                let attestations = session.list_received_attestations(input.page_size).await?;
                Ok::<_, AgentError>(ToolOutput::new(
                    format!("{} attestations received", attestations.len()),
                    json!({ "attestations": attestations }),
                ))
            },
        );

        registry
    }

    /// Adds or replaces a tool.
    pub fn register<I, F, Fut>(
        &mut self,
        name: &str,
        description: &str,
        input_schema: Value,
        output_policy: OutputPolicy,
        handler: F,
    ) where
        I: DeserializeOwned + Send + 'static,
        F: Fn(Arc<AgentSession>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |session, input| match serde_json::from_value::<I>(input) {
            Ok(input) => handler(session, input).boxed(),
            Err(e) => future::ready(Err(AgentError::InvalidInput(e.to_string()))).boxed(),
        });
        self.tools.insert(
            name.to_string(),
            Tool {
                description: description.to_string(),
                input_schema,
                output_policy,
                handler,
            },
        );
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|(name, tool)| ToolDescriptor {
                name: name.clone(),
                description: tool.description.clone(),
                input_schema: tool.input_schema.clone(),
                output_policy: tool.output_policy,
            })
            .collect()
    }

    /// Runs `name` with `input`. A missing input is treated as `{}`.
    pub async fn invoke(&self, name: &str, input: Value) -> Result<ToolReply> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;
        let input = match input {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        let output = (tool.handler)(self.session.clone(), input).await?;
        match tool.output_policy {
            OutputPolicy::Plain => Ok(ToolReply {
                response: Value::Object(plain_payload(output)),
                artifacts: None,
            }),
            OutputPolicy::SignedArtifacts => {
                let signed = self.session.sign_response(&output.message, output.fields).await?;
                Ok(ToolReply {
                    response: Value::Object(signed.payload),
                    artifacts: signed.artifacts,
                })
            }
        }
    }
}

fn plain_payload(output: ToolOutput) -> Map<String, Value> {
    if output.fields.contains_key("response") {
        return output.fields;
    }
    let mut payload = Map::new();
    payload.insert("response".into(), Value::String(output.message));
    payload.extend(output.fields);
    payload
}
