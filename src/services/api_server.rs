// src/services/api_server.rs
//! HTTP interface to the tool registry.
//!
//! Endpoints:
//! - `GET /health`
//! - `GET /tools` lists registered tools with their input schemas
//! - `POST /tools/:name` runs a tool; body `{"input": {...}}`, reply
//!   `{"response": {...}, "artifacts": "0x..."}`
//!
//! Errors are returned as `{"error": "..."}` with a status code derived from
//! [`AgentError`](crate::error::AgentError).

use crate::error::Result;
use crate::services::tools::{ToolDescriptor, ToolRegistry, ToolReply};
use axum::{
    extract::{Json, Path, State},
    routing::{get, post},
    Router,
};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;

/// Request body for a tool invocation.
#[derive(Serialize, Deserialize)]
struct InvokeToolRequest {
    #[serde(default)]
    input: Value,
}

#[derive(Serialize, Deserialize)]
struct HealthResponse {
    status: String,
}

/// API server state
#[derive(Clone)]
pub struct ApiServer {
    tools: Arc<ToolRegistry>,
}

impl ApiServer {
    pub fn new(tools: ToolRegistry) -> Self {
        ApiServer { tools: Arc::new(tools) }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(Self::health_handler))
            .route("/tools", get(Self::list_tools_handler))
            .route("/tools/:name", post(Self::invoke_tool_handler))
            .with_state(Arc::new(self.clone()))
    }

    /// Starts the API server and serves until the listener fails.
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:3000")
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Listening on {}", addr);
        axum::serve(listener, self.router()).await
    }

    async fn health_handler() -> Json<HealthResponse> {
        Json(HealthResponse { status: "ok".into() })
    }

    /// # Endpoint
    /// GET /tools
    async fn list_tools_handler(State(state): State<Arc<ApiServer>>) -> Json<Vec<ToolDescriptor>> {
        Json(state.tools.descriptors())
    }

    /// Runs a registered tool
    ///
    /// # Endpoint
    /// POST /tools/:name
    ///
    /// # Responses
    /// - 200 OK: tool reply, with `artifacts` for signed outputs
    /// - 400 Bad Request: input rejected by the tool's input type
    /// - 404 Not Found: no tool with that name
    /// - other codes per error kind
    async fn invoke_tool_handler(
        State(state): State<Arc<ApiServer>>,
        Path(name): Path<String>,
        Json(payload): Json<InvokeToolRequest>,
    ) -> Result<Json<ToolReply>> {
        info!("Invoking tool {}", name);
        let reply = state.tools.invoke(&name, payload.input).await?;
        Ok(Json(reply))
    }
}
