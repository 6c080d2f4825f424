mod common;

use agent_did::error::AgentError;
use agent_did::services::api_server::ApiServer;
use agent_did::services::tools::{OutputPolicy, ToolRegistry};
use agent_did::services::verifier::{verify_did_proof, verify_response_artifacts};
use agent_did::utils::serialization::SIGNED_RESPONSE_TOKEN_FIELD;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::*;
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};
use tower::ServiceExt;

#[tokio::test]
async fn test_registry_lists_agent_operations() {
    let (session, _, _) = session_with(|_| {});
    let registry = ToolRegistry::for_session(session);

    let names: Vec<String> = registry.descriptors().into_iter().map(|d| d.name).collect();
    for expected in [
        "attest_ownership_to_owner",
        "create_did_auth_attestation",
        "generate_keys",
        "get_identity",
        "list_received_attestations",
        "owner_auth_token",
        "ownership_status",
        "prove_did",
        "set_ownership",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing tool {}", expected);
    }

    let prove = registry
        .descriptors()
        .into_iter()
        .find(|d| d.name == "prove_did")
        .unwrap();
    assert_eq!(prove.output_policy, OutputPolicy::Plain);
    assert_eq!(prove.input_schema["required"], json!(["challenge"]));
}

#[tokio::test]
async fn test_signed_tool_output_verifies() {
    let (session, _, _) = session_with(|_| {});
    let registry = ToolRegistry::for_session(session.clone());
    assert_ok!(registry.invoke("generate_keys", Value::Null).await);
    let identity = session.identity().await.unwrap().identity;

    let reply = assert_ok!(registry.invoke("get_identity", json!({})).await);
    let payload = reply.response.as_object().unwrap();
    let artifacts = reply.artifacts.as_deref().unwrap();

    assert_eq!(payload["did"], json!(identity.did));
    assert_eq!(payload["numericId"], json!(identity.numeric_id.to_string()));
    assert_ok!(verify_response_artifacts(
        payload,
        artifacts,
        &identity.did,
        identity.eth_address
    ));
}

#[tokio::test]
async fn test_plain_tool_output_is_unwrapped() {
    let (session, _, _) = session_with(|_| {});
    let registry = ToolRegistry::for_session(session.clone());
    registry.invoke("generate_keys", json!({})).await.unwrap();
    let identity = session.identity().await.unwrap().identity;

    let reply = assert_ok!(registry.invoke("prove_did", json!({ "challenge": 1234 })).await);
    assert!(reply.artifacts.is_none());
    let token = reply.response[SIGNED_RESPONSE_TOKEN_FIELD].as_str().unwrap();
    assert_ok!(verify_did_proof(token, &identity.did, identity.eth_address, 1234));
}

#[tokio::test]
async fn test_invalid_invocations_are_rejected() {
    let (session, _, _) = session_with(|_| {});
    let registry = ToolRegistry::for_session(session);

    let err = assert_err!(registry.invoke("transfer_funds", json!({})).await);
    assert!(matches!(err, AgentError::UnknownTool(_)));

    let err = assert_err!(
        registry
            .invoke("prove_did", json!({ "challenge": 1, "nonce": 2 }))
            .await
    );
    assert!(matches!(err, AgentError::InvalidInput(_)));

    let err = assert_err!(registry.invoke("prove_did", json!({})).await);
    assert!(matches!(err, AgentError::InvalidInput(_)));
}

async fn send(server: &ApiServer, request: Request<Body>) -> (StatusCode, Value) {
    let response = server.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_http_surface() {
    let (session, _, _) = session_with(|_| {});
    let server = ApiServer::new(ToolRegistry::for_session(session));

    let (status, body) = send(
        &server,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&server, Request::builder().uri("/tools").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().len() >= 9);

    // No key yet
    let (status, body) = send(&server, post("/tools/get_identity", json!({ "input": {} }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("no key"));

    let (status, _) = send(&server, post("/tools/generate_keys", json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&server, post("/tools/ownership_status", json!({ "input": {} }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["artifacts"].as_str().unwrap().starts_with("0x"));
    assert_eq!(body["response"]["didAuthAttestationTx"], Value::Null);

    let (status, _) = send(&server, post("/tools/unknown", json!({ "input": {} }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&server, post("/tools/prove_did", json!({ "input": { "challenge": "x" } }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
