// src/services/mod.rs
pub mod agent;
pub mod api_server;
pub mod attestation;
pub mod tools;
pub mod verifier;
