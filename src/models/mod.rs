// src/models/mod.rs
pub mod attestation;
pub mod did;
