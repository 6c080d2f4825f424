// src/utils/mod.rs
pub mod challenge;
pub mod crypto;
pub mod serialization;
