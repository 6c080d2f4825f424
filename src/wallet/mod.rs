// src/wallet/mod.rs
pub mod identity;
pub mod jws;
pub mod key_management;
pub mod ownership_state;
