// src/wallet/identity.rs
//! Resolution of the active agent identity from the key store.

use crate::blockchain::WalletAdapter;
use crate::error::{AgentError, Result};
use crate::models::did::{DidConfig, Identity};
use crate::wallet::key_management::{KeyRef, KeyStore, KeyType};
use log::info;
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::Mutex;

/// The active key and the identity derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub key: KeyRef,
    pub identity: Identity,
}

/// Resolves the identity of the most recently created key of `key_type`.
///
/// # Errors
/// [`AgentError::NoKeyFound`] if the store holds no key of that type.
pub async fn resolve(
    store: &dyn KeyStore,
    key_type: KeyType,
    config: &DidConfig,
    wallet: &dyn WalletAdapter,
) -> Result<ResolvedIdentity> {
    let key = store
        .list_keys(key_type)
        .await?
        .pop()
        .ok_or_else(|| AgentError::NoKeyFound(key_type.to_string()))?;

    let address = wallet.address_for_key(&key).await?;
    let identity = Identity::build(config, address)?;
    Ok(ResolvedIdentity { key, identity })
}

/// Outcome of [`KeyGenerator::ensure_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyGeneration {
    Created(KeyRef),
    Existing(KeyRef),
}

impl KeyGeneration {
    pub fn key(&self) -> &KeyRef {
        match self {
            KeyGeneration::Created(key) | KeyGeneration::Existing(key) => key,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, KeyGeneration::Created(_))
    }
}

/// Serializes the "reuse the last key, else create one" sequence.
///
/// Share one generator between every caller of the same key store; two
/// unguarded callers against an empty store would each create a key.
#[derive(Default)]
pub struct KeyGenerator {
    lock: Mutex<()>,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ensure_key(&self, store: &dyn KeyStore, key_type: KeyType) -> Result<KeyGeneration> {
        let _guard = self.lock.lock().await;

        if let Some(existing) = store.list_keys(key_type).await?.pop() {
            return Ok(KeyGeneration::Existing(existing));
        }

        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let key = store.create_key_from_seed(key_type, &seed).await?;
        info!("Created {} key {}", key_type, key.key_id);
        Ok(KeyGeneration::Created(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::key_management::LocalKeyStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn ensure_key_reuses_last_key() {
        let store = LocalKeyStore::new();
        let generator = KeyGenerator::new();

        let first = generator.ensure_key(&store, KeyType::Secp256k1).await.unwrap();
        assert!(first.is_new());

        let second = generator.ensure_key(&store, KeyType::Secp256k1).await.unwrap();
        assert_eq!(second, KeyGeneration::Existing(first.key().clone()));
    }

    #[tokio::test]
    async fn concurrent_callers_create_a_single_key() {
        let store = Arc::new(LocalKeyStore::new());
        let generator = Arc::new(KeyGenerator::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let generator = generator.clone();
            handles.push(tokio::spawn(async move {
                generator.ensure_key(store.as_ref(), KeyType::Secp256k1).await.unwrap()
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_new() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.list_keys(KeyType::Secp256k1).await.unwrap().len(), 1);
    }
}
