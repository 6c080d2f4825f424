// src/wallet/key_management.rs
//! Key management for the agent wallet.
//!
//! [`KeyStore`] is the seam to any key management service: callers only hold
//! opaque [`KeyRef`] handles and never see private key bytes. [`LocalKeyStore`]
//! is the in-process implementation backed by `k256`.

use crate::error::{AgentError, Result};
use crate::utils::crypto::{hash_data, sha256};
use async_trait::async_trait;
use ethers_core::utils::hex;
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    Secp256k1,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Secp256k1 => f.write_str("Secp256k1"),
        }
    }
}

/// Opaque handle to a key held by a [`KeyStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRef {
    /// Hex-encoded compressed public key.
    pub key_id: String,
    pub key_type: KeyType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// secp256k1 over SHA-256 with a trailing recovery byte: `r || s || v`.
    Es256kR,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Es256kR => "ES256K-R",
        }
    }
}

#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Keys of `key_type` in creation order.
    async fn list_keys(&self, key_type: KeyType) -> Result<Vec<KeyRef>>;

    async fn create_key_from_seed(&self, key_type: KeyType, seed: &[u8]) -> Result<KeyRef>;

    /// SEC1 compressed public key bytes.
    async fn public_key(&self, key: &KeyRef) -> Result<Vec<u8>>;

    async fn sign(&self, key: &KeyRef, data: &[u8], algorithm: SignatureAlgorithm)
        -> Result<Vec<u8>>;
}

/// In-memory secp256k1 key store.
#[derive(Default)]
pub struct LocalKeyStore {
    keys: Mutex<Vec<(KeyRef, SigningKey)>>,
}

impl LocalKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Imports a hex-encoded private key (with or without `0x`).
    pub fn import_private_key(&self, private_key: &str) -> Result<KeyRef> {
        let bytes = hex::decode(private_key.trim_start_matches("0x"))
            .map_err(|e| AgentError::InvalidInput(format!("invalid private key hex: {}", e)))?;
        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|e| AgentError::InvalidInput(format!("invalid private key: {}", e)))?;
        self.insert(signing_key)
    }

    /// Raw signing key for `key`, for signers that need the key material
    /// in-process (the local transaction signer).
    pub(crate) fn signing_key(&self, key: &KeyRef) -> Result<SigningKey> {
        self.lock()?
            .iter()
            .find(|(r, _)| r == key)
            .map(|(_, k)| k.clone())
            .ok_or_else(|| AgentError::SigningFailure(format!("unknown key {}", key.key_id)))
    }

    fn insert(&self, signing_key: SigningKey) -> Result<KeyRef> {
        let key_ref = KeyRef {
            key_id: hex::encode(signing_key.verifying_key().to_encoded_point(true).as_bytes()),
            key_type: KeyType::Secp256k1,
        };

        let mut keys = self.lock()?;
        if !keys.iter().any(|(r, _)| r == &key_ref) {
            keys.push((key_ref.clone(), signing_key));
        }
        Ok(key_ref)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<(KeyRef, SigningKey)>>> {
        self.keys
            .lock()
            .map_err(|_| AgentError::LockPoisoned("key store"))
    }
}

#[async_trait]
impl KeyStore for LocalKeyStore {
    async fn list_keys(&self, key_type: KeyType) -> Result<Vec<KeyRef>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|(r, _)| r.key_type == key_type)
            .map(|(r, _)| r.clone())
            .collect())
    }

    /// The secret is the Keccak-256 hash of `seed`, so any seed length works.
    async fn create_key_from_seed(&self, key_type: KeyType, seed: &[u8]) -> Result<KeyRef> {
        match key_type {
            KeyType::Secp256k1 => {
                let signing_key = SigningKey::from_slice(&hash_data(seed))
                    .map_err(|e| AgentError::SigningFailure(e.to_string()))?;
                self.insert(signing_key)
            }
        }
    }

    async fn public_key(&self, key: &KeyRef) -> Result<Vec<u8>> {
        let signing_key = self.signing_key(key)?;
        Ok(signing_key.verifying_key().to_encoded_point(true).as_bytes().to_vec())
    }

    async fn sign(
        &self,
        key: &KeyRef,
        data: &[u8],
        algorithm: SignatureAlgorithm,
    ) -> Result<Vec<u8>> {
        let signing_key = self.signing_key(key)?;
        match algorithm {
            SignatureAlgorithm::Es256kR => {
                let digest = sha256(data);
                let (signature, recovery_id) = signing_key
                    .sign_prehash_recoverable(&digest)
                    .map_err(|e| AgentError::SigningFailure(e.to_string()))?;

                let mut out = signature.to_vec();
                out.push(recovery_id.to_byte());
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::{address_from_public_key, recover_address};

    #[tokio::test]
    async fn keys_are_listed_in_creation_order() {
        let store = LocalKeyStore::new();
        assert!(store.list_keys(KeyType::Secp256k1).await.unwrap().is_empty());

        let first = store.create_key_from_seed(KeyType::Secp256k1, b"one").await.unwrap();
        let second = store.create_key_from_seed(KeyType::Secp256k1, b"two").await.unwrap();

        let keys = store.list_keys(KeyType::Secp256k1).await.unwrap();
        assert_eq!(keys, vec![first, second]);
    }

    #[tokio::test]
    async fn same_seed_yields_same_key() {
        let store = LocalKeyStore::new();
        let a = store.create_key_from_seed(KeyType::Secp256k1, b"seed").await.unwrap();
        let b = store.create_key_from_seed(KeyType::Secp256k1, b"seed").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.list_keys(KeyType::Secp256k1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn signature_recovers_to_key_address() {
        let store = LocalKeyStore::new();
        let key = store.create_key_from_seed(KeyType::Secp256k1, b"seed").await.unwrap();

        let sig = store.sign(&key, b"payload", SignatureAlgorithm::Es256kR).await.unwrap();
        assert_eq!(sig.len(), 65);

        let public = store.public_key(&key).await.unwrap();
        let expected = address_from_public_key(&public).unwrap();
        assert_eq!(recover_address(&sha256(b"payload"), &sig).unwrap(), expected);
    }

    #[tokio::test]
    async fn unknown_key_is_a_signing_failure() {
        let store = LocalKeyStore::new();
        let key = KeyRef { key_id: "00".into(), key_type: KeyType::Secp256k1 };
        let err = store.sign(&key, b"x", SignatureAlgorithm::Es256kR).await.unwrap_err();
        assert!(matches!(err, AgentError::SigningFailure(_)));
    }

    #[tokio::test]
    async fn poisoned_store_is_not_a_signing_failure() {
        let store = std::sync::Arc::new(LocalKeyStore::new());
        let holder = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.keys.lock().unwrap();
            panic!("holder panicked");
        })
        .join();

        let err = store.list_keys(KeyType::Secp256k1).await.unwrap_err();
        assert!(matches!(err, AgentError::LockPoisoned("key store")));
    }

    #[test]
    fn imports_hex_private_key() {
        let store = LocalKeyStore::new();
        let key = store
            .import_private_key("0x0101010101010101010101010101010101010101010101010101010101010101")
            .unwrap();
        assert_eq!(key.key_id.len(), 66);
        assert!(store.import_private_key("zz").is_err());
    }
}
