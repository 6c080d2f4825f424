// src/utils/crypto.rs
//! Hashing and secp256k1 helpers shared by the key store and the verifier.
//!
//! Keccak-256 is used for Ethereum address derivation, SHA-256 for the
//! `ES256K-R` signing input.

use ethers_core::types::Address;
use ethers_core::utils::keccak256;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use sha2::{Digest, Sha256};

/// Computes a Keccak-256 hash of the input data (Ethereum-compatible).
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}

/// SHA-256 digest used as the prehash for `ES256K-R` signatures.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Derives the Ethereum address for a secp256k1 public key.
///
/// The address is the last 20 bytes of the Keccak-256 hash of the
/// uncompressed point, without its `0x04` tag byte.
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = PublicKey::from(key).to_encoded_point(false);
    let hash = hash_data(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Same as [`address_from_verifying_key`] for SEC1-encoded key bytes
/// (compressed or uncompressed).
pub fn address_from_public_key(sec1: &[u8]) -> Result<Address, String> {
    let key = VerifyingKey::from_sec1_bytes(sec1).map_err(|e| e.to_string())?;
    Ok(address_from_verifying_key(&key))
}

/// Recovers the signer address from a 65-byte `r || s || v` signature over
/// `prehash`. Accepts `v` as 0/1 or the legacy 27/28.
pub fn recover_address(prehash: &[u8; 32], signature: &[u8]) -> Result<Address, String> {
    if signature.len() != 65 {
        return Err(format!(
            "recoverable signature must be 65 bytes, got {}",
            signature.len()
        ));
    }

    let sig = Signature::from_slice(&signature[..64]).map_err(|e| e.to_string())?;
    let v = match signature[64] {
        27 | 28 => signature[64] - 27,
        v => v,
    };
    let recovery_id =
        RecoveryId::from_byte(v).ok_or_else(|| format!("invalid recovery id {}", v))?;

    let key = VerifyingKey::recover_from_prehash(prehash, &sig, recovery_id)
        .map_err(|e| e.to_string())?;
    Ok(address_from_verifying_key(&key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    fn test_key() -> SigningKey {
        SigningKey::from_slice(&[7u8; 32]).unwrap()
    }

    #[test]
    fn recovers_signer_address() {
        let key = test_key();
        let digest = sha256(b"hello");
        let (sig, recid) = key.sign_prehash_recoverable(&digest).unwrap();

        let mut bytes = sig.to_vec();
        bytes.push(recid.to_byte());

        let expected = address_from_verifying_key(key.verifying_key());
        assert_eq!(recover_address(&digest, &bytes).unwrap(), expected);

        bytes[64] += 27;
        assert_eq!(recover_address(&digest, &bytes).unwrap(), expected);
    }

    #[test]
    fn compressed_and_uncompressed_keys_share_an_address() {
        let key = test_key();
        let vk = key.verifying_key();
        let compressed = vk.to_encoded_point(true);
        let uncompressed = vk.to_encoded_point(false);
        assert_eq!(
            address_from_public_key(compressed.as_bytes()).unwrap(),
            address_from_public_key(uncompressed.as_bytes()).unwrap()
        );
    }

    #[test]
    fn rejects_short_signature() {
        assert!(recover_address(&[0u8; 32], &[0u8; 64]).is_err());
    }
}
