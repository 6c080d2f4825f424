// src/contracts/mod.rs
//! Typed interfaces for the registry contracts.
//!
//! Every function is bound as an `ethers-contract` call struct and every
//! return value as a codec struct, the same shapes `abigen!` emits. The
//! structs encode calldata for the attestation client and decode it again in
//! test chains, so both sides share one definition of each contract.

pub mod attestation_registry;
pub mod auth_verifier;

use crate::error::{AgentError, Result};
use ethers_core::abi::{AbiDecode, AbiEncode};
use ethers_core::types::Bytes;

/// Calldata for `call`: its four-byte selector followed by the ABI-encoded
/// arguments.
///
/// # Arguments
/// * `call` - Any derived call struct, e.g. [`auth_verifier::GetIdByAddressCall`]
pub fn calldata<C: AbiEncode>(call: C) -> Bytes {
    call.encode().into()
}

/// Decodes ABI data into `T`.
///
/// For call structs the selector is checked first, so this also tells which
/// function a piece of calldata targets.
///
/// # Returns
/// The decoded value, or [`AgentError::Abi`] when the data does not match
/// `T`'s layout.
pub fn decode<T: AbiDecode>(data: impl AsRef<[u8]>) -> Result<T> {
    T::decode(data).map_err(AgentError::abi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::auth_verifier::{AuthMethodExistsCall, GetIdByAddressCall};
    use ethers_contract::EthCall;
    use ethers_core::types::Address;

    #[test]
    fn calldata_starts_with_selector() {
        let data = calldata(GetIdByAddressCall { addr: Address::repeat_byte(0x11) });
        assert_eq!(&data[..4], &GetIdByAddressCall::selector());
        assert_eq!(data.len(), 4 + 32);

        let call: GetIdByAddressCall = decode(&data).unwrap();
        assert_eq!(call.addr, Address::repeat_byte(0x11));
    }

    #[test]
    fn decode_rejects_other_function() {
        let data = calldata(AuthMethodExistsCall { method: "ethIdentity".into() });
        assert!(matches!(decode::<GetIdByAddressCall>(&data), Err(AgentError::Abi(_))));
        assert!(matches!(decode::<GetIdByAddressCall>(&data[..2]), Err(AgentError::Abi(_))));
    }
}
