// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing credentials and address derivation.
//!
//! A [`Credential`] wraps a secp256k1 private key. Keys are accepted either
//! as raw hex or as PEM (SEC1 or PKCS#8), the format wallet key storage
//! writes. The derived address is always EIP-55 checksummed.

use std::fmt;

use alloy::{
    primitives::{keccak256, Address},
    signers::local::PrivateKeySigner,
};
use k256::{elliptic_curve::sec1::ToEncodedPoint, PublicKey, SecretKey};

use crate::error::{PaymentsError, PaymentsResult};

/// Holder of a private signing key.
#[derive(Clone)]
pub struct Credential {
    signer: PrivateKeySigner,
}

impl Credential {
    /// Create a credential from a hex-encoded private key (64 characters,
    /// optional `0x` prefix).
    pub fn from_hex(private_key_hex: &str) -> PaymentsResult<Self> {
        let key_bytes = alloy::hex::decode(private_key_hex.trim())
            .map_err(|e| PaymentsError::InvalidKey(e.to_string()))?;

        let signer = PrivateKeySigner::from_slice(&key_bytes)
            .map_err(|e| PaymentsError::InvalidKey(e.to_string()))?;
        Ok(Self { signer })
    }

    /// Create a credential from a PEM-encoded private key.
    pub fn from_pem(pem_bytes: &[u8]) -> PaymentsResult<Self> {
        let pem_str = std::str::from_utf8(pem_bytes)
            .map_err(|e| PaymentsError::InvalidKey(format!("Invalid UTF-8: {}", e)))?;

        let pem = pem::parse(pem_str)
            .map_err(|e| PaymentsError::InvalidKey(format!("Invalid PEM: {}", e)))?;

        let secret_key = SecretKey::from_sec1_der(pem.contents())
            .or_else(|_| parse_pkcs8_to_secret_key(pem.contents()))
            .map_err(|e| PaymentsError::InvalidKey(format!("Invalid key format: {}", e)))?;

        Ok(Self {
            signer: PrivateKeySigner::from(secret_key),
        })
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}

// Never print key material.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("address", &derive_address(self))
            .finish()
    }
}

fn parse_pkcs8_to_secret_key(der: &[u8]) -> Result<SecretKey, String> {
    use k256::pkcs8::DecodePrivateKey;
    SecretKey::from_pkcs8_der(der).map_err(|e| e.to_string())
}

/// Derive the checksummed address controlled by a credential.
///
/// keccak256 of the uncompressed public key (without the `0x04` tag), last 20
/// bytes.
pub fn derive_address(credential: &Credential) -> String {
    derive_raw_address(credential).to_checksum(None)
}

pub(crate) fn derive_raw_address(credential: &Credential) -> Address {
    let public_key = PublicKey::from(credential.signer.credential().verifying_key());
    let encoded = public_key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Parse and validate an address.
///
/// All-lowercase and all-uppercase hex is accepted as-is; mixed case must
/// carry a valid EIP-55 checksum.
pub fn parse_address(raw: &str) -> PaymentsResult<Address> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| PaymentsError::invalid_parameter(format!("invalid address: {raw}")))?;

    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(PaymentsError::invalid_parameter(format!("invalid address: {raw}")));
    }

    let has_lower = digits.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = digits.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Address::parse_checksummed(format!("0x{digits}"), None).map_err(|_| {
            PaymentsError::invalid_parameter(format!("invalid address checksum: {raw}"))
        });
    }

    digits
        .parse::<Address>()
        .map_err(|e| PaymentsError::invalid_parameter(format!("invalid address {raw}: {e}")))
}

/// Re-checksum an address. Idempotent.
pub fn checksum_address(raw: &str) -> PaymentsResult<String> {
    Ok(parse_address(raw)?.to_checksum(None))
}
