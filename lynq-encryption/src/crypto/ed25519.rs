// SPDX-License-Identifier: MIT OR Apache-2.0

//! Edwards-Curve Digital Signature Algorithm (EdDSA) related to Curve25519 using SHA-512.
//!
//! The identity signing key is only used to cross-sign the X25519 keys of a pre-key bundle, it
//! never takes part in any Diffie-Hellman computation.
use std::fmt;

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{Rng, RngError, Secret};

pub const SIGNING_KEY_SIZE: usize = 32;
pub const VERIFYING_KEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey(Secret<SIGNING_KEY_SIZE>);

impl SigningKey {
    pub(crate) fn from_bytes(bytes: [u8; SIGNING_KEY_SIZE]) -> Self {
        SigningKey(Secret::from_bytes(bytes))
    }

    pub fn generate(rng: &Rng) -> Result<Self, RngError> {
        Ok(Self::from_bytes(rng.random_array()?))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        let signing_key = ed25519_dalek::SigningKey::from_bytes(self.0.as_bytes());
        VerifyingKey(signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, bytes: &[u8]) -> Signature {
        let signing_key = ed25519_dalek::SigningKey::from_bytes(self.0.as_bytes());
        Signature(signing_key.sign(bytes).to_bytes())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VerifyingKey([u8; VERIFYING_KEY_SIZE]);

impl VerifyingKey {
    pub fn from_bytes(bytes: [u8; VERIFYING_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; VERIFYING_KEY_SIZE] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; VERIFYING_KEY_SIZE] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    pub fn verify(&self, bytes: &[u8], signature: &Signature) -> Result<(), SignatureError> {
        let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|_| SignatureError::InvalidVerifyingKey)?;
        let signature = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
        verifying_key
            .verify(bytes, &signature)
            .map_err(|_| SignatureError::VerificationFailed)
    }
}

impl TryFrom<&[u8]> for VerifyingKey {
    type Error = SignatureError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; VERIFYING_KEY_SIZE] = value
            .try_into()
            .map_err(|_| SignatureError::InvalidLength(value.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; SIGNATURE_SIZE] {
        self.0
    }
}

impl TryFrom<&[u8]> for Signature {
    type Error = SignatureError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; SIGNATURE_SIZE] = value
            .try_into()
            .map_err(|_| SignatureError::InvalidLength(value.len()))?;
        Ok(Self(bytes))
    }
}

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature does not match public key and payload")]
    VerificationFailed,

    #[error("verifying key is not a valid curve point")]
    InvalidVerifyingKey,

    #[error("invalid key or signature length {0}")]
    InvalidLength(usize),
}

#[cfg(test)]
mod tests {
    use crate::crypto::Rng;

    use super::{SignatureError, SigningKey};

    #[test]
    fn sign_and_verify() {
        let rng = Rng::from_seed([1; 32]);

        let signing_key = SigningKey::generate(&rng).unwrap();
        let verifying_key = signing_key.verifying_key();

        let signature = signing_key.sign(b"Hello, Lynq!");
        assert!(verifying_key.verify(b"Hello, Lynq!", &signature).is_ok());
    }

    #[test]
    fn failed_verify() {
        let rng = Rng::from_seed([1; 32]);

        let signing_key = SigningKey::generate(&rng).unwrap();
        let verifying_key = signing_key.verifying_key();
        let signature = signing_key.sign(b"Hello, Lynq!");

        let invalid_signing_key = SigningKey::generate(&rng).unwrap();
        let invalid_verifying_key = invalid_signing_key.verifying_key();
        let invalid_signature = invalid_signing_key.sign(b"Hello, Lynq!");

        assert_ne!(verifying_key, invalid_verifying_key);
        assert_ne!(signature, invalid_signature);

        assert!(matches!(
            verifying_key.verify(b"Invalid Data", &signature),
            Err(SignatureError::VerificationFailed)
        ));
        assert!(matches!(
            invalid_verifying_key.verify(b"Hello, Lynq!", &signature),
            Err(SignatureError::VerificationFailed)
        ));
        assert!(matches!(
            verifying_key.verify(b"Hello, Lynq!", &invalid_signature),
            Err(SignatureError::VerificationFailed)
        ));
    }
}
