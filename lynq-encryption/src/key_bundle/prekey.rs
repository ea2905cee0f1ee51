// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::crypto::ed25519::{Signature, SigningKey, VerifyingKey};
use crate::crypto::x25519::PublicKey;
use crate::key_bundle::KeyBundleError;

/// Mid-term pre-key with key material for X3DH key agreement, signed by the identity key.
///
/// Rotation of signed pre-keys is left to the application.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPreKey {
    key: PublicKey,
    signature: Signature,
}

impl SignedPreKey {
    pub fn new(key: PublicKey, signature: Signature) -> Self {
        Self { key, signature }
    }

    /// Signs the given pre-key with our identity signing key.
    pub fn sign(key: PublicKey, identity_key: &SigningKey) -> Self {
        let signature = identity_key.sign(key.as_bytes());
        Self { key, signature }
    }

    pub fn key(&self) -> &PublicKey {
        &self.key
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn verify(&self, identity_key: &VerifyingKey) -> Result<(), KeyBundleError> {
        identity_key
            .verify(self.key.as_bytes(), &self.signature)
            .map_err(|_| KeyBundleError::SignatureInvalid)
    }
}

/// Identifier of a one-time pre-key, unique within the pool of the identity which created it.
pub type OneTimePreKeyId = u32;

/// Pre-key with key material for X3DH key agreement to be used exactly _once_.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimePreKey {
    id: OneTimePreKeyId,
    key: PublicKey,
}

impl OneTimePreKey {
    pub fn new(key: PublicKey, id: OneTimePreKeyId) -> Self {
        Self { id, key }
    }

    pub fn key(&self) -> &PublicKey {
        &self.key
    }

    pub fn id(&self) -> OneTimePreKeyId {
        self.id
    }
}
