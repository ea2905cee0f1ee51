// SPDX-License-Identifier: MIT OR Apache-2.0

//! Manager for our own secret key material.
//!
//! The key manager owns the identity signing key, the cross-signed identity DH key, the signed
//! pre-key and a pool of one-time pre-keys. Public parts are handed out as [`PreKeyBundle`]s.
//! Every one-time pre-key secret is removed from the pool as soon as it was used in a handshake,
//! applications should publish new ones when the pool runs low.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::config::Config;
use crate::crypto::ed25519::{Signature, SigningKey, VerifyingKey};
use crate::crypto::x25519::{PublicKey, SecretKey};
use crate::crypto::{Rng, RngError};
use crate::key_bundle::{OneTimePreKey, OneTimePreKeyId, PreKeyBundle, SignedPreKey};

/// Key manager to maintain secret key material and to generate signed public pre-key bundles.
#[derive(Clone, Debug)]
pub struct KeyManager;

/// Serializable state of key manager (for persistence).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyManagerState {
    identity_secret: SigningKey,
    identity_key: VerifyingKey,
    identity_dh_secret: SecretKey,
    identity_dh_key: PublicKey,
    identity_dh_key_signature: Signature,
    signed_prekey_secret: SecretKey,
    signed_prekey: SignedPreKey,
    onetime_secrets: BTreeMap<OneTimePreKeyId, SecretKey>,
    onetime_next_id: OneTimePreKeyId,
}

impl KeyManagerState {
    /// Encodes the full secret state as CBOR, to be kept in an identity store.
    pub fn to_bytes(&self) -> Result<Vec<u8>, KeyManagerError> {
        Ok(encode_cbor(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyManagerError> {
        Ok(decode_cbor(bytes)?)
    }

    /// Number of unused one-time pre-keys left in the pool.
    pub fn onetime_prekeys_len(&self) -> usize {
        self.onetime_secrets.len()
    }
}

impl KeyManager {
    /// Returns newly generated key-manager state with a fresh identity, signed pre-key and the
    /// configured number of one-time pre-keys.
    pub fn generate(config: &Config, rng: &Rng) -> Result<KeyManagerState, KeyManagerError> {
        let identity_secret = SigningKey::generate(rng)?;

        let identity_dh_secret = SecretKey::generate(rng)?;
        let identity_dh_key = identity_dh_secret.public_key();
        let identity_dh_key_signature = identity_secret.sign(identity_dh_key.as_bytes());

        let signed_prekey_secret = SecretKey::generate(rng)?;
        let signed_prekey = SignedPreKey::sign(signed_prekey_secret.public_key(), &identity_secret);

        let mut y = KeyManagerState {
            identity_key: identity_secret.verifying_key(),
            identity_secret,
            identity_dh_secret,
            identity_dh_key,
            identity_dh_key_signature,
            signed_prekey_secret,
            signed_prekey,
            onetime_secrets: BTreeMap::new(),
            onetime_next_id: 0,
        };

        for _ in 0..config.onetime_prekeys {
            let (y_i, _) = Self::generate_onetime_prekey(y, rng)?;
            y = y_i;
        }

        Ok(y)
    }

    /// Adds a new one-time pre-key to the pool and returns its public part.
    pub fn generate_onetime_prekey(
        mut y: KeyManagerState,
        rng: &Rng,
    ) -> Result<(KeyManagerState, OneTimePreKey), KeyManagerError> {
        let id = y.onetime_next_id;
        let secret = SecretKey::generate(rng)?;
        let onetime_prekey = OneTimePreKey::new(secret.public_key(), id);

        if y.onetime_secrets.insert(id, secret).is_some() {
            return Err(KeyManagerError::DuplicateOneTimeId(id));
        }
        y.onetime_next_id = id
            .checked_add(1)
            .ok_or(KeyManagerError::OneTimeIdsExhausted)?;

        Ok((y, onetime_prekey))
    }

    /// Returns the public pre-key bundle which can be published for others.
    ///
    /// When an id is given, the matching one-time pre-key is included if it is still in the pool.
    /// Without an id the one-time pre-key with the lowest id is included. The bundle carries no
    /// one-time pre-key if none is available.
    pub fn public_bundle(y: &KeyManagerState, onetime_id: Option<OneTimePreKeyId>) -> PreKeyBundle {
        let onetime = match onetime_id {
            Some(id) => y.onetime_secrets.get_key_value(&id),
            None => y.onetime_secrets.first_key_value(),
        };

        PreKeyBundle::new(
            y.identity_key,
            y.identity_dh_key,
            y.identity_dh_key_signature,
            y.signed_prekey,
            onetime.map(|(id, secret)| OneTimePreKey::new(secret.public_key(), *id)),
        )
    }

    /// Removes the one-time pre-key secret from the pool and returns it.
    ///
    /// Throws an error when the requested secret is unknown, most likely because it was already
    /// used once.
    pub fn use_onetime_secret(
        mut y: KeyManagerState,
        id: OneTimePreKeyId,
    ) -> Result<(KeyManagerState, SecretKey), KeyManagerError> {
        match y.onetime_secrets.remove(&id) {
            Some(secret) => Ok((y, secret)),
            None => Err(KeyManagerError::UnknownOneTimeSecret(id)),
        }
    }

    pub fn identity_key(y: &KeyManagerState) -> &VerifyingKey {
        &y.identity_key
    }

    pub fn identity_dh_secret(y: &KeyManagerState) -> &SecretKey {
        &y.identity_dh_secret
    }

    pub fn identity_dh_key(y: &KeyManagerState) -> &PublicKey {
        &y.identity_dh_key
    }

    pub fn signed_prekey_secret(y: &KeyManagerState) -> &SecretKey {
        &y.signed_prekey_secret
    }
}

#[derive(Debug, Error)]
pub enum KeyManagerError {
    #[error(transparent)]
    Rng(#[from] RngError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("could not find one-time pre-key secret with id {0}")]
    UnknownOneTimeSecret(OneTimePreKeyId),

    #[error("one-time pre-key with id {0} exists already")]
    DuplicateOneTimeId(OneTimePreKeyId),

    #[error("no one-time pre-key ids left")]
    OneTimeIdsExhausted,
}
