// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extended Triple Diffie-Hellman (X3DH) key agreement protocol.
//!
//! X3DH establishes a shared secret key between two parties who mutually authenticate each other
//! based on public keys. X3DH provides forward secrecy and cryptographic deniability.
//!
//! X3DH is designed for asynchronous settings where one user ("Bob") is offline but has published
//! a pre-key bundle. Another user ("Alice") uses that bundle to derive a shared secret and starts
//! a Double Ratchet session with it, sending her ephemeral key along with the first message.
//!
//! The Diffie-Hellman computations run over the X25519 identity DH key, the Ed25519 identity key
//! only authenticates the bundle.
//!
//! <https://signal.org/docs/specifications/x3dh/>
use thiserror::Error;
use tracing::trace;
use zeroize::Zeroizing;

use crate::crypto::hkdf::{HkdfError, hkdf};
use crate::crypto::x25519::{PUBLIC_KEY_SIZE, PublicKey, SHARED_SECRET_SIZE, SecretKey, X25519Error};
use crate::crypto::{Rng, RngError, Secret};
use crate::key_bundle::{KeyBundleError, OneTimePreKeyId, PreKeyBundle};
use crate::key_manager::{KeyManager, KeyManagerError, KeyManagerState};

/// ASCII string identifying the application, used as "info" for the KDF.
pub const KDF_INFO: &[u8; 9] = b"Lynq X3DH";

/// Result of the initiating side of a handshake.
///
/// The ephemeral key and one-time pre-key id need to be transmitted to the responder together
/// with the first message.
#[derive(Debug)]
pub struct X3dhOutput {
    pub shared_secret: Secret<SHARED_SECRET_SIZE>,
    pub ephemeral_key: PublicKey,
    pub onetime_prekey_id: Option<OneTimePreKeyId>,
}

/// Derives a shared secret from our identity DH secret and the verified pre-key bundle of the
/// other party.
pub fn x3dh_initiate(
    our_identity_dh_secret: &SecretKey,
    their_bundle: &PreKeyBundle,
    rng: &Rng,
) -> Result<X3dhOutput, X3dhError> {
    their_bundle.verify().map_err(|err| match err {
        KeyBundleError::SignatureInvalid => X3dhError::SignatureInvalid,
        err => X3dhError::KeyBundle(err),
    })?;

    let our_ephemeral_secret = SecretKey::generate(rng)?;
    let our_ephemeral_key = our_ephemeral_secret.public_key();

    let mut ikm = Vec::with_capacity(if their_bundle.onetime_prekey().is_none() {
        PUBLIC_KEY_SIZE * 3
    } else {
        PUBLIC_KEY_SIZE * 4
    });

    // DH1 = DH(IKA, SPKB)
    ikm.extend_from_slice(
        our_identity_dh_secret
            .calculate_agreement(their_bundle.signed_prekey())?
            .as_bytes(),
    );

    // DH2 = DH(EKA, IKB)
    ikm.extend_from_slice(
        our_ephemeral_secret
            .calculate_agreement(their_bundle.identity_dh_key())?
            .as_bytes(),
    );

    // DH3 = DH(EKA, SPKB)
    ikm.extend_from_slice(
        our_ephemeral_secret
            .calculate_agreement(their_bundle.signed_prekey())?
            .as_bytes(),
    );

    // DH4 = DH(EKA, OPKB)
    if let Some(onetime_prekey) = their_bundle.onetime_prekey() {
        ikm.extend_from_slice(
            our_ephemeral_secret
                .calculate_agreement(onetime_prekey)?
                .as_bytes(),
        );
    }

    let shared_secret = derive_secret(ikm)?;

    trace!(
        ephemeral_key = %our_ephemeral_key,
        onetime_prekey_id = ?their_bundle.onetime_prekey_id(),
        "initiated x3dh handshake"
    );

    Ok(X3dhOutput {
        shared_secret,
        ephemeral_key: our_ephemeral_key,
        onetime_prekey_id: their_bundle.onetime_prekey_id(),
    })
}

/// Derives the same shared secret on the responding side.
///
/// When a one-time pre-key id is given, the secret is removed from our pool and the updated
/// key-manager state is returned. A one-time pre-key can therefore never be used twice.
pub fn x3dh_receive(
    y: KeyManagerState,
    their_identity_dh_key: &PublicKey,
    their_ephemeral_key: &PublicKey,
    onetime_prekey_id: Option<OneTimePreKeyId>,
) -> Result<(KeyManagerState, Secret<SHARED_SECRET_SIZE>), X3dhError> {
    let (y_i, our_onetime_secret) = match onetime_prekey_id {
        Some(id) => {
            let (y_i, secret) = KeyManager::use_onetime_secret(y, id).map_err(|err| match err {
                KeyManagerError::UnknownOneTimeSecret(id) => X3dhError::OneTimeKeyMissing(id),
                err => X3dhError::KeyManager(err),
            })?;
            (y_i, Some(secret))
        }
        None => (y, None),
    };

    let our_identity_dh_secret = KeyManager::identity_dh_secret(&y_i);
    let our_prekey_secret = KeyManager::signed_prekey_secret(&y_i);

    let mut ikm = Vec::with_capacity(if our_onetime_secret.is_none() {
        PUBLIC_KEY_SIZE * 3
    } else {
        PUBLIC_KEY_SIZE * 4
    });

    // DH1 = DH(IKA, SPKB)
    ikm.extend_from_slice(
        our_prekey_secret
            .calculate_agreement(their_identity_dh_key)?
            .as_bytes(),
    );

    // DH2 = DH(EKA, IKB)
    ikm.extend_from_slice(
        our_identity_dh_secret
            .calculate_agreement(their_ephemeral_key)?
            .as_bytes(),
    );

    // DH3 = DH(EKA, SPKB)
    ikm.extend_from_slice(
        our_prekey_secret
            .calculate_agreement(their_ephemeral_key)?
            .as_bytes(),
    );

    // DH4 = DH(EKA, OPKB)
    if let Some(our_onetime_secret) = &our_onetime_secret {
        ikm.extend_from_slice(
            our_onetime_secret
                .calculate_agreement(their_ephemeral_key)?
                .as_bytes(),
        );
    }

    let shared_secret = derive_secret(ikm)?;

    trace!(
        ephemeral_key = %their_ephemeral_key,
        onetime_prekey_id = ?onetime_prekey_id,
        "received x3dh handshake"
    );

    Ok((y_i, shared_secret))
}

fn derive_secret(ikm: Vec<u8>) -> Result<Secret<SHARED_SECRET_SIZE>, X3dhError> {
    let ikm = Zeroizing::new(ikm);
    let sk: [u8; SHARED_SECRET_SIZE] = hkdf(b"", &ikm, Some(KDF_INFO))?;
    Ok(Secret::from_bytes(sk))
}

#[derive(Debug, Error)]
pub enum X3dhError {
    #[error("signature of pre-key bundle is invalid")]
    SignatureInvalid,

    #[error("one-time pre-key with id {0} is missing, it might have been used already")]
    OneTimeKeyMissing(OneTimePreKeyId),

    #[error(transparent)]
    Rng(#[from] RngError),

    #[error(transparent)]
    Hkdf(#[from] HkdfError),

    #[error(transparent)]
    X25519(#[from] X25519Error),

    #[error(transparent)]
    KeyBundle(#[from] KeyBundleError),

    #[error(transparent)]
    KeyManager(#[from] KeyManagerError),
}
