// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::ed25519::{Signature, VerifyingKey};
use crate::crypto::x25519::PublicKey;
use crate::key_bundle::{OneTimePreKey, OneTimePreKeyId, SignedPreKey};

/// Public key material of an identity, published so others can start an X3DH handshake with us.
///
/// The bundle carries our Ed25519 identity key and two X25519 keys which are cross-signed by it:
/// the identity DH key and the signed pre-key. Optionally it carries one one-time pre-key from our
/// pool. Without a one-time pre-key X3DH falls back to three Diffie-Hellman computations.
///
/// A bundle must pass [`PreKeyBundle::verify`] before it is used for a handshake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreKeyBundle {
    identity_key: VerifyingKey,
    #[serde(rename = "identityDHKey")]
    identity_dh_key: PublicKey,
    #[serde(rename = "identityDHKeySignature")]
    identity_dh_key_signature: Signature,
    signed_pre_key: SignedPreKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    one_time_pre_key: Option<OneTimePreKey>,
}

impl PreKeyBundle {
    pub fn new(
        identity_key: VerifyingKey,
        identity_dh_key: PublicKey,
        identity_dh_key_signature: Signature,
        signed_prekey: SignedPreKey,
        onetime_prekey: Option<OneTimePreKey>,
    ) -> Self {
        Self {
            identity_key,
            identity_dh_key,
            identity_dh_key_signature,
            signed_pre_key: signed_prekey,
            one_time_pre_key: onetime_prekey,
        }
    }

    pub fn identity_key(&self) -> &VerifyingKey {
        &self.identity_key
    }

    pub fn identity_dh_key(&self) -> &PublicKey {
        &self.identity_dh_key
    }

    pub fn identity_dh_key_signature(&self) -> &Signature {
        &self.identity_dh_key_signature
    }

    pub fn signed_prekey(&self) -> &PublicKey {
        self.signed_pre_key.key()
    }

    pub fn signed_prekey_signature(&self) -> &Signature {
        self.signed_pre_key.signature()
    }

    pub fn onetime_prekey(&self) -> Option<&PublicKey> {
        self.one_time_pre_key.as_ref().map(|key| key.key())
    }

    pub fn onetime_prekey_id(&self) -> Option<OneTimePreKeyId> {
        self.one_time_pre_key.as_ref().map(|key| key.id())
    }

    /// Checks that both the identity DH key and the signed pre-key were signed by the identity key
    /// of this bundle.
    pub fn verify(&self) -> Result<(), KeyBundleError> {
        self.identity_key
            .verify(
                self.identity_dh_key.as_bytes(),
                &self.identity_dh_key_signature,
            )
            .map_err(|_| KeyBundleError::SignatureInvalid)?;
        self.signed_pre_key.verify(&self.identity_key)?;
        Ok(())
    }

    /// Encodes the bundle as JSON with hex-encoded keys and signatures for out-of-band exchange.
    pub fn to_json(&self) -> Result<String, KeyBundleError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, KeyBundleError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Returns true if both cross-signatures of the bundle are valid.
pub fn verify_bundle(bundle: &PreKeyBundle) -> bool {
    bundle.verify().is_ok()
}

#[derive(Debug, Error)]
pub enum KeyBundleError {
    #[error("signature of pre-key bundle is invalid")]
    SignatureInvalid,

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use crate::crypto::Rng;
    use crate::crypto::ed25519::{Signature, SigningKey};
    use crate::crypto::x25519::SecretKey;
    use crate::key_bundle::{OneTimePreKey, SignedPreKey};

    use super::{KeyBundleError, PreKeyBundle, verify_bundle};

    fn bundle(rng: &Rng) -> PreKeyBundle {
        let identity_secret = SigningKey::generate(rng).unwrap();
        let identity_dh_key = SecretKey::generate(rng).unwrap().public_key();
        let signed_prekey = SignedPreKey::sign(
            SecretKey::generate(rng).unwrap().public_key(),
            &identity_secret,
        );
        let onetime_prekey = OneTimePreKey::new(SecretKey::generate(rng).unwrap().public_key(), 3);

        PreKeyBundle::new(
            identity_secret.verifying_key(),
            identity_dh_key,
            identity_secret.sign(identity_dh_key.as_bytes()),
            signed_prekey,
            Some(onetime_prekey),
        )
    }

    fn flip_bit(signature: &Signature, byte: usize, bit: u8) -> Signature {
        let mut bytes = signature.to_bytes();
        bytes[byte] ^= 1 << bit;
        Signature::from_bytes(bytes)
    }

    #[test]
    fn verify() {
        let rng = Rng::from_seed([1; 32]);
        let bundle = bundle(&rng);
        assert!(bundle.verify().is_ok());
        assert!(verify_bundle(&bundle));
    }

    #[test]
    fn flipped_signature_bits() {
        let rng = Rng::from_seed([1; 32]);
        let valid = bundle(&rng);

        for byte in [0, 17, 31, 32, 48, 63] {
            for bit in [0, 3, 7] {
                let mut invalid = valid.clone();
                invalid.identity_dh_key_signature =
                    flip_bit(valid.identity_dh_key_signature(), byte, bit);
                assert!(!verify_bundle(&invalid));

                let mut invalid = valid.clone();
                invalid.signed_pre_key = SignedPreKey::new(
                    *valid.signed_prekey(),
                    flip_bit(valid.signed_prekey_signature(), byte, bit),
                );
                assert!(matches!(
                    invalid.verify(),
                    Err(KeyBundleError::SignatureInvalid)
                ));
            }
        }
    }

    #[test]
    fn signed_by_other_identity() {
        let rng = Rng::from_seed([1; 32]);
        let bundle_1 = bundle(&rng);
        let bundle_2 = bundle(&rng);

        let mixed = PreKeyBundle::new(
            *bundle_2.identity_key(),
            *bundle_1.identity_dh_key(),
            *bundle_1.identity_dh_key_signature(),
            bundle_1.signed_pre_key,
            None,
        );
        assert!(!verify_bundle(&mixed));
    }

    #[test]
    fn json_exchange() {
        let rng = Rng::from_seed([1; 32]);
        let bundle = bundle(&rng);

        let json = bundle.to_json().unwrap();
        assert!(json.contains("\"identityDHKey\""));
        assert!(json.contains("\"oneTimePreKey\":{\"id\":3"));

        let bundle_again = PreKeyBundle::from_json(&json).unwrap();
        assert_eq!(bundle, bundle_again);
        assert!(bundle_again.verify().is_ok());

        // The one-time pre-key field is omitted when there is none.
        let without = PreKeyBundle::new(
            *bundle.identity_key(),
            *bundle.identity_dh_key(),
            *bundle.identity_dh_key_signature(),
            bundle.signed_pre_key,
            None,
        );
        let json = without.to_json().unwrap();
        assert!(!json.contains("oneTimePreKey"));
        assert_eq!(PreKeyBundle::from_json(&json).unwrap(), without);

        assert!(matches!(
            PreKeyBundle::from_json("{\"identityKey\":\"zz\"}"),
            Err(KeyBundleError::Json(_))
        ));
    }
}
