// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::config::Config;
use crate::crypto::aead::{
    AEAD_NONCE_SIZE, AEAD_TAG_SIZE, AeadError, AeadNonce, aead_decrypt, aead_encrypt,
};
use crate::crypto::hkdf::HkdfError;
use crate::crypto::hmac::HmacError;
use crate::crypto::x25519::{PublicKey, SHARED_SECRET_SIZE, SecretKey, X25519Error};
use crate::crypto::{Rng, RngError, Secret};
use crate::ratchet::kdf::{kdf_chain, kdf_root};
use crate::ratchet::{CHAIN_KEY_SIZE, MESSAGE_KEY_SIZE, ROOT_KEY_SIZE, RatchetHeader, SkippedKeys};

/// Double Ratchet session between two parties.
///
/// All methods are pure state transitions: they take the current state by value and return the
/// next state. When an error occurs the state is dropped, callers keep the last persisted state
/// and can continue from there.
///
/// Exactly one call per session may happen at a time, interleaving calls on the same state
/// desynchronizes the chains.
pub struct DoubleRatchet;

/// How a session gets constructed from the X3DH shared secret.
#[derive(Debug)]
pub enum SessionRole {
    /// We started the handshake with the pre-key bundle of the other party. Their signed pre-key
    /// acts as their first ratchet key.
    Initiator { their_ratchet_key: PublicKey },

    /// We received a handshake. Our first ratchet key is the signed pre-key the initiator used.
    ///
    /// Reusing the mid-term signed pre-key as a ratchet key deviates from the canonical Double
    /// Ratchet, where the first ratchet key pair is freshly generated.
    Responder { our_ratchet_secret: SecretKey },
}

/// Serializable state of a Double Ratchet session (for persistence).
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "test_utils"), derive(Clone))]
pub struct RatchetState {
    root_key: Secret<ROOT_KEY_SIZE>,
    chain_key_send: Option<Secret<CHAIN_KEY_SIZE>>,
    chain_key_recv: Option<Secret<CHAIN_KEY_SIZE>>,
    our_ratchet_secret: SecretKey,
    our_ratchet_key: PublicKey,
    their_ratchet_key: Option<PublicKey>,
    ns: u32,
    nr: u32,
    pn: u32,
    skipped: SkippedKeys,
    max_skip: u32,
}

impl RatchetState {
    /// Encodes the full session state as CBOR, including all skipped message keys.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RatchetError> {
        Ok(encode_cbor(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RatchetError> {
        Ok(decode_cbor(bytes)?)
    }

    pub fn our_ratchet_key(&self) -> &PublicKey {
        &self.our_ratchet_key
    }

    pub fn their_ratchet_key(&self) -> Option<&PublicKey> {
        self.their_ratchet_key.as_ref()
    }

    /// Number of messages sent in the current sending chain.
    pub fn ns(&self) -> u32 {
        self.ns
    }

    /// Number of messages received in the current receiving chain.
    pub fn nr(&self) -> u32 {
        self.nr
    }

    /// Number of messages in the previous sending chain.
    pub fn pn(&self) -> u32 {
        self.pn
    }

    pub fn skipped(&self) -> &SkippedKeys {
        &self.skipped
    }

    pub fn has_send_chain(&self) -> bool {
        self.chain_key_send.is_some()
    }

    pub fn has_recv_chain(&self) -> bool {
        self.chain_key_recv.is_some()
    }
}

/// Ratchet message with the unencrypted header and `nonce || ciphertext` as payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMessage {
    pub header: RatchetHeader,
    #[serde(with = "serde_bytes")]
    pub ciphertext: Vec<u8>,
}

impl DoubleRatchet {
    /// Returns a new session from the X3DH shared secret.
    pub fn init(
        shared_secret: Secret<SHARED_SECRET_SIZE>,
        role: SessionRole,
        config: &Config,
        rng: &Rng,
    ) -> Result<RatchetState, RatchetError> {
        let max_skip = config.max_skip;
        let skipped = SkippedKeys::new(max_skip as usize);

        match role {
            SessionRole::Initiator { their_ratchet_key } => {
                let our_ratchet_secret = SecretKey::generate(rng)?;
                let our_ratchet_key = our_ratchet_secret.public_key();

                let dh_output = our_ratchet_secret.calculate_agreement(&their_ratchet_key)?;
                let (root_key, chain_key_send) = kdf_root(&shared_secret, &dh_output)?;

                debug!(
                    our_ratchet_key = %our_ratchet_key,
                    their_ratchet_key = %their_ratchet_key,
                    "initialised session as initiator"
                );

                Ok(RatchetState {
                    root_key,
                    chain_key_send: Some(chain_key_send),
                    chain_key_recv: None,
                    our_ratchet_secret,
                    our_ratchet_key,
                    their_ratchet_key: Some(their_ratchet_key),
                    ns: 0,
                    nr: 0,
                    pn: 0,
                    skipped,
                    max_skip,
                })
            }
            SessionRole::Responder { our_ratchet_secret } => {
                let our_ratchet_key = our_ratchet_secret.public_key();

                debug!(
                    our_ratchet_key = %our_ratchet_key,
                    "initialised session as responder"
                );

                Ok(RatchetState {
                    root_key: shared_secret,
                    chain_key_send: None,
                    chain_key_recv: None,
                    our_ratchet_secret,
                    our_ratchet_key,
                    their_ratchet_key: None,
                    ns: 0,
                    nr: 0,
                    pn: 0,
                    skipped,
                    max_skip,
                })
            }
        }
    }

    /// Encrypts the plaintext with the next message key of our sending chain.
    pub fn encrypt(
        y: RatchetState,
        plaintext: &[u8],
        rng: &Rng,
    ) -> Result<(RatchetState, EncryptedMessage), RatchetError> {
        let mut y_i = if y.chain_key_send.is_some() {
            y
        } else {
            Self::bootstrap_send_chain(y)?
        };

        let Some(chain_key) = y_i.chain_key_send.take() else {
            return Err(RatchetError::NoSendChain);
        };
        let (chain_key, message_key) = kdf_chain(&chain_key)?;
        y_i.chain_key_send = Some(chain_key);

        let header = RatchetHeader {
            public_key: y_i.our_ratchet_key,
            pn: y_i.pn,
            n: y_i.ns,
        };
        y_i.ns = y_i
            .ns
            .checked_add(1)
            .ok_or(RatchetError::CounterOverflow)?;

        let nonce: AeadNonce = rng.random_array()?;
        let ciphertext = {
            let ad = header.associated_data();
            let mut ciphertext =
                Vec::with_capacity(AEAD_NONCE_SIZE + plaintext.len() + AEAD_TAG_SIZE);
            ciphertext.extend_from_slice(&nonce);
            ciphertext.extend_from_slice(&aead_encrypt(
                message_key.as_bytes(),
                plaintext,
                nonce,
                Some(&ad),
            )?);
            ciphertext
        };

        trace!(pn = header.pn, n = header.n, "encrypted message");

        Ok((y_i, EncryptedMessage { header, ciphertext }))
    }

    /// Decrypts a message, advancing the receiving chain and performing a DH ratchet step when
    /// the sender's ratchet key changed.
    pub fn decrypt(
        y: RatchetState,
        message: &EncryptedMessage,
        rng: &Rng,
    ) -> Result<(RatchetState, Vec<u8>), RatchetError> {
        let header = &message.header;
        let ad = header.associated_data();

        // Message key was derived earlier while skipping over this message.
        let mut y_i = y;
        if let Some(message_key) = y_i.skipped.take(&header.public_key, header.n) {
            trace!(pn = header.pn, n = header.n, "decrypt with skipped message key");
            let plaintext = Self::decrypt_inner(&message_key, &message.ciphertext, &ad)?;
            return Ok((y_i, plaintext));
        }

        if y_i.their_ratchet_key.as_ref() != Some(&header.public_key) {
            y_i = Self::skip_message_keys(y_i, header.pn)?;
            y_i = Self::dh_ratchet(y_i, &header.public_key, rng)?;
        }

        y_i = Self::skip_message_keys(y_i, header.n)?;

        let Some(chain_key) = y_i.chain_key_recv.take() else {
            return Err(RatchetError::NoReceiveChain);
        };
        let (chain_key, message_key) = kdf_chain(&chain_key)?;
        y_i.chain_key_recv = Some(chain_key);
        y_i.nr = y_i
            .nr
            .checked_add(1)
            .ok_or(RatchetError::CounterOverflow)?;

        let plaintext = Self::decrypt_inner(&message_key, &message.ciphertext, &ad)?;

        trace!(pn = header.pn, n = header.n, "decrypted message");

        Ok((y_i, plaintext))
    }

    fn decrypt_inner(
        message_key: &Secret<MESSAGE_KEY_SIZE>,
        ciphertext: &[u8],
        ad: &[u8],
    ) -> Result<Vec<u8>, RatchetError> {
        if ciphertext.len() < AEAD_NONCE_SIZE + AEAD_TAG_SIZE {
            return Err(RatchetError::MalformedCiphertext(ciphertext.len()));
        }

        let (nonce, ciphertext) = ciphertext.split_at(AEAD_NONCE_SIZE);
        let nonce: AeadNonce = nonce
            .try_into()
            .map_err(|_| RatchetError::MalformedCiphertext(nonce.len()))?;

        aead_decrypt(message_key.as_bytes(), ciphertext, nonce, Some(ad))
            .map_err(|_| RatchetError::AuthenticationFailed)
    }

    /// Derives a sending chain from our current ratchet key and their known ratchet key.
    fn bootstrap_send_chain(mut y: RatchetState) -> Result<RatchetState, RatchetError> {
        let Some(their_ratchet_key) = y.their_ratchet_key else {
            return Err(RatchetError::NoSendChain);
        };

        let dh_output = y.our_ratchet_secret.calculate_agreement(&their_ratchet_key)?;
        let (root_key, chain_key_send) = kdf_root(&y.root_key, &dh_output)?;
        y.root_key = root_key;
        y.chain_key_send = Some(chain_key_send);

        debug!(
            their_ratchet_key = %their_ratchet_key,
            "derived missing sending chain"
        );

        Ok(y)
    }

    /// Advances the receiving chain up to the given message number and keeps the keys of all
    /// skipped messages. Does nothing if there is no receiving chain yet.
    fn skip_message_keys(mut y: RatchetState, until: u32) -> Result<RatchetState, RatchetError> {
        let Some(mut chain_key) = y.chain_key_recv.take() else {
            return Ok(y);
        };

        if u64::from(y.nr) + u64::from(y.max_skip) < u64::from(until) {
            return Err(RatchetError::TooManySkipped {
                until,
                next: y.nr,
                max_skip: y.max_skip,
            });
        }

        while y.nr < until {
            let (next_chain_key, message_key) = kdf_chain(&chain_key)?;
            chain_key = next_chain_key;
            if let Some(their_ratchet_key) = y.their_ratchet_key {
                y.skipped.insert(their_ratchet_key, y.nr, message_key);
            }
            y.nr += 1;
        }

        y.chain_key_recv = Some(chain_key);
        Ok(y)
    }

    fn dh_ratchet(
        mut y: RatchetState,
        their_ratchet_key: &PublicKey,
        rng: &Rng,
    ) -> Result<RatchetState, RatchetError> {
        y.pn = y.ns;
        y.ns = 0;
        y.nr = 0;
        y.their_ratchet_key = Some(*their_ratchet_key);

        let dh_output = y.our_ratchet_secret.calculate_agreement(their_ratchet_key)?;
        let (root_key, chain_key_recv) = kdf_root(&y.root_key, &dh_output)?;
        y.chain_key_recv = Some(chain_key_recv);

        y.our_ratchet_secret = SecretKey::generate(rng)?;
        y.our_ratchet_key = y.our_ratchet_secret.public_key();

        let dh_output = y.our_ratchet_secret.calculate_agreement(their_ratchet_key)?;
        let (root_key, chain_key_send) = kdf_root(&root_key, &dh_output)?;
        y.root_key = root_key;
        y.chain_key_send = Some(chain_key_send);

        debug!(
            our_ratchet_key = %y.our_ratchet_key,
            their_ratchet_key = %their_ratchet_key,
            pn = y.pn,
            "performed dh ratchet step"
        );

        Ok(y)
    }
}

#[derive(Debug, Error)]
pub enum RatchetError {
    #[error("no sending chain available and remote ratchet key is unknown")]
    NoSendChain,

    #[error("no receiving chain available")]
    NoReceiveChain,

    #[error("can't skip to message {until}, next expected is {next} with max. {max_skip} skips")]
    TooManySkipped { until: u32, next: u32, max_skip: u32 },

    #[error("message could not be authenticated")]
    AuthenticationFailed,

    #[error("ciphertext with {0} bytes is too short")]
    MalformedCiphertext(usize),

    #[error("message counter overflow")]
    CounterOverflow,

    #[error(transparent)]
    Rng(#[from] RngError),

    #[error(transparent)]
    Hkdf(#[from] HkdfError),

    #[error(transparent)]
    Hmac(#[from] HmacError),

    #[error(transparent)]
    Aead(#[from] AeadError),

    #[error(transparent)]
    X25519(#[from] X25519Error),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}
