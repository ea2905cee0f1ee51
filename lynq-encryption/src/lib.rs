// SPDX-License-Identifier: MIT OR Apache-2.0

//! `lynq-encryption` provides forward-secure, deniable end-to-end encrypted sessions between two
//! parties over an untrusted relay which may reorder, delay or duplicate messages.
//!
//! Sessions are bootstrapped with Signal's [X3DH](https://signal.org/docs/specifications/x3dh)
//! key agreement against a published pre-key bundle, the other party doesn't need to be online.
//! Every message is then encrypted with a fresh key derived by the [Double
//! Ratchet](https://signal.org/docs/specifications/doubleratchet) which heals itself after a
//! compromise as soon as both parties exchanged messages again.
//!
//! ## Layers
//!
//! The protocol core consists of pure state-transition functions. They take the current state by
//! value and return the next state together with the result, which makes it easy to persist state
//! after every successful operation and to discard it on failure:
//!
//! - [`KeyManager`] generates our identity, signed pre-key and one-time pre-keys and hands out
//!   public [`PreKeyBundle`]s.
//! - [`x3dh_initiate`] and [`x3dh_receive`] derive the shared secret on both sides.
//! - [`DoubleRatchet`] encrypts and decrypts messages of one session.
//!
//! On top of it the [`SessionManager`] orchestrates sessions per peer. It loads or creates our
//! identity, runs the handshake on first contact and persists all state through the
//! [`IdentityStore`] and [`SessionStore`] traits. Packets leave the manager as [`WirePacket`]s
//! which can be sent as JSON over any transport.
//!
//! ## Cryptographic primitives
//!
//! X25519 for Diffie-Hellman, Ed25519 to sign pre-keys, HKDF-SHA256 for the root and X3DH key
//! derivation, HMAC-SHA256 for the chain key derivation and ChaCha20-Poly1305 for message
//! encryption.
//!
//! ## Non-goals
//!
//! Group messaging, post-quantum key exchange and multi-device fan-out are not supported.
mod cbor;
mod config;
pub mod crypto;
mod key_bundle;
mod key_manager;
mod manager;
mod memory_store;
mod message;
pub mod ratchet;
mod serde;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
pub mod traits;
mod x3dh;

pub use cbor::{DecodeError, EncodeError};
pub use config::{Config, DEFAULT_MAX_SKIP, DEFAULT_ONETIME_PREKEYS};
pub use crypto::{Rng, RngError};
pub use key_bundle::{
    KeyBundleError, OneTimePreKey, OneTimePreKeyId, PreKeyBundle, SignedPreKey, verify_bundle,
};
pub use key_manager::{KeyManager, KeyManagerError, KeyManagerState};
pub use manager::{SessionManager, SessionManagerError};
pub use memory_store::MemoryStore;
pub use message::{Handshake, MessageError, WirePacket};
pub use ratchet::{DoubleRatchet, EncryptedMessage, RatchetError, RatchetState, SessionRole};
pub use traits::{BundleDirectory, IdentityStore, SessionStore};
pub use x3dh::{KDF_INFO as X3DH_KDF_INFO, X3dhError, X3dhOutput, x3dh_initiate, x3dh_receive};
