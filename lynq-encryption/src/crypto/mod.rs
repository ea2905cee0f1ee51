// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cryptographic primitives used by the handshake and the ratchet.
//!
//! Following algorithms are used:
//! * ChaCha random number generator with 20 rounds
//! * ChaCha20-Poly1305 AEAD with 96-bit nonce
//! * HKDF with SHA256
//! * HMAC with SHA256
//! * EdDSA related to Curve25519 with SHA-512
//! * ECDH key agreement with X25519
pub mod aead;
pub mod ed25519;
pub mod hkdf;
pub mod hmac;
mod rng;
mod secret;
pub mod x25519;

pub use rng::{Rng, RngError};
pub use secret::Secret;
