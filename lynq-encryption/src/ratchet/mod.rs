// SPDX-License-Identifier: MIT OR Apache-2.0

//! Double Ratchet algorithm for two parties who share a secret key from an X3DH handshake.
//!
//! Every message is encrypted with a fresh message key from a symmetric-key ratchet. Whenever the
//! direction of the conversation changes, both parties mix a new Diffie-Hellman output into the
//! root key (DH ratchet), which heals the session after a compromise of the current state.
//!
//! Messages can arrive out-of-order or get lost. Keys of skipped messages are kept in a bounded
//! cache until the message arrives eventually.
//!
//! <https://signal.org/docs/specifications/doubleratchet/>
mod double_ratchet;
mod header;
mod kdf;
mod skipped;

pub use double_ratchet::{DoubleRatchet, EncryptedMessage, RatchetError, RatchetState, SessionRole};
pub use header::{HEADER_SIZE, RatchetHeader};
pub use kdf::{CHAIN_KEY_SIZE, MESSAGE_KEY_SIZE, ROOT_KDF_INFO, ROOT_KEY_SIZE};
pub use skipped::SkippedKeys;
