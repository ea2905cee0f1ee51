// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::crypto::x25519::{PUBLIC_KEY_SIZE, PublicKey};

/// Size of the encoded header: ratchet public key, previous chain length and message number.
pub const HEADER_SIZE: usize = PUBLIC_KEY_SIZE + 4 + 4;

/// Unencrypted header sent along with every ratchet message.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetHeader {
    /// Current ratchet public key of the sender.
    pub public_key: PublicKey,

    /// Number of messages in the sender's previous sending chain.
    pub pn: u32,

    /// Message number in the current sending chain.
    pub n: u32,
}

impl RatchetHeader {
    /// Deterministic encoding of the header which is authenticated as associated data.
    ///
    /// Layout is `public_key || pn || n` with both counters as big-endian u32.
    pub fn associated_data(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..PUBLIC_KEY_SIZE].copy_from_slice(self.public_key.as_bytes());
        bytes[PUBLIC_KEY_SIZE..PUBLIC_KEY_SIZE + 4].copy_from_slice(&self.pn.to_be_bytes());
        bytes[PUBLIC_KEY_SIZE + 4..].copy_from_slice(&self.n.to_be_bytes());
        bytes
    }
}
