// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire packets exchanged through the transport.
//!
//! Packets are JSON objects with hex-encoded bytes:
//!
//! ```text
//! {
//!   "header": { "pk": "<ratchet public key>", "pn": 0, "n": 0 },
//!   "body": "<nonce || ciphertext>",
//!   "identityKey": "<sender identity DH key>",
//!   "ephemeralKey": "<sender ephemeral key>",
//!   "oneTimeKeyId": 0
//! }
//! ```
//!
//! The last three fields are only present on packets which start a new session.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::x25519::PublicKey;
use crate::key_bundle::OneTimePreKeyId;
use crate::ratchet::{EncryptedMessage, RatchetHeader};
use crate::serde::{deserialize_hex, serialize_hex};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePacket {
    header: WireHeader,
    #[serde(serialize_with = "serialize_hex", deserialize_with = "deserialize_hex")]
    body: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity_key: Option<PublicKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ephemeral_key: Option<PublicKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    one_time_key_id: Option<OneTimePreKeyId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct WireHeader {
    pk: PublicKey,
    pn: u32,
    n: u32,
}

/// Handshake values the initiator sends along with the first messages of a session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub identity_key: PublicKey,
    pub ephemeral_key: PublicKey,
    pub onetime_prekey_id: Option<OneTimePreKeyId>,
}

impl WirePacket {
    pub fn new(message: EncryptedMessage) -> Self {
        Self {
            header: WireHeader {
                pk: message.header.public_key,
                pn: message.header.pn,
                n: message.header.n,
            },
            body: message.ciphertext,
            identity_key: None,
            ephemeral_key: None,
            one_time_key_id: None,
        }
    }

    /// Returns a packet which starts a new session.
    pub fn with_handshake(message: EncryptedMessage, handshake: Handshake) -> Self {
        let mut packet = Self::new(message);
        packet.identity_key = Some(handshake.identity_key);
        packet.ephemeral_key = Some(handshake.ephemeral_key);
        packet.one_time_key_id = handshake.onetime_prekey_id;
        packet
    }

    pub fn message(&self) -> EncryptedMessage {
        EncryptedMessage {
            header: RatchetHeader {
                public_key: self.header.pk,
                pn: self.header.pn,
                n: self.header.n,
            },
            ciphertext: self.body.clone(),
        }
    }

    /// Returns the handshake values if this packet starts a new session.
    ///
    /// Throws an error if only some of them are present.
    pub fn handshake(&self) -> Result<Option<Handshake>, MessageError> {
        match (self.identity_key, self.ephemeral_key) {
            (Some(identity_key), Some(ephemeral_key)) => Ok(Some(Handshake {
                identity_key,
                ephemeral_key,
                onetime_prekey_id: self.one_time_key_id,
            })),
            (None, None) if self.one_time_key_id.is_none() => Ok(None),
            _ => Err(MessageError::IncompleteHandshake),
        }
    }

    pub fn is_handshake(&self) -> bool {
        self.identity_key.is_some()
    }

    pub fn to_json(&self) -> Result<String, MessageError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<EncryptedMessage> for WirePacket {
    fn from(message: EncryptedMessage) -> Self {
        Self::new(message)
    }
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("packet contains an incomplete handshake")]
    IncompleteHandshake,

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
