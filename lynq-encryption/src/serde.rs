// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serde implementations for public key material.
//!
//! Keys and signatures are encoded as hex strings in human readable formats (JSON, used for bundle
//! exchange and the wire packet) and as raw bytes in binary formats (CBOR, used for persistence).
use serde::{Deserialize, Serialize};
use serde_bytes::{ByteBuf as SerdeByteBuf, Bytes as SerdeBytes};

use crate::crypto::ed25519::{Signature, VerifyingKey};
use crate::crypto::x25519::PublicKey;

/// Helper method for `serde` to serialize bytes into a hex string when using a human readable
/// encoding, otherwise it serializes the bytes directly.
pub fn serialize_hex<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if serializer.is_human_readable() {
        hex::serde::serialize(value, serializer)
    } else {
        SerdeBytes::new(value).serialize(serializer)
    }
}

/// Helper method for `serde` to deserialize from a hex string into bytes when using a human
/// readable encoding, otherwise it deserializes the bytes directly.
pub fn deserialize_hex<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    if deserializer.is_human_readable() {
        hex::serde::deserialize(deserializer)
    } else {
        let bytes = <SerdeByteBuf>::deserialize(deserializer)?;
        Ok(bytes.to_vec())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_hex(self.as_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = deserialize_hex(deserializer)?;

        bytes
            .as_slice()
            .try_into()
            .map_err(|err: crate::crypto::x25519::X25519Error| {
                serde::de::Error::custom(err.to_string())
            })
    }
}

impl Serialize for VerifyingKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_hex(self.as_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyingKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = deserialize_hex(deserializer)?;

        bytes
            .as_slice()
            .try_into()
            .map_err(|err: crate::crypto::ed25519::SignatureError| {
                serde::de::Error::custom(err.to_string())
            })
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_hex(self.as_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = deserialize_hex(deserializer)?;

        bytes
            .as_slice()
            .try_into()
            .map_err(|err: crate::crypto::ed25519::SignatureError| {
                serde::de::Error::custom(err.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use crate::cbor::{decode_cbor, encode_cbor};
    use crate::crypto::Rng;
    use crate::crypto::x25519::{PublicKey, SecretKey};

    #[test]
    fn hex_in_json() {
        let public_key = PublicKey::from_bytes([0xab; 32]);
        let json = serde_json::to_string(&public_key).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));

        let public_key_again: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(public_key, public_key_again);
    }

    #[test]
    fn bytes_in_cbor() {
        let rng = Rng::from_seed([1; 32]);
        let public_key = SecretKey::generate(&rng).unwrap().public_key();

        let bytes = encode_cbor(&public_key).unwrap();
        // Byte string header (2 bytes) and 32 raw bytes.
        assert_eq!(bytes.len(), 34);

        let public_key_again: PublicKey = decode_cbor(&bytes[..]).unwrap();
        assert_eq!(public_key, public_key_again);
    }

    #[test]
    fn invalid_length() {
        let json = format!("\"{}\"", "ab".repeat(31));
        assert!(serde_json::from_str::<PublicKey>(&json).is_err());
    }
}
