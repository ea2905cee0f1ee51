// SPDX-License-Identifier: MIT OR Apache-2.0

use zeroize::Zeroizing;

use crate::crypto::Secret;
use crate::crypto::hkdf::{HkdfError, hkdf};
use crate::crypto::hmac::{HmacError, hmac_sha256};
use crate::crypto::x25519::SHARED_SECRET_SIZE;

pub const ROOT_KEY_SIZE: usize = 32;

pub const CHAIN_KEY_SIZE: usize = 32;

pub const MESSAGE_KEY_SIZE: usize = 32;

/// ASCII string used as "info" for the root KDF.
pub const ROOT_KDF_INFO: &[u8; 17] = b"Lynq Root Key KDF";

const MESSAGE_KEY_CONSTANT: u8 = 0x01;

const CHAIN_KEY_CONSTANT: u8 = 0x02;

/// Mixes a Diffie-Hellman output into the root key, returning the next root key and a new chain
/// key.
pub fn kdf_root(
    root_key: &Secret<ROOT_KEY_SIZE>,
    dh_output: &Secret<SHARED_SECRET_SIZE>,
) -> Result<(Secret<ROOT_KEY_SIZE>, Secret<CHAIN_KEY_SIZE>), HkdfError> {
    let okm: Zeroizing<[u8; ROOT_KEY_SIZE + CHAIN_KEY_SIZE]> = Zeroizing::new(hkdf(
        root_key.as_bytes(),
        dh_output.as_bytes(),
        Some(ROOT_KDF_INFO),
    )?);

    let mut root_key = [0u8; ROOT_KEY_SIZE];
    root_key.copy_from_slice(&okm[..ROOT_KEY_SIZE]);
    let mut chain_key = [0u8; CHAIN_KEY_SIZE];
    chain_key.copy_from_slice(&okm[ROOT_KEY_SIZE..]);

    Ok((Secret::from_bytes(root_key), Secret::from_bytes(chain_key)))
}

/// Symmetric-key ratchet step, returning the next chain key and the message key.
pub fn kdf_chain(
    chain_key: &Secret<CHAIN_KEY_SIZE>,
) -> Result<(Secret<CHAIN_KEY_SIZE>, Secret<MESSAGE_KEY_SIZE>), HmacError> {
    let message_key = hmac_sha256(chain_key.as_bytes(), &[MESSAGE_KEY_CONSTANT])?;
    let next_chain_key = hmac_sha256(chain_key.as_bytes(), &[CHAIN_KEY_CONSTANT])?;
    Ok((
        Secret::from_bytes(next_chain_key),
        Secret::from_bytes(message_key),
    ))
}
