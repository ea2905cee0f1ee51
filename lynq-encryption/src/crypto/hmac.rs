// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyed-hash message authentication code (HMAC) with SHA256.
//!
//! <https://www.rfc-editor.org/rfc/rfc2104>
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

pub const HMAC_SIZE: usize = 32;

type HmacSha256 = Hmac<Sha256>;

pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<[u8; HMAC_SIZE], HmacError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| HmacError::InvalidKeyLength)?;
    mac.update(message);
    let result = mac.finalize().into_bytes();
    let mut out = [0u8; HMAC_SIZE];
    out.copy_from_slice(&result);
    Ok(out)
}

#[derive(Debug, Error)]
pub enum HmacError {
    #[error("invalid hmac key length")]
    InvalidKeyLength,
}
