// SPDX-License-Identifier: MIT OR Apache-2.0

//! ChaCha20-Poly1305 authenticated symmetric encryption with additional data (AEAD) with 256-bit
//! key, 128-bit tag and 96-bit nonce.
//!
//! <https://www.rfc-editor.org/rfc/rfc8439>
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use thiserror::Error;

pub const AEAD_NONCE_SIZE: usize = 12;

pub const AEAD_KEY_SIZE: usize = 32;

pub const AEAD_TAG_SIZE: usize = 16;

pub type AeadNonce = [u8; AEAD_NONCE_SIZE];

pub type AeadKey = [u8; AEAD_KEY_SIZE];

pub fn aead_encrypt(
    key: &AeadKey,
    plaintext: &[u8],
    nonce: AeadNonce,
    aad: Option<&[u8]>,
) -> Result<Vec<u8>, AeadError> {
    let key = Key::from_slice(key);
    let nonce = Nonce::from_slice(&nonce);
    let mut ciphertext: Vec<u8> = Vec::from(plaintext);

    // Authentication tag gets attached to the end of the ciphertext.
    let cipher = ChaCha20Poly1305::new(key);
    cipher
        .encrypt_in_place(nonce, aad.unwrap_or_default(), &mut ciphertext)
        .map_err(AeadError::Encrypt)?;

    Ok(ciphertext)
}

pub fn aead_decrypt(
    key: &AeadKey,
    ciphertext_tag: &[u8],
    nonce: AeadNonce,
    aad: Option<&[u8]>,
) -> Result<Vec<u8>, AeadError> {
    if ciphertext_tag.len() < AEAD_TAG_SIZE {
        return Err(AeadError::InvalidLength(ciphertext_tag.len()));
    }

    let key = Key::from_slice(key);
    let nonce = Nonce::from_slice(&nonce);
    let mut plaintext: Vec<u8> = Vec::from(ciphertext_tag);

    let cipher = ChaCha20Poly1305::new(key);
    cipher
        .decrypt_in_place(nonce, aad.unwrap_or_default(), &mut plaintext)
        .map_err(AeadError::Decrypt)?;

    Ok(plaintext)
}

#[derive(Debug, Error)]
pub enum AeadError {
    #[error("could not encrypt with chacha20poly1305 aead: {0}")]
    Encrypt(chacha20poly1305::Error),

    #[error("could not decrypt with chacha20poly1305 aead: {0}")]
    Decrypt(chacha20poly1305::Error),

    #[error("ciphertext of {0} bytes is shorter than the authentication tag")]
    InvalidLength(usize),
}

#[cfg(test)]
mod tests {
    use crate::crypto::Rng;

    use super::{AeadError, AeadKey, AeadNonce, aead_decrypt, aead_encrypt};

    #[test]
    fn encrypt_decrypt() {
        let rng = Rng::from_seed([1; 32]);

        let key: AeadKey = rng.random_array().unwrap();
        let nonce: AeadNonce = rng.random_array().unwrap();

        let ciphertext = aead_encrypt(&key, b"Hello, Lynq!", nonce, Some(b"header")).unwrap();
        let plaintext = aead_decrypt(&key, &ciphertext, nonce, Some(b"header")).unwrap();

        assert_eq!(plaintext, b"Hello, Lynq!");
    }

    #[test]
    fn decryption_failed() {
        let rng = Rng::from_seed([1; 32]);

        let key: AeadKey = rng.random_array().unwrap();
        let nonce: AeadNonce = rng.random_array().unwrap();

        let ciphertext = aead_encrypt(&key, b"Hello, Lynq!", nonce, Some(b"header")).unwrap();

        let invalid_key: AeadKey = rng.random_array().unwrap();
        assert!(matches!(
            aead_decrypt(&invalid_key, &ciphertext, nonce, Some(b"header")),
            Err(AeadError::Decrypt(_))
        ));

        // Associated data is authenticated as well.
        assert!(matches!(
            aead_decrypt(&key, &ciphertext, nonce, Some(b"other header")),
            Err(AeadError::Decrypt(_))
        ));

        assert!(matches!(
            aead_decrypt(&key, &ciphertext[..10], nonce, Some(b"header")),
            Err(AeadError::InvalidLength(10))
        ));
    }
}
