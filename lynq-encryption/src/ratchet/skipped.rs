// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::crypto::Secret;
use crate::crypto::x25519::PublicKey;
use crate::ratchet::MESSAGE_KEY_SIZE;

/// Bounded cache of message keys which were derived while catching up a receiving chain.
///
/// Keys are looked up by the ratchet public key of the chain they belong to and their message
/// index. When the bound is exceeded, the oldest inserted key is evicted.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "test_utils"), derive(Clone))]
pub struct SkippedKeys {
    keys: VecDeque<SkippedKey>,
    max_len: usize,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "test_utils"), derive(Clone))]
struct SkippedKey {
    ratchet_key: PublicKey,
    n: u32,
    message_key: Secret<MESSAGE_KEY_SIZE>,
}

impl SkippedKeys {
    pub fn new(max_len: usize) -> Self {
        Self {
            keys: VecDeque::with_capacity(max_len),
            max_len,
        }
    }

    pub(crate) fn insert(
        &mut self,
        ratchet_key: PublicKey,
        n: u32,
        message_key: Secret<MESSAGE_KEY_SIZE>,
    ) {
        self.keys.push_back(SkippedKey {
            ratchet_key,
            n,
            message_key,
        });
        while self.keys.len() > self.max_len {
            self.keys.pop_front();
        }
    }

    /// Removes and returns the message key for the given chain and index.
    pub(crate) fn take(
        &mut self,
        ratchet_key: &PublicKey,
        n: u32,
    ) -> Option<Secret<MESSAGE_KEY_SIZE>> {
        let index = self
            .keys
            .iter()
            .position(|key| key.n == n && &key.ratchet_key == ratchet_key)?;
        self.keys.remove(index).map(|key| key.message_key)
    }

    pub fn contains(&self, ratchet_key: &PublicKey, n: u32) -> bool {
        self.keys
            .iter()
            .any(|key| key.n == n && &key.ratchet_key == ratchet_key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::crypto::x25519::PublicKey;
    use crate::crypto::{Rng, Secret};

    use super::SkippedKeys;

    #[test]
    fn take_once() {
        let rng = Rng::from_seed([1; 32]);
        let key_a = PublicKey::from_bytes([1; 32]);
        let key_b = PublicKey::from_bytes([2; 32]);
        let message_key = Secret::from_bytes(rng.random_array().unwrap());

        let mut skipped = SkippedKeys::new(20);
        skipped.insert(key_a, 3, message_key.clone());

        // Lookup needs exact key and index.
        assert!(skipped.take(&key_b, 3).is_none());
        assert!(skipped.take(&key_a, 4).is_none());
        assert!(skipped.contains(&key_a, 3));

        assert_eq!(skipped.take(&key_a, 3), Some(message_key));
        assert!(skipped.take(&key_a, 3).is_none());
        assert!(skipped.is_empty());
    }

    #[test]
    fn evict_oldest() {
        let rng = Rng::from_seed([1; 32]);
        let key = PublicKey::from_bytes([1; 32]);

        let mut skipped = SkippedKeys::new(3);
        for n in 0..5 {
            skipped.insert(key, n, Secret::from_bytes(rng.random_array().unwrap()));
        }

        assert_eq!(skipped.len(), 3);
        assert!(!skipped.contains(&key, 0));
        assert!(!skipped.contains(&key, 1));
        assert!(skipped.contains(&key, 2));
        assert!(skipped.contains(&key, 4));
    }
}
