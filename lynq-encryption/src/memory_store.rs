// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory implementation of all store traits.
use std::collections::HashMap;
use std::convert::Infallible;
use std::hash::Hash as StdHash;

use crate::key_bundle::PreKeyBundle;
use crate::traits::{BundleDirectory, IdentityStore, SessionStore};

#[derive(Clone, Debug)]
pub struct MemoryStore<ID> {
    identity: Option<Vec<u8>>,
    sessions: HashMap<ID, Vec<u8>>,
    bundles: HashMap<ID, PreKeyBundle>,
}

impl<ID> MemoryStore<ID> {
    pub fn new() -> Self {
        Self {
            identity: None,
            sessions: HashMap::new(),
            bundles: HashMap::new(),
        }
    }
}

impl<ID> Default for MemoryStore<ID> {
    fn default() -> Self {
        Self::new()
    }
}

impl<ID> IdentityStore for MemoryStore<ID> {
    type Error = Infallible;

    fn load_identity(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.identity.clone())
    }

    fn save_identity(&mut self, bytes: Vec<u8>) -> Result<(), Self::Error> {
        self.identity = Some(bytes);
        Ok(())
    }
}

impl<ID> SessionStore<ID> for MemoryStore<ID>
where
    ID: Eq + StdHash,
{
    type Error = Infallible;

    fn load_session(&self, id: &ID) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.sessions.get(id).cloned())
    }

    fn save_session(&mut self, id: ID, bytes: Vec<u8>) -> Result<(), Self::Error> {
        self.sessions.insert(id, bytes);
        Ok(())
    }

    fn delete_session(&mut self, id: &ID) -> Result<bool, Self::Error> {
        Ok(self.sessions.remove(id).is_some())
    }
}

impl<ID> BundleDirectory<ID> for MemoryStore<ID>
where
    ID: Eq + StdHash,
{
    type Error = Infallible;

    fn publish_bundle(&mut self, id: ID, bundle: PreKeyBundle) -> Result<(), Self::Error> {
        self.bundles.insert(id, bundle);
        Ok(())
    }

    fn fetch_bundle(&self, id: &ID) -> Result<Option<PreKeyBundle>, Self::Error> {
        Ok(self.bundles.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::crypto::Rng;
    use crate::key_manager::KeyManager;
    use crate::traits::{BundleDirectory, IdentityStore, SessionStore};

    use super::MemoryStore;

    #[test]
    fn sessions() {
        let mut store = MemoryStore::<u64>::new();
        assert_eq!(store.load_session(&1).unwrap(), None);

        store.save_session(1, vec![1, 2, 3]).unwrap();
        store.save_session(2, vec![4]).unwrap();
        store.save_session(1, vec![5, 6]).unwrap();
        assert_eq!(store.load_session(&1).unwrap(), Some(vec![5, 6]));
        assert_eq!(store.load_session(&2).unwrap(), Some(vec![4]));

        assert!(store.delete_session(&1).unwrap());
        assert!(!store.delete_session(&1).unwrap());
        assert_eq!(store.load_session(&1).unwrap(), None);
    }

    #[test]
    fn identity() {
        let mut store = MemoryStore::<u64>::default();
        assert_eq!(store.load_identity().unwrap(), None);
        store.save_identity(vec![7; 8]).unwrap();
        assert_eq!(store.load_identity().unwrap(), Some(vec![7; 8]));
    }

    #[test]
    fn bundles() {
        let rng = Rng::from_seed([1; 32]);
        let y = KeyManager::generate(&Config::default(), &rng).unwrap();
        let bundle = KeyManager::public_bundle(&y, None);

        let mut store = MemoryStore::new();
        assert_eq!(store.fetch_bundle(&"bob").unwrap(), None);
        store.publish_bundle("bob", bundle.clone()).unwrap();
        assert_eq!(store.fetch_bundle(&"bob").unwrap(), Some(bundle));
    }
}
