// SPDX-License-Identifier: MIT OR Apache-2.0

use std::error::Error;

use crate::key_bundle::PreKeyBundle;

/// Persists our own encoded key material.
pub trait IdentityStore {
    type Error: Error + Send + Sync + 'static;

    fn load_identity(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    fn save_identity(&mut self, bytes: Vec<u8>) -> Result<(), Self::Error>;
}

/// Persists one encoded session per peer.
///
/// Sessions are saved after every successful encryption or decryption.
pub trait SessionStore<ID> {
    type Error: Error + Send + Sync + 'static;

    fn load_session(&self, id: &ID) -> Result<Option<Vec<u8>>, Self::Error>;

    fn save_session(&mut self, id: ID, bytes: Vec<u8>) -> Result<(), Self::Error>;

    /// Removes the session, returns false if there was none.
    fn delete_session(&mut self, id: &ID) -> Result<bool, Self::Error>;
}

/// Out-of-band exchange of public pre-key bundles.
///
/// Fetched bundles are always verified locally before they are used.
pub trait BundleDirectory<ID> {
    type Error: Error + Send + Sync + 'static;

    fn publish_bundle(&mut self, id: ID, bundle: PreKeyBundle) -> Result<(), Self::Error>;

    fn fetch_bundle(&self, id: &ID) -> Result<Option<PreKeyBundle>, Self::Error>;
}
