// SPDX-License-Identifier: MIT OR Apache-2.0

//! Public pre-key bundles which are published for others to start a session with us.
#[allow(clippy::module_inception)]
mod key_bundle;
mod prekey;

pub use key_bundle::{KeyBundleError, PreKeyBundle, verify_bundle};
pub use prekey::{OneTimePreKey, OneTimePreKeyId, SignedPreKey};
