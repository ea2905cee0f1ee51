// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces to collaborators outside of the protocol core, like persistence backends or the
//! directory where pre-key bundles are published.
mod store;

pub use store::{BundleDirectory, IdentityStore, SessionStore};
