// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-peer orchestration of handshakes and Double Ratchet sessions.
//!
//! The session manager loads (or creates) our identity, runs X3DH on first contact in both
//! directions and encrypts or decrypts through the ratchet session of the peer. State is written
//! to the store only after an operation succeeded, a failed decryption leaves the persisted
//! session untouched.
//!
//! Until the initiator received the first reply, all its packets carry the handshake values. This
//! way the responder can establish the session even when the first packet got lost.
use std::fmt::Debug;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::config::Config;
use crate::crypto::Rng;
use crate::crypto::ed25519::VerifyingKey;
use crate::crypto::x25519::PublicKey;
use crate::key_bundle::{OneTimePreKeyId, PreKeyBundle};
use crate::key_manager::{KeyManager, KeyManagerError, KeyManagerState};
use crate::message::{Handshake, MessageError, WirePacket};
use crate::ratchet::{DoubleRatchet, RatchetError, RatchetState, SessionRole};
use crate::traits::{BundleDirectory, IdentityStore, SessionStore};
use crate::x3dh::{X3dhError, x3dh_initiate, x3dh_receive};

/// Persisted session of one peer.
#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    ratchet: RatchetState,
    pending_handshake: Option<Handshake>,
}

pub struct SessionManager<ID, S> {
    store: S,
    config: Config,
    rng: Rng,
    identity: KeyManagerState,
    _marker: PhantomData<ID>,
}

impl<ID, S> SessionManager<ID, S>
where
    ID: Clone + Debug,
    S: IdentityStore + SessionStore<ID>,
{
    /// Loads our identity from the store or generates and persists a new one.
    pub fn new(mut store: S, config: Config, rng: Rng) -> Result<Self, SessionManagerError> {
        let identity = match store.load_identity().map_err(store_error)? {
            Some(bytes) => {
                let identity = KeyManagerState::from_bytes(&bytes)?;
                debug!(
                    identity_key = %KeyManager::identity_key(&identity),
                    "loaded identity"
                );
                identity
            }
            None => {
                let identity = KeyManager::generate(&config, &rng)?;
                store
                    .save_identity(identity.to_bytes()?)
                    .map_err(store_error)?;
                debug!(
                    identity_key = %KeyManager::identity_key(&identity),
                    onetime_prekeys = config.onetime_prekeys,
                    "generated new identity"
                );
                identity
            }
        };

        Ok(Self {
            store,
            config,
            rng,
            identity,
            _marker: PhantomData,
        })
    }

    pub fn identity_key(&self) -> &VerifyingKey {
        KeyManager::identity_key(&self.identity)
    }

    pub fn identity_dh_key(&self) -> &PublicKey {
        KeyManager::identity_dh_key(&self.identity)
    }

    /// Returns our public pre-key bundle, see [`KeyManager::public_bundle`].
    pub fn public_bundle(&self, onetime_id: Option<OneTimePreKeyId>) -> PreKeyBundle {
        KeyManager::public_bundle(&self.identity, onetime_id)
    }

    /// Publishes our current pre-key bundle under our id.
    pub fn publish_bundle<D>(&self, directory: &mut D, our_id: ID) -> Result<(), SessionManagerError>
    where
        D: BundleDirectory<ID>,
    {
        directory
            .publish_bundle(our_id, self.public_bundle(None))
            .map_err(store_error)
    }

    /// Tops up the pool of one-time pre-keys to the configured size.
    pub fn refill_onetime_prekeys(&mut self) -> Result<usize, SessionManagerError> {
        let target = self.config.onetime_prekeys as usize;
        let missing = target.saturating_sub(self.identity.onetime_prekeys_len());
        if missing == 0 {
            return Ok(0);
        }

        let mut identity = self.identity.clone();
        for _ in 0..missing {
            let (identity_i, _) = KeyManager::generate_onetime_prekey(identity, &self.rng)?;
            identity = identity_i;
        }
        self.save_identity(identity)?;

        debug!(count = missing, "generated new one-time pre-keys");
        Ok(missing)
    }

    pub fn has_session(&self, peer: &ID) -> Result<bool, SessionManagerError> {
        Ok(self.store.load_session(peer).map_err(store_error)?.is_some())
    }

    /// Encrypts a message for the peer.
    ///
    /// Without an existing session the peer's pre-key bundle is required to run the handshake.
    pub fn encrypt(
        &mut self,
        peer: &ID,
        plaintext: &[u8],
        bundle: Option<&PreKeyBundle>,
    ) -> Result<WirePacket, SessionManagerError> {
        let record = match self.load_session(peer)? {
            Some(record) => record,
            None => {
                let bundle = bundle.ok_or(SessionManagerError::MissingPreKeyBundle)?;
                let output = x3dh_initiate(
                    KeyManager::identity_dh_secret(&self.identity),
                    bundle,
                    &self.rng,
                )?;
                let ratchet = DoubleRatchet::init(
                    output.shared_secret,
                    SessionRole::Initiator {
                        their_ratchet_key: *bundle.signed_prekey(),
                    },
                    &self.config,
                    &self.rng,
                )?;

                debug!(
                    ?peer,
                    onetime_prekey_id = ?output.onetime_prekey_id,
                    "started new session"
                );

                SessionRecord {
                    ratchet,
                    pending_handshake: Some(Handshake {
                        identity_key: *self.identity_dh_key(),
                        ephemeral_key: output.ephemeral_key,
                        onetime_prekey_id: output.onetime_prekey_id,
                    }),
                }
            }
        };

        let (ratchet, message) = DoubleRatchet::encrypt(record.ratchet, plaintext, &self.rng)?;
        let packet = match record.pending_handshake {
            Some(handshake) => WirePacket::with_handshake(message, handshake),
            None => WirePacket::new(message),
        };

        self.save_session(
            peer,
            SessionRecord {
                ratchet,
                pending_handshake: record.pending_handshake,
            },
        )?;

        Ok(packet)
    }

    /// Decrypts a packet from the peer.
    ///
    /// Without an existing session the packet needs to carry the handshake values of the peer.
    /// The used one-time pre-key is removed from our identity.
    pub fn decrypt(
        &mut self,
        peer: &ID,
        packet: &WirePacket,
    ) -> Result<Vec<u8>, SessionManagerError> {
        let (record, identity) = match self.load_session(peer)? {
            Some(record) => (record, None),
            None => {
                let handshake = packet
                    .handshake()?
                    .ok_or(SessionManagerError::MissingHandshake)?;
                let (identity, shared_secret) = x3dh_receive(
                    self.identity.clone(),
                    &handshake.identity_key,
                    &handshake.ephemeral_key,
                    handshake.onetime_prekey_id,
                )?;
                let ratchet = DoubleRatchet::init(
                    shared_secret,
                    SessionRole::Responder {
                        our_ratchet_secret: KeyManager::signed_prekey_secret(&identity).clone(),
                    },
                    &self.config,
                    &self.rng,
                )?;

                debug!(
                    ?peer,
                    onetime_prekey_id = ?handshake.onetime_prekey_id,
                    "accepted new session"
                );

                let record = SessionRecord {
                    ratchet,
                    pending_handshake: None,
                };
                (record, Some(identity))
            }
        };

        let (ratchet, plaintext) =
            match DoubleRatchet::decrypt(record.ratchet, &packet.message(), &self.rng) {
                Ok(result) => result,
                Err(err) => {
                    warn!(?peer, "could not decrypt message: {err}");
                    return Err(err.into());
                }
            };

        // Handshake is not needed anymore after the peer answered.
        let pending_handshake = if ratchet.has_recv_chain() {
            None
        } else {
            record.pending_handshake
        };

        if let Some(identity) = identity {
            self.save_identity(identity)?;
        }
        self.save_session(
            peer,
            SessionRecord {
                ratchet,
                pending_handshake,
            },
        )?;

        Ok(plaintext)
    }

    /// Removes the session with the peer. The next message needs a new handshake.
    pub fn delete_session(&mut self, peer: &ID) -> Result<bool, SessionManagerError> {
        let deleted = self.store.delete_session(peer).map_err(store_error)?;
        if deleted {
            debug!(?peer, "deleted session");
        }
        Ok(deleted)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn load_session(&self, peer: &ID) -> Result<Option<SessionRecord>, SessionManagerError> {
        match self.store.load_session(peer).map_err(store_error)? {
            Some(bytes) => Ok(Some(decode_cbor(&bytes[..])?)),
            None => Ok(None),
        }
    }

    fn save_session(
        &mut self,
        peer: &ID,
        record: SessionRecord,
    ) -> Result<(), SessionManagerError> {
        let bytes = encode_cbor(&record)?;
        self.store
            .save_session(peer.clone(), bytes)
            .map_err(store_error)
    }

    fn save_identity(&mut self, identity: KeyManagerState) -> Result<(), SessionManagerError> {
        self.store
            .save_identity(identity.to_bytes()?)
            .map_err(store_error)?;
        self.identity = identity;
        Ok(())
    }
}

fn store_error<E: std::error::Error + Send + Sync + 'static>(err: E) -> SessionManagerError {
    SessionManagerError::Store(Box::new(err))
}

#[derive(Debug, Error)]
pub enum SessionManagerError {
    #[error("pre-key bundle of peer is required to start a new session")]
    MissingPreKeyBundle,

    #[error("no session with peer and packet does not start a new one")]
    MissingHandshake,

    /// Error of the store backend, can be downcast to the concrete type.
    #[error("store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    KeyManager(#[from] KeyManagerError),

    #[error(transparent)]
    X3dh(#[from] X3dhError),

    #[error(transparent)]
    Ratchet(#[from] RatchetError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::error::Error as StdError;

    use assert_matches::assert_matches;
    use thiserror::Error;

    use crate::config::Config;
    use crate::crypto::Rng;
    use crate::key_bundle::PreKeyBundle;
    use crate::memory_store::MemoryStore;
    use crate::message::WirePacket;
    use crate::ratchet::RatchetError;
    use crate::test_utils::setup_logging;
    use crate::traits::{BundleDirectory, IdentityStore, SessionStore};
    use crate::x3dh::X3dhError;

    use super::{SessionManager, SessionManagerError};

    type Manager = SessionManager<&'static str, MemoryStore<&'static str>>;

    fn manager(seed: u8) -> Manager {
        SessionManager::new(
            MemoryStore::new(),
            Config::default(),
            Rng::from_seed([seed; 32]),
        )
        .unwrap()
    }

    #[test]
    fn first_contact_and_reply() {
        setup_logging();

        let mut directory = MemoryStore::new();
        let mut alice = manager(1);
        let mut bob = manager(2);

        bob.publish_bundle(&mut directory, "bob").unwrap();
        let bob_bundle = directory.fetch_bundle(&"bob").unwrap().unwrap();

        let packet = alice.encrypt(&"bob", b"hello", Some(&bob_bundle)).unwrap();
        let handshake = packet.handshake().unwrap().unwrap();
        assert_eq!(&handshake.identity_key, alice.identity_dh_key());
        assert_eq!(handshake.onetime_prekey_id, Some(0));

        // Packets travel as JSON.
        let packet = WirePacket::from_json(&packet.to_json().unwrap()).unwrap();
        assert_eq!(bob.decrypt(&"alice", &packet).unwrap(), b"hello");

        // Bob's one-time pre-key got consumed.
        assert_eq!(bob.public_bundle(None).onetime_prekey_id(), Some(1));
        assert_eq!(bob.public_bundle(Some(0)).onetime_prekey_id(), None);

        // Bob answers without any bundle, the session exists already.
        let reply = bob.encrypt(&"alice", b"hi alice", None).unwrap();
        assert!(!reply.is_handshake());
        assert_eq!(alice.decrypt(&"bob", &reply).unwrap(), b"hi alice");

        // Alice doesn't send handshake values anymore after she received an answer.
        let packet = alice.encrypt(&"bob", b"how are you?", None).unwrap();
        assert!(!packet.is_handshake());
        assert_eq!(bob.decrypt(&"alice", &packet).unwrap(), b"how are you?");
    }

    #[test]
    fn first_contact_other_direction() {
        let mut alice = manager(1);
        let mut bob = manager(2);

        let alice_bundle = alice.public_bundle(None);
        let packet = bob.encrypt(&"alice", b"hello", Some(&alice_bundle)).unwrap();
        assert_eq!(alice.decrypt(&"bob", &packet).unwrap(), b"hello");

        let reply = alice.encrypt(&"bob", b"hello back", None).unwrap();
        assert_eq!(bob.decrypt(&"alice", &reply).unwrap(), b"hello back");
    }

    #[test]
    fn lost_first_packet() {
        let mut alice = manager(1);
        let mut bob = manager(2);
        let bob_bundle = bob.public_bundle(None);

        let packet_1 = alice.encrypt(&"bob", b"one", Some(&bob_bundle)).unwrap();
        let packet_2 = alice.encrypt(&"bob", b"two", None).unwrap();
        assert!(packet_1.is_handshake());
        assert!(packet_2.is_handshake());

        // Second packet arrives first and starts the session.
        assert_eq!(bob.decrypt(&"alice", &packet_2).unwrap(), b"two");
        assert_eq!(bob.decrypt(&"alice", &packet_1).unwrap(), b"one");
    }

    #[test]
    fn missing_handshake_material() {
        let mut alice = manager(1);
        let mut bob = manager(2);

        assert_matches!(
            alice.encrypt(&"bob", b"hello", None),
            Err(SessionManagerError::MissingPreKeyBundle)
        );

        // Charlie answers Dave, Bob receives this packet without having any session.
        let mut charlie = manager(3);
        let mut dave = manager(4);
        let packet = dave
            .encrypt(&"charlie", b"hi", Some(&charlie.public_bundle(None)))
            .unwrap();
        charlie.decrypt(&"dave", &packet).unwrap();
        let reply = charlie.encrypt(&"dave", b"no handshake", None).unwrap();

        assert_matches!(
            bob.decrypt(&"charlie", &reply),
            Err(SessionManagerError::MissingHandshake)
        );
    }

    #[test]
    fn invalid_bundle() {
        let mut alice = manager(1);
        let bob = manager(2);
        let charlie = manager(3);

        // Bob's keys with Charlie's signatures.
        let bob_bundle = bob.public_bundle(None);
        let charlie_bundle = charlie.public_bundle(None);
        let json = bob_bundle.to_json().unwrap().replace(
            &bob_bundle.identity_key().to_hex(),
            &charlie_bundle.identity_key().to_hex(),
        );
        let forged = PreKeyBundle::from_json(&json).unwrap();

        assert_matches!(
            alice.encrypt(&"bob", b"hello", Some(&forged)),
            Err(SessionManagerError::X3dh(X3dhError::SignatureInvalid))
        );
        assert!(!alice.has_session(&"bob").unwrap());
    }

    #[test]
    fn persistence() {
        let mut alice = manager(1);
        let mut bob = manager(2);
        let bob_identity = *bob.identity_dh_key();
        let bob_bundle = bob.public_bundle(None);

        let packet = alice.encrypt(&"bob", b"one", Some(&bob_bundle)).unwrap();
        assert_eq!(bob.decrypt(&"alice", &packet).unwrap(), b"one");

        // Restart Bob with his store, identity and session are restored.
        let mut bob = SessionManager::new(
            bob.into_store(),
            Config::default(),
            Rng::from_seed([5; 32]),
        )
        .unwrap();
        assert_eq!(bob.identity_dh_key(), &bob_identity);
        assert_eq!(bob.public_bundle(None).onetime_prekey_id(), Some(1));
        assert!(bob.has_session(&"alice").unwrap());

        let packet = alice.encrypt(&"bob", b"two", None).unwrap();
        assert_eq!(bob.decrypt(&"alice", &packet).unwrap(), b"two");

        let reply = bob.encrypt(&"alice", b"three", None).unwrap();
        assert_eq!(alice.decrypt(&"bob", &reply).unwrap(), b"three");
    }

    #[test]
    fn nothing_persisted_on_failure() {
        let mut alice = manager(1);
        let mut bob = manager(2);
        let bob_bundle = bob.public_bundle(None);

        let packet = alice.encrypt(&"bob", b"one", Some(&bob_bundle)).unwrap();

        // Tampered first packet neither creates a session nor consumes the one-time pre-key.
        let mut tampered = packet.message();
        tampered.ciphertext[15] ^= 1;
        let tampered = WirePacket::with_handshake(
            tampered,
            packet.handshake().unwrap().unwrap(),
        );
        assert_matches!(
            bob.decrypt(&"alice", &tampered),
            Err(SessionManagerError::Ratchet(
                RatchetError::AuthenticationFailed
            ))
        );
        assert!(!bob.has_session(&"alice").unwrap());
        assert_eq!(bob.public_bundle(Some(0)).onetime_prekey_id(), Some(0));

        assert_eq!(bob.decrypt(&"alice", &packet).unwrap(), b"one");
        let session = bob.store().load_session(&"alice").unwrap();

        // Failing decryption on an existing session leaves it untouched.
        let packet = alice.encrypt(&"bob", b"two", None).unwrap();
        let mut tampered = packet.message();
        tampered.header.pn ^= 1;
        let tampered = WirePacket::new(tampered);
        assert!(bob.decrypt(&"alice", &tampered).is_err());
        assert_eq!(bob.store().load_session(&"alice").unwrap(), session);

        assert_eq!(bob.decrypt(&"alice", &packet).unwrap(), b"two");
        assert_ne!(bob.store().load_session(&"alice").unwrap(), session);
    }

    #[test]
    fn delete_and_refill() {
        let mut alice = manager(1);
        let mut bob = manager(2);

        let packet = alice
            .encrypt(&"bob", b"one", Some(&bob.public_bundle(None)))
            .unwrap();
        bob.decrypt(&"alice", &packet).unwrap();

        assert!(alice.delete_session(&"bob").unwrap());
        assert!(!alice.delete_session(&"bob").unwrap());
        assert_matches!(
            alice.encrypt(&"bob", b"two", None),
            Err(SessionManagerError::MissingPreKeyBundle)
        );

        assert_eq!(bob.refill_onetime_prekeys().unwrap(), 1);
        assert_eq!(bob.refill_onetime_prekeys().unwrap(), 0);
        assert_eq!(bob.public_bundle(None).onetime_prekey_id(), Some(1));
        assert_eq!(bob.public_bundle(Some(5)).onetime_prekey_id(), Some(5));
    }

    #[derive(Debug, Error)]
    #[error("disk full")]
    struct DiskFull;

    /// Keeps the identity in memory but refuses to save any session.
    struct DiskFullStore(MemoryStore<&'static str>);

    impl IdentityStore for DiskFullStore {
        type Error = Infallible;

        fn load_identity(&self) -> Result<Option<Vec<u8>>, Self::Error> {
            self.0.load_identity()
        }

        fn save_identity(&mut self, bytes: Vec<u8>) -> Result<(), Self::Error> {
            self.0.save_identity(bytes)
        }
    }

    impl SessionStore<&'static str> for DiskFullStore {
        type Error = DiskFull;

        fn load_session(&self, _id: &&'static str) -> Result<Option<Vec<u8>>, Self::Error> {
            Ok(None)
        }

        fn save_session(&mut self, _id: &'static str, _bytes: Vec<u8>) -> Result<(), Self::Error> {
            Err(DiskFull)
        }

        fn delete_session(&mut self, _id: &&'static str) -> Result<bool, Self::Error> {
            Ok(false)
        }
    }

    #[test]
    fn typed_store_error() {
        let mut alice = SessionManager::new(
            DiskFullStore(MemoryStore::new()),
            Config::default(),
            Rng::from_seed([1; 32]),
        )
        .unwrap();
        let bob = manager(2);

        let Err(err) = alice.encrypt(&"bob", b"hello", Some(&bob.public_bundle(None))) else {
            panic!("session should not be saved");
        };
        assert_eq!(err.to_string(), "store error: disk full");
        assert!(err.source().unwrap().downcast_ref::<DiskFull>().is_some());
        assert_matches!(err, SessionManagerError::Store(inner) if inner.is::<DiskFull>());
    }
}
