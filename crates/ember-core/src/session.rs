//! Session state machine: ephemeral X25519 handshake, AES-256-GCM transport.
//!
//! A session begins `Pending` the moment a context is opened with a peer and
//! becomes `Active` once both sides have exchanged ephemeral public keys and
//! derived the shared session key. Messages enqueued while `Pending` are
//! held in a bounded queue and drained in order once the session activates.

use std::collections::VecDeque;

use ember_crypto::aead::{self, AeadKey};
use ember_crypto::hash::derive_session_key;
use ember_crypto::x25519::{PrivateKey, PublicKey};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::node::error::{NodeError, Result};

/// Maximum number of messages held in a pending session's outbound queue
/// before the oldest is dropped to bound memory.
pub const PENDING_QUEUE_CAPACITY: usize = 256;

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Ephemeral keys exchanged, session key not yet derived.
    Pending,
    /// Session key derived; traffic may be encrypted and decrypted.
    Active,
}

/// An encrypted protocol message ready for transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedMessage {
    /// Nonce used for this ciphertext.
    pub nonce: [u8; aead::NONCE_SIZE],
    /// Ciphertext with the AES-GCM tag appended.
    pub ciphertext: Vec<u8>,
}

/// A session with a single remote peer context.
///
/// `prepare` is called when a context is opened; it generates this side's
/// ephemeral keypair. `activate_as_initiator`/`activate_as_recipient` consume
/// the peer's ephemeral public key and derive the session key, draining any
/// messages queued while the session was pending.
pub struct Session {
    state: SessionState,
    local_ephemeral: Option<PrivateKey>,
    local_ephemeral_public: PublicKey,
    key: Option<AeadKey>,
    pending_messages: VecDeque<Vec<u8>>,
    nonce_counter: u64,
}

impl Session {
    /// Begin a new session: generate this side's ephemeral X25519 keypair.
    pub fn prepare<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let local_ephemeral = PrivateKey::generate(rng);
        let local_ephemeral_public = local_ephemeral.public_key();
        Self {
            state: SessionState::Pending,
            local_ephemeral: Some(local_ephemeral),
            local_ephemeral_public,
            key: None,
            pending_messages: VecDeque::new(),
            nonce_counter: 0,
        }
    }

    /// This side's ephemeral public key, sent to the peer as part of context
    /// establishment.
    #[must_use]
    pub fn local_ephemeral_public(&self) -> &PublicKey {
        &self.local_ephemeral_public
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True once the session key has been derived.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    fn activate(&mut self, peer_ephemeral_public: &PublicKey) -> Result<Vec<Vec<u8>>> {
        let private = self
            .local_ephemeral
            .take()
            .ok_or_else(|| NodeError::invalid_state("session already activated"))?;

        let shared = private
            .exchange(peer_ephemeral_public)
            .ok_or_else(|| NodeError::handshake("degenerate shared secret"))?;

        let key = derive_session_key(shared.as_bytes());
        self.key = Some(AeadKey::from_bytes(key));
        self.state = SessionState::Active;

        Ok(self.pending_messages.drain(..).collect())
    }

    /// Complete the handshake as the peer who opened the context, deriving
    /// the session key from the peer's ephemeral public key. Returns any
    /// messages that were queued while pending, in send order.
    pub fn activate_as_initiator(&mut self, peer_ephemeral_public: &PublicKey) -> Result<Vec<Vec<u8>>> {
        self.activate(peer_ephemeral_public)
    }

    /// Complete the handshake as the peer who received the context, deriving
    /// the session key from the initiator's ephemeral public key. Returns
    /// any messages that were queued while pending, in send order.
    pub fn activate_as_recipient(&mut self, peer_ephemeral_public: &PublicKey) -> Result<Vec<Vec<u8>>> {
        self.activate(peer_ephemeral_public)
    }

    /// Encrypt `plaintext` for this session.
    ///
    /// If the session is still `Pending`, the plaintext is queued (dropping
    /// the oldest queued message if [`PENDING_QUEUE_CAPACITY`] is exceeded)
    /// and `Ok(None)` is returned; callers should re-check
    /// [`Session::is_active`] after activation to flush the queue.
    pub fn encrypt_for_session(
        &mut self,
        plaintext: &[u8],
    ) -> Result<Option<EncryptedMessage>> {
        if self.key.is_none() {
            if self.pending_messages.len() >= PENDING_QUEUE_CAPACITY {
                self.pending_messages.pop_front();
            }
            self.pending_messages.push_back(plaintext.to_vec());
            return Ok(None);
        }

        let nonce = self.next_nonce();
        let key = self.key.as_ref().expect("checked above");
        let ciphertext = aead::encrypt(key, &nonce, plaintext, &[])
            .map_err(|e| NodeError::Crypto(e.to_string()))?;
        Ok(Some(EncryptedMessage { nonce, ciphertext }))
    }

    /// Decrypt a message received over this session.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidState`] if the session has not yet
    /// activated, or a crypto error if authentication fails.
    pub fn decrypt_for_session(&self, message: &EncryptedMessage) -> Result<Vec<u8>> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| NodeError::invalid_state("session not active"))?;
        aead::decrypt(key, &message.nonce, &message.ciphertext, &[])
            .map_err(|e| NodeError::Crypto(e.to_string()))
    }

    /// Derive a per-transfer subkey from this session's key.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidState`] if the session is not active.
    pub fn get_file_transfer_key(&self, transfer_id: &[u8]) -> Result<[u8; 32]> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| NodeError::invalid_state("session not active"))?;
        Ok(ember_crypto::hash::derive_transfer_key(key.as_bytes(), transfer_id))
    }

    fn next_nonce(&mut self) -> [u8; aead::NONCE_SIZE] {
        let counter = self.nonce_counter;
        self.nonce_counter += 1;
        let mut nonce = [0u8; aead::NONCE_SIZE];
        nonce[4..].copy_from_slice(&counter.to_be_bytes());
        nonce
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn handshake_derives_matching_keys() {
        let mut a = Session::prepare(&mut OsRng);
        let mut b = Session::prepare(&mut OsRng);

        let a_pub = *a.local_ephemeral_public();
        let b_pub = *b.local_ephemeral_public();

        a.activate_as_initiator(&b_pub).unwrap();
        b.activate_as_recipient(&a_pub).unwrap();

        assert!(a.is_active());
        assert!(b.is_active());

        let msg = a.encrypt_for_session(b"hello").unwrap().unwrap();
        let plaintext = b.decrypt_for_session(&msg).unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn pending_messages_are_queued_then_drained() {
        let mut a = Session::prepare(&mut OsRng);
        let mut b = Session::prepare(&mut OsRng);
        let b_pub = *b.local_ephemeral_public();

        assert!(a.encrypt_for_session(b"queued-1").unwrap().is_none());
        assert!(a.encrypt_for_session(b"queued-2").unwrap().is_none());

        let drained = a.activate_as_initiator(&b_pub).unwrap();
        assert_eq!(drained, vec![b"queued-1".to_vec(), b"queued-2".to_vec()]);
    }

    #[test]
    fn pending_queue_drops_oldest_when_full() {
        let mut a = Session::prepare(&mut OsRng);
        for i in 0..(PENDING_QUEUE_CAPACITY + 5) {
            a.encrypt_for_session(format!("msg-{i}").as_bytes()).unwrap();
        }
        assert_eq!(a.pending_messages.len(), PENDING_QUEUE_CAPACITY);
        assert_eq!(a.pending_messages.front().unwrap(), b"msg-5");
    }

    #[test]
    fn decrypt_before_activation_fails() {
        let a = Session::prepare(&mut OsRng);
        let message = EncryptedMessage {
            nonce: [0u8; aead::NONCE_SIZE],
            ciphertext: vec![0u8; 16],
        };
        assert!(a.decrypt_for_session(&message).is_err());
    }

    #[test]
    fn transfer_key_requires_active_session() {
        let a = Session::prepare(&mut OsRng);
        assert!(a.get_file_transfer_key(b"transfer-1").is_err());
    }

    #[test]
    fn transfer_keys_differ_per_transfer() {
        let mut a = Session::prepare(&mut OsRng);
        let mut b = Session::prepare(&mut OsRng);
        let a_pub = *a.local_ephemeral_public();
        let b_pub = *b.local_ephemeral_public();
        a.activate_as_initiator(&b_pub).unwrap();
        b.activate_as_recipient(&a_pub).unwrap();

        let t1 = a.get_file_transfer_key(b"transfer-1").unwrap();
        let t2 = a.get_file_transfer_key(b"transfer-2").unwrap();
        assert_ne!(t1, t2);
        assert_eq!(t1, b.get_file_transfer_key(b"transfer-1").unwrap());
    }
}
