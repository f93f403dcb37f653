//! Per-context session bookkeeping built on top of [`ember_core::session::Session`].
//!
//! `ember_core::session::Session` only knows how to encrypt/decrypt once it
//! exists; it has no notion of "no session for this context" and its
//! pending-message queue only covers *outgoing* plaintext queued before
//! activation. This module adds the context-keyed map and the matching
//! *incoming*-ciphertext queue the decrypt path needs while pending.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use ember_core::session::{EncryptedMessage, Session, SessionState};
use ember_crypto::x25519::PublicKey;
use rand_core::{CryptoRng, RngCore};
use tokio::sync::Mutex;

use crate::context::ContextId;
use crate::error::{ContactError, Result};

/// Maximum number of received ciphertexts held per context while its
/// session is still pending.
const INCOMING_QUEUE_CAPACITY: usize = 256;

/// Outcome of decrypting an inbound [`EncryptedMessage`].
#[derive(Debug)]
pub enum DecryptOutcome {
    /// The session was active; here is the plaintext.
    Plaintext(Vec<u8>),
    /// The session is still pending; the ciphertext was queued for replay
    /// once it activates.
    Queued,
}

struct ManagedSession {
    session: Session,
    incoming_queue: VecDeque<EncryptedMessage>,
}

/// Tracks one [`Session`] per conversation context.
#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<ContextId, Arc<Mutex<ManagedSession>>>,
}

impl SessionManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True if a session already exists for `context_id`.
    #[must_use]
    pub fn contains(&self, context_id: &ContextId) -> bool {
        self.sessions.contains_key(context_id)
    }

    /// Begin a new session for `context_id`, returning this side's
    /// ephemeral public key to send in `InitiateContext`.
    ///
    /// # Errors
    ///
    /// Returns [`ContactError::InvalidState`] if a session already exists
    /// for this context.
    pub fn prepare<R: RngCore + CryptoRng>(
        &self,
        context_id: ContextId,
        rng: &mut R,
    ) -> Result<PublicKey> {
        if self.sessions.contains_key(&context_id) {
            return Err(ContactError::invalid_state(
                "session already exists for context",
            ));
        }
        let session = Session::prepare(rng);
        let public = *session.local_ephemeral_public();
        self.sessions.insert(
            context_id,
            Arc::new(Mutex::new(ManagedSession {
                session,
                incoming_queue: VecDeque::new(),
            })),
        );
        Ok(public)
    }

    /// Complete the handshake as the initiator, draining both the
    /// session's own outbound queue and this manager's incoming-ciphertext
    /// queue. Returns `(outbound_plaintexts, decrypted_incoming)` in
    /// arrival order.
    pub async fn activate_as_initiator(
        &self,
        context_id: &ContextId,
        peer_ephemeral_public: &PublicKey,
    ) -> Result<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
        self.activate(context_id, peer_ephemeral_public, true).await
    }

    /// Synthesize a fresh session as the recipient of a context, returning
    /// this side's ephemeral public key. Fails if a session already
    /// exists for the context.
    pub async fn activate_as_recipient<R: RngCore + CryptoRng>(
        &self,
        context_id: ContextId,
        peer_ephemeral_public: &PublicKey,
        rng: &mut R,
    ) -> Result<PublicKey> {
        if self.sessions.contains_key(&context_id) {
            return Err(ContactError::invalid_state(
                "session already exists for context",
            ));
        }
        let mut session = Session::prepare(rng);
        let public = *session.local_ephemeral_public();
        session.activate_as_recipient(peer_ephemeral_public)?;
        self.sessions.insert(
            context_id,
            Arc::new(Mutex::new(ManagedSession {
                session,
                incoming_queue: VecDeque::new(),
            })),
        );
        Ok(public)
    }

    async fn activate(
        &self,
        context_id: &ContextId,
        peer_ephemeral_public: &PublicKey,
        as_initiator: bool,
    ) -> Result<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
        let entry = self
            .sessions
            .get(context_id)
            .ok_or(ContactError::NoSession)?
            .clone();
        let mut managed = entry.lock().await;
        let outbound = if as_initiator {
            managed.session.activate_as_initiator(peer_ephemeral_public)?
        } else {
            managed.session.activate_as_recipient(peer_ephemeral_public)?
        };
        let queued: Vec<_> = managed.incoming_queue.drain(..).collect();
        let mut decrypted_incoming = Vec::with_capacity(queued.len());
        for message in queued {
            decrypted_incoming.push(managed.session.decrypt_for_session(&message)?);
        }
        Ok((outbound, decrypted_incoming))
    }

    /// Encrypt `plaintext` for `context_id`'s session.
    ///
    /// # Errors
    ///
    /// Returns [`ContactError::NoSession`] if no session exists for this
    /// context.
    pub async fn encrypt(
        &self,
        context_id: &ContextId,
        plaintext: &[u8],
    ) -> Result<Option<EncryptedMessage>> {
        let entry = self
            .sessions
            .get(context_id)
            .ok_or(ContactError::NoSession)?
            .clone();
        let mut managed = entry.lock().await;
        Ok(managed.session.encrypt_for_session(plaintext)?)
    }

    /// Decrypt an inbound [`EncryptedMessage`] for `context_id`.
    ///
    /// If the session is pending, the message is queued and
    /// [`DecryptOutcome::Queued`] is returned; the caller re-delivers it
    /// once an `activate_*` call reports it drained.
    ///
    /// # Errors
    ///
    /// Returns [`ContactError::NoSession`] if no session exists for this
    /// context — the caller must route this through the bootstrap command
    /// handler instead.
    pub async fn decrypt(
        &self,
        context_id: &ContextId,
        message: EncryptedMessage,
    ) -> Result<DecryptOutcome> {
        let entry = self
            .sessions
            .get(context_id)
            .ok_or(ContactError::NoSession)?
            .clone();
        let mut managed = entry.lock().await;
        if managed.session.state() == SessionState::Active {
            let plaintext = managed.session.decrypt_for_session(&message)?;
            return Ok(DecryptOutcome::Plaintext(plaintext));
        }
        if managed.incoming_queue.len() >= INCOMING_QUEUE_CAPACITY {
            managed.incoming_queue.pop_front();
        }
        managed.incoming_queue.push_back(message);
        Ok(DecryptOutcome::Queued)
    }

    /// Derive the per-transfer subkey for `context_id`.
    pub async fn file_transfer_key(
        &self,
        context_id: &ContextId,
        transfer_id: &[u8],
    ) -> Result<[u8; 32]> {
        let entry = self
            .sessions
            .get(context_id)
            .ok_or(ContactError::NoSession)?
            .clone();
        let managed = entry.lock().await;
        Ok(managed.session.get_file_transfer_key(transfer_id)?)
    }

    /// True if `context_id`'s session has completed its handshake.
    pub async fn is_active(&self, context_id: &ContextId) -> bool {
        let Some(entry) = self.sessions.get(context_id) else {
            return false;
        };
        let managed = entry.value().clone();
        let managed = managed.lock().await;
        managed.session.is_active()
    }

    /// Drop the session for `context_id`, if any (used by the tie-break
    /// rule: the losing side discards its own outstanding context).
    pub fn discard(&self, context_id: &ContextId) {
        self.sessions.remove(context_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[tokio::test]
    async fn prepare_twice_for_same_context_fails() {
        let manager = SessionManager::new();
        let ctx = ContextId::from_raw("ctx-a");
        manager.prepare(ctx.clone(), &mut OsRng).unwrap();
        assert!(manager.prepare(ctx, &mut OsRng).is_err());
    }

    #[tokio::test]
    async fn full_handshake_and_message_roundtrip() {
        let a = SessionManager::new();
        let b = SessionManager::new();
        let ctx = ContextId::from_raw("ctx-ab");

        let a_pub = a.prepare(ctx.clone(), &mut OsRng).unwrap();
        let b_pub = b
            .activate_as_recipient(ctx.clone(), &a_pub, &mut OsRng)
            .await
            .unwrap();
        let (drained_outbound, drained_incoming) =
            a.activate_as_initiator(&ctx, &b_pub).await.unwrap();
        assert!(drained_outbound.is_empty());
        assert!(drained_incoming.is_empty());

        let message = a.encrypt(&ctx, b"hello").await.unwrap().unwrap();
        match b.decrypt(&ctx, message).await.unwrap() {
            DecryptOutcome::Plaintext(plaintext) => assert_eq!(plaintext, b"hello"),
            DecryptOutcome::Queued => panic!("expected immediate plaintext"),
        }
    }

    #[tokio::test]
    async fn decrypt_while_pending_queues_and_drains_on_activate() {
        // `a` prepares its side of the context but has not yet learned
        // `b`'s ephemeral key, so `a`'s session is still pending.
        let a = SessionManager::new();
        let b = SessionManager::new();
        let ctx = ContextId::from_raw("ctx-queue");

        let a_pub = a.prepare(ctx.clone(), &mut OsRng).unwrap();
        let b_pub = b
            .activate_as_recipient(ctx.clone(), &a_pub, &mut OsRng)
            .await
            .unwrap();

        // `b` is active already and sends before `a` has processed the
        // acknowledgement carrying `b_pub`.
        let from_b = b.encrypt(&ctx, b"too-early").await.unwrap().unwrap();
        match a.decrypt(&ctx, from_b).await.unwrap() {
            DecryptOutcome::Queued => {}
            DecryptOutcome::Plaintext(_) => panic!("expected queued while pending"),
        }

        let (_, decrypted_incoming) = a.activate_as_initiator(&ctx, &b_pub).await.unwrap();
        assert_eq!(decrypted_incoming, vec![b"too-early".to_vec()]);
    }

    #[tokio::test]
    async fn decrypt_without_session_reports_no_session() {
        let manager = SessionManager::new();
        let ctx = ContextId::from_raw("ctx-missing");
        let message = EncryptedMessage {
            nonce: [0u8; 12],
            ciphertext: vec![0u8; 16],
        };
        assert!(matches!(
            manager.decrypt(&ctx, message).await,
            Err(ContactError::NoSession)
        ));
    }
}
