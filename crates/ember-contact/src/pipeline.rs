//! Inbound signed-command processing (spec §4.2/§5): the consumer side of
//! [`crate::command::verify_signed_command`] that turns verified
//! `InitiateContext`/`AcknowledgeContext`/`DiscloseProfile`/`AddMembers`/
//! `RemoveMembers` commands into [`SessionManager`] and [`ContactStore`]
//! state, plus the matching outbound half that issues a fresh
//! `InitiateContext`.
//!
//! Drains [`Controller::take_event_receiver`]'s queue for
//! [`ControllerEvent::NewMessage`] events tagged
//! [`MessageType::SignedCommand`]; every other event is ignored here (chat
//! content and file control ride `SecureEnvelope` and are handled above
//! this layer).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use ember_core::node::controller::{Controller, ControllerEvent};
use ember_core::node::dispatch::MessageType;
use ember_crypto::identity::{Identity, PeerId};
use ember_crypto::x25519::PublicKey;
use rand_core::OsRng;
use tokio::sync::mpsc;

use crate::command::{verify_signed_command, Command, CommandPayload, SequenceTracker, SignedCommand};
use crate::context::{is_tie_break_initiator, ContextId};
use crate::error::Result;
use crate::profile::Profile;
use crate::session_manager::SessionManager;
use crate::{Contact, ContactStatus, ContactStore};

/// Cipher suite name every `InitiateContext` currently advertises. A
/// string, not an enum, so a future suite negotiation is not a wire break.
const CRYPTO_SUITE_X25519_AES256GCM: &str = "x25519-aes256gcm";

/// Turns verified signed commands into session and contact state, and
/// issues the local node's own context-mutation commands.
pub struct CommandPipeline {
    identity: Arc<Identity>,
    sessions: Arc<SessionManager>,
    contacts: Arc<ContactStore>,
    controller: Arc<Controller>,
    inbound_sequences: SequenceTracker,
    outbound_sequences: DashMap<ContextId, AtomicU64>,
}

impl CommandPipeline {
    /// Build a pipeline over the given identity, session manager, contact
    /// store, and controller (used both to receive events and to send the
    /// commands this side issues).
    #[must_use]
    pub fn new(
        identity: Arc<Identity>,
        sessions: Arc<SessionManager>,
        contacts: Arc<ContactStore>,
        controller: Arc<Controller>,
    ) -> Self {
        Self {
            identity,
            sessions,
            contacts,
            controller,
            inbound_sequences: SequenceTracker::new(),
            outbound_sequences: DashMap::new(),
        }
    }

    /// Drain `events` until the controller drops its sending half,
    /// processing every `SignedCommand` frame in arrival order. Intended
    /// to run as a background task alongside `Node::run_receive_loop`.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<ControllerEvent>) {
        while let Some(event) = events.recv().await {
            let ControllerEvent::NewMessage {
                sender_id,
                message_type,
                data,
            } = event
            else {
                continue;
            };
            if message_type != MessageType::SignedCommand.tag() {
                continue;
            }
            if let Err(err) = self.handle_signed_command(sender_id, &data).await {
                tracing::debug!(sender = %sender_id, error = %err, "dropping invalid signed command");
            }
        }
    }

    /// Begin a new 1-to-1 context with `peer_id`: prepares this side's
    /// session, signs an `InitiateContext`, and sends it unencrypted (no
    /// session exists yet to encrypt under).
    ///
    /// # Errors
    ///
    /// Returns an error if a session already exists for this pair, or if
    /// the send fails (no route to `peer_id`, or no transport configured).
    pub async fn initiate_contact(&self, peer_id: PeerId, sender_profile: Profile) -> Result<()> {
        let context_id = ContextId::for_pair(&self.identity.peer_id(), &peer_id);
        let ephemeral_public = self.sessions.prepare(context_id.clone(), &mut OsRng)?;

        self.contacts.upsert(Contact::from_profile(
            peer_id,
            &sender_profile,
            ContactStatus::Connecting,
        ));

        let command = Command {
            context_id: context_id.as_str().to_string(),
            sequence_number: self.next_outbound_sequence(&context_id),
            payload: CommandPayload::InitiateContext {
                initial_members: vec![],
                sender_profile,
                ephemeral_public_key: ephemeral_public.to_bytes(),
                chosen_crypto_suite: CRYPTO_SUITE_X25519_AES256GCM.to_string(),
            },
        };
        self.sign_and_send(&peer_id, &command).await
    }

    async fn handle_signed_command(&self, sender_id: PeerId, data: &[u8]) -> Result<()> {
        let signed = SignedCommand::decode(data)?;
        let verified = verify_signed_command(&signed, &sender_id)?;
        self.inbound_sequences.accept(
            &verified.author,
            &verified.context_id,
            verified.command.sequence_number,
        )?;

        match verified.command.payload {
            CommandPayload::InitiateContext {
                sender_profile,
                ephemeral_public_key,
                ..
            } => {
                self.on_initiate_context(verified.author, verified.context_id, sender_profile, ephemeral_public_key)
                    .await
            }
            CommandPayload::AcknowledgeContext {
                sender_profile,
                ephemeral_public_key,
            } => {
                self.on_acknowledge_context(
                    verified.author,
                    &verified.context_id,
                    sender_profile,
                    ephemeral_public_key,
                )
                .await
            }
            CommandPayload::DiscloseProfile { profile } => {
                self.on_disclose_profile(verified.author, profile);
                Ok(())
            }
            CommandPayload::AddMembers { members } => {
                self.on_membership_change(members, true);
                Ok(())
            }
            CommandPayload::RemoveMembers { members } => {
                self.on_membership_change(members, false);
                Ok(())
            }
        }
    }

    /// Spec §5's simultaneous-mutual-initiate rule: if a session for this
    /// context is already pending (we sent our own `InitiateContext`
    /// first), the tie-break decides which side's stays authoritative.
    /// Otherwise this is a plain first contact.
    async fn on_initiate_context(
        &self,
        author: PeerId,
        context_id: ContextId,
        sender_profile: Profile,
        ephemeral_public_key: [u8; 32],
    ) -> Result<()> {
        if self.sessions.contains(&context_id) {
            if self.sessions.is_active(&context_id).await {
                // A single pending InitiateContext per context: a
                // duplicate arriving after the session is already active
                // is dropped.
                return Ok(());
            }
            let local = self.identity.peer_id();
            if is_tie_break_initiator(&local, &author) {
                // Our own outstanding InitiateContext stays authoritative;
                // the duplicate inbound one is ignored.
                return Ok(());
            }
            // We lose the tie-break: discard our own outstanding context
            // and fall through to respond as recipient.
            self.sessions.discard(&context_id);
        }

        let peer_ephemeral = PublicKey::from_bytes(ephemeral_public_key);
        let local_ephemeral = self
            .sessions
            .activate_as_recipient(context_id.clone(), &peer_ephemeral, &mut OsRng)
            .await?;

        self.contacts.upsert(Contact::from_profile(
            author,
            &sender_profile,
            ContactStatus::AwaitingApproval,
        ));

        let ack = Command {
            context_id: context_id.as_str().to_string(),
            sequence_number: self.next_outbound_sequence(&context_id),
            payload: CommandPayload::AcknowledgeContext {
                sender_profile: self.local_profile(),
                ephemeral_public_key: local_ephemeral.to_bytes(),
            },
        };
        self.sign_and_send(&author, &ack).await
    }

    /// Completes the handshake for a context we initiated.
    async fn on_acknowledge_context(
        &self,
        author: PeerId,
        context_id: &ContextId,
        sender_profile: Profile,
        ephemeral_public_key: [u8; 32],
    ) -> Result<()> {
        let peer_ephemeral = PublicKey::from_bytes(ephemeral_public_key);
        self.sessions
            .activate_as_initiator(context_id, &peer_ephemeral)
            .await?;
        self.contacts
            .upsert(Contact::from_profile(author, &sender_profile, ContactStatus::Online));
        Ok(())
    }

    fn on_disclose_profile(&self, author: PeerId, profile: Profile) {
        let status = self
            .contacts
            .get(&author)
            .map(|contact| contact.status)
            .unwrap_or(ContactStatus::Unknown);
        self.contacts.upsert(Contact::from_profile(author, &profile, status));
    }

    /// Ensures a contact entry exists for every affected member. Group
    /// membership itself is tracked by the context id's own member list at
    /// a higher layer; this only keeps the contact book aware of who
    /// might now appear in a group conversation. `added` distinguishes
    /// `AddMembers` from `RemoveMembers`, kept for parity even though
    /// removal does not delete contacts (spec §3 "Contact" lifetime: never
    /// destroyed implicitly).
    fn on_membership_change(&self, members: Vec<[u8; 32]>, added: bool) {
        if !added {
            return;
        }
        for raw_key in members {
            let Ok(verifying_key) = ember_crypto::signatures::VerifyingKey::from_bytes(&raw_key) else {
                continue;
            };
            let peer_id = ember_core::node::trust::TrustService::derive_peer_id(&verifying_key);
            if self.contacts.get(&peer_id).is_none() {
                let profile = Profile::new(peer_id.to_base32(), &peer_id);
                self.contacts
                    .upsert(Contact::from_profile(peer_id, &profile, ContactStatus::Unknown));
            }
        }
    }

    fn local_profile(&self) -> Profile {
        let peer_id = self.identity.peer_id();
        self.contacts
            .get(&peer_id)
            .map(|contact| Profile {
                nickname: contact.nickname,
                discriminator: contact.discriminator,
            })
            .unwrap_or_else(|| Profile::new(peer_id.to_base32(), &peer_id))
    }

    fn next_outbound_sequence(&self, context_id: &ContextId) -> u64 {
        self.outbound_sequences
            .entry(context_id.clone())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::SeqCst)
            + 1
    }

    async fn sign_and_send(&self, peer_id: &PeerId, command: &Command) -> Result<()> {
        let signed = SignedCommand::sign(&self.identity, command)?;
        let body = signed.encode()?;
        self.controller
            .send_raw_frame(peer_id, MessageType::SignedCommand, &body)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::node::config::NodeConfig;
    use ember_core::node::node::Node;
    use std::sync::Arc;

    fn node_pair() -> (Arc<Node>, Arc<Node>) {
        let a = Arc::new(Node::with_identity(NodeConfig::default(), Identity::from_seed(&[1; 32])));
        let b = Arc::new(Node::with_identity(NodeConfig::default(), Identity::from_seed(&[2; 32])));
        (a, b)
    }

    fn pipeline_for(node: &Arc<Node>) -> Arc<CommandPipeline> {
        Arc::new(CommandPipeline::new(
            node.identity().clone(),
            Arc::new(SessionManager::new()),
            Arc::new(ContactStore::new()),
            Arc::clone(node.controller()),
        ))
    }

    fn route(a: &Arc<Node>, b: &Arc<Node>) {
        // A route lets `Controller::send_raw_frame` resolve an address;
        // this test only exercises pipeline state transitions, not the
        // transport, so a bogus loopback address is enough.
        use ember_core::node::session::PeerConnection;
        use ember_core::session::Session;
        a.routing().add_route(
            b.peer_id(),
            Arc::new(PeerConnection::new(
                b.peer_id(),
                "127.0.0.1:9".parse().unwrap(),
                Session::prepare(&mut OsRng),
            )),
        );
    }

    #[tokio::test]
    async fn initiate_contact_prepares_session_and_marks_connecting() {
        let (a, b) = node_pair();
        route(&a, &b);
        let pipeline_a = pipeline_for(&a);
        // No transport configured on these bare nodes; the send fails but
        // `prepare` and the contact bookkeeping must have already run.
        let _ = pipeline_a.initiate_contact(b.peer_id(), Profile::new("alice", &a.peer_id())).await;
        let context_id = ContextId::for_pair(&a.peer_id(), &b.peer_id());
        assert!(pipeline_a.sessions.contains(&context_id));
        assert_eq!(
            pipeline_a.contacts.get(&b.peer_id()).unwrap().status,
            ContactStatus::Connecting
        );
    }

    #[tokio::test]
    async fn inbound_initiate_context_creates_awaiting_approval_contact() {
        let (a, b) = node_pair();
        route(&b, &a);
        let pipeline_b = pipeline_for(&b);

        let context_id = ContextId::for_pair(&a.peer_id(), &b.peer_id());
        let sessions_a = SessionManager::new();
        let a_ephemeral = sessions_a.prepare(context_id.clone(), &mut OsRng).unwrap();
        let command = Command {
            context_id: context_id.as_str().to_string(),
            sequence_number: 1,
            payload: CommandPayload::InitiateContext {
                initial_members: vec![],
                sender_profile: Profile::new("alice", &a.peer_id()),
                ephemeral_public_key: a_ephemeral.to_bytes(),
                chosen_crypto_suite: CRYPTO_SUITE_X25519_AES256GCM.to_string(),
            },
        };
        let signed = SignedCommand::sign(a.identity(), &command).unwrap();

        // The acknowledgement send fails (no transport on a bare node),
        // but the recipient-side session and contact state is still
        // established before that send is attempted.
        let _ = pipeline_b.handle_signed_command(a.peer_id(), &signed.encode().unwrap()).await;

        assert!(pipeline_b.sessions.contains(&context_id));
        assert_eq!(
            pipeline_b.contacts.get(&a.peer_id()).unwrap().status,
            ContactStatus::AwaitingApproval
        );
    }

    #[tokio::test]
    async fn simultaneous_initiate_tie_break_leaves_exactly_one_session_pending_pair() {
        let (a, b) = node_pair();
        route(&a, &b);
        route(&b, &a);
        let pipeline_a = pipeline_for(&a);
        let pipeline_b = pipeline_for(&b);

        // Both sides prepare their own outstanding context concurrently.
        let context_id = ContextId::for_pair(&a.peer_id(), &b.peer_id());
        let a_ephemeral = pipeline_a.sessions.prepare(context_id.clone(), &mut OsRng).unwrap();
        let b_ephemeral = pipeline_b.sessions.prepare(context_id.clone(), &mut OsRng).unwrap();

        let a_initiate = Command {
            context_id: context_id.as_str().to_string(),
            sequence_number: 1,
            payload: CommandPayload::InitiateContext {
                initial_members: vec![],
                sender_profile: Profile::new("alice", &a.peer_id()),
                ephemeral_public_key: a_ephemeral.to_bytes(),
                chosen_crypto_suite: CRYPTO_SUITE_X25519_AES256GCM.to_string(),
            },
        };
        let b_initiate = Command {
            context_id: context_id.as_str().to_string(),
            sequence_number: 1,
            payload: CommandPayload::InitiateContext {
                initial_members: vec![],
                sender_profile: Profile::new("bob", &b.peer_id()),
                ephemeral_public_key: b_ephemeral.to_bytes(),
                chosen_crypto_suite: CRYPTO_SUITE_X25519_AES256GCM.to_string(),
            },
        };
        let signed_from_a = SignedCommand::sign(a.identity(), &a_initiate).unwrap();
        let signed_from_b = SignedCommand::sign(b.identity(), &b_initiate).unwrap();

        let _ = pipeline_b
            .handle_signed_command(a.peer_id(), &signed_from_a.encode().unwrap())
            .await;
        let _ = pipeline_a
            .handle_signed_command(b.peer_id(), &signed_from_b.encode().unwrap())
            .await;

        let a_is_initiator = is_tie_break_initiator(&a.peer_id(), &b.peer_id());
        if a_is_initiator {
            // A's own context stays authoritative and pending, still
            // holding a's original ephemeral key.
            assert!(!pipeline_a.sessions.is_active(&context_id).await);
            // B lost the tie-break, discarded its own context, and is now
            // recipient of a's.
            assert!(pipeline_b.sessions.contains(&context_id));
        } else {
            assert!(!pipeline_b.sessions.is_active(&context_id).await);
            assert!(pipeline_a.sessions.contains(&context_id));
        }
    }
}
