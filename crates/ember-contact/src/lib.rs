//! Signed-command contact layer, chat, file-transfer glue, and call
//! signaling (spec layers L7/L8/L10) for the Ember P2P messenger.
//!
//! This crate sits above `ember-core` (sessions, trust, the controller)
//! and `ember-files` (the windowed transfer engine), turning their
//! primitives into the contact/chat/call semantics a host application
//! actually calls: context identifiers, signed context-mutation commands,
//! per-context session bookkeeping, chat content, and call signaling.

pub mod call;
pub mod chat;
pub mod command;
pub mod context;
pub mod envelope;
pub mod error;
pub mod pipeline;
pub mod profile;
pub mod session_manager;

pub use call::{CallId, CallSignaling, CallState, MediaEngine, SignalingMessage};
pub use chat::{ChatContent, ChatEvent};
pub use command::{Command, CommandPayload, SequenceTracker, SignedCommand, VerifiedCommand};
pub use context::ContextId;
pub use envelope::{AuthorIdentity, KeyType, SecureEnvelope};
pub use error::{ContactError, Result};
pub use pipeline::CommandPipeline;
pub use profile::Profile;
pub use session_manager::{DecryptOutcome, SessionManager};

/// Contact status, tracked per peer (spec §3 "Contact").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactStatus {
    /// No active connection.
    Offline,
    /// Reachable and session active.
    Online,
    /// Dial or handshake in progress.
    Connecting,
    /// Newly discovered, status not yet determined.
    Unknown,
    /// An `InitiateContext` was received but not yet approved by the user.
    AwaitingApproval,
}

/// A known peer: identity, display profile, and connection status.
///
/// Created when a peer sends a verified `InitiateContext`/`AcknowledgeContext`
/// or when the local user initiates a request; updated by status
/// notifications; never destroyed implicitly (spec §3 "Contact" lifetime).
#[derive(Debug, Clone)]
pub struct Contact {
    /// The contact's long-term Peer ID.
    pub peer_id: ember_crypto::identity::PeerId,
    /// Display nickname, if known.
    pub nickname: String,
    /// Profile discriminator, if known.
    pub discriminator: String,
    /// Current reachability/approval status.
    pub status: ContactStatus,
    /// True for the entry representing the local node's own identity.
    pub is_self: bool,
}

impl Contact {
    /// Build a contact entry from a just-verified profile disclosure.
    #[must_use]
    pub fn from_profile(
        peer_id: ember_crypto::identity::PeerId,
        profile: &Profile,
        status: ContactStatus,
    ) -> Self {
        Self {
            peer_id,
            nickname: profile.nickname.clone(),
            discriminator: profile.discriminator.clone(),
            status,
            is_self: false,
        }
    }

    /// This contact's `nickname#discriminator` full address.
    #[must_use]
    pub fn full_address(&self) -> String {
        format!("{}#{}", self.nickname, self.discriminator)
    }
}

/// Contacts keyed by Peer ID (spec §3: "Stored in a mapping keyed by
/// peer_id; keys unique, insertion order irrelevant"). Verification status
/// lives separately, in [`ember_core::node::trust::TrustService`], since it
/// is keyed by public key rather than Peer ID.
#[derive(Default)]
pub struct ContactStore {
    contacts: dashmap::DashMap<ember_crypto::identity::PeerId, Contact>,
}

impl ContactStore {
    /// Create an empty contact store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a contact entry.
    pub fn upsert(&self, contact: Contact) {
        self.contacts.insert(contact.peer_id, contact);
    }

    /// Look up a contact by Peer ID.
    #[must_use]
    pub fn get(&self, peer_id: &ember_crypto::identity::PeerId) -> Option<Contact> {
        self.contacts.get(peer_id).map(|entry| entry.clone())
    }

    /// Update an existing contact's status in place; a no-op if the peer
    /// has no contact entry yet.
    pub fn set_status(&self, peer_id: &ember_crypto::identity::PeerId, status: ContactStatus) {
        if let Some(mut entry) = self.contacts.get_mut(peer_id) {
            entry.status = status;
        }
    }

    /// All known contacts, in no particular order.
    #[must_use]
    pub fn all(&self) -> Vec<Contact> {
        self.contacts.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_crypto::identity::Identity;
    use rand_core::OsRng;

    #[test]
    fn contact_from_profile_carries_full_address() {
        let peer_id = Identity::generate(&mut OsRng).peer_id();
        let profile = Profile::new("alice", &peer_id);
        let contact = Contact::from_profile(peer_id, &profile, ContactStatus::Online);
        assert_eq!(contact.full_address(), profile.full_address());
        assert!(!contact.is_self);
    }

    #[test]
    fn contact_store_upserts_and_updates_status() {
        let store = ContactStore::new();
        let peer_id = Identity::generate(&mut OsRng).peer_id();
        let profile = Profile::new("bob", &peer_id);
        store.upsert(Contact::from_profile(
            peer_id,
            &profile,
            ContactStatus::AwaitingApproval,
        ));
        assert_eq!(store.get(&peer_id).unwrap().status, ContactStatus::AwaitingApproval);

        store.set_status(&peer_id, ContactStatus::Online);
        assert_eq!(store.get(&peer_id).unwrap().status, ContactStatus::Online);
        assert_eq!(store.all().len(), 1);
    }
}
