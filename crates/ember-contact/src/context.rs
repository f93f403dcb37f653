//! Conversation context identifiers.
//!
//! A context is a stable handle for a 1-to-1 or group conversation. For a
//! 1-to-1 conversation both sides must compute the same id without
//! negotiating, so it is derived deterministically from the two Peer IDs.

use ember_crypto::identity::PeerId;

const ONE_TO_ONE_PREFIX: &str = "ctx1:";

/// Stable identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(String);

impl ContextId {
    /// Derive the deterministic 1-to-1 context id for `a` and `b`: the
    /// lexicographic sort of their canonical string forms, concatenated
    /// with a fixed prefix, so both sides compute the same value
    /// regardless of who initiates.
    #[must_use]
    pub fn for_pair(a: &PeerId, b: &PeerId) -> Self {
        let (lo, hi) = order_pair(a, b);
        Self(format!("{ONE_TO_ONE_PREFIX}{lo}:{hi}"))
    }

    /// Wrap an externally-assigned id (e.g. for a group context).
    #[must_use]
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id's textual form, as carried on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lexicographically order `a` and `b`'s canonical string forms, returning
/// `(smaller, larger)`.
fn order_pair(a: &PeerId, b: &PeerId) -> (String, String) {
    let (a_str, b_str) = (a.to_base32(), b.to_base32());
    if a_str <= b_str {
        (a_str, b_str)
    } else {
        (b_str, a_str)
    }
}

/// True if `local` is the initiator-by-tie-break for a simultaneous mutual
/// initiate: the side with the lexicographically smaller canonical Peer ID
/// string wins and keeps its own outstanding `InitiateContext` authoritative.
#[must_use]
pub fn is_tie_break_initiator(local: &PeerId, remote: &PeerId) -> bool {
    local.to_base32() < remote.to_base32()
}
