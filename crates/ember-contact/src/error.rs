//! Error type for the contact/command, chat, and call-signaling layers.

use std::borrow::Cow;
use thiserror::Error;

/// Errors raised by signed-command verification, session lookup, and call
/// signaling.
#[derive(Debug, Error, Clone)]
pub enum ContactError {
    /// A required field was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(Cow<'static, str>),

    /// No contact, context, or content matched the lookup.
    #[error("not found: {0}")]
    NotFound(Cow<'static, str>),

    /// Signature verification failed.
    #[error("signature verification failed")]
    SigInvalid,

    /// The signature verified, but the derived Peer ID does not match the
    /// identity the overlay actually delivered the packet from.
    #[error("peer id mismatch: signature valid but identity disagrees")]
    PeerIdMismatch,

    /// The command's sequence number was not strictly greater than the
    /// last accepted value from that author in that context.
    #[error("sequence violation")]
    SequenceViolation,

    /// No session exists for the given context.
    #[error("no session for context")]
    NoSession,

    /// The session exists but has not completed its handshake.
    #[error("session not active")]
    NotActive,

    /// Underlying cryptographic failure (authentication tag mismatch,
    /// degenerate shared secret, etc.) — always treated as hostile input.
    #[error("crypto error: {0}")]
    CryptoFailed(String),

    /// An operation was attempted from an illegal state.
    #[error("invalid state: {0}")]
    InvalidState(Cow<'static, str>),
}

impl ContactError {
    /// Build an [`ContactError::InvalidArgument`] with static context.
    #[must_use]
    pub const fn invalid_argument(context: &'static str) -> Self {
        Self::InvalidArgument(Cow::Borrowed(context))
    }

    /// Build a [`ContactError::NotFound`] with static context.
    #[must_use]
    pub const fn not_found(context: &'static str) -> Self {
        Self::NotFound(Cow::Borrowed(context))
    }

    /// Build an [`ContactError::InvalidState`] with static context.
    #[must_use]
    pub const fn invalid_state(context: &'static str) -> Self {
        Self::InvalidState(Cow::Borrowed(context))
    }
}

impl From<ember_core::node::error::NodeError> for ContactError {
    fn from(err: ember_core::node::error::NodeError) -> Self {
        Self::CryptoFailed(err.to_string())
    }
}

impl From<ember_crypto::CryptoError> for ContactError {
    fn from(err: ember_crypto::CryptoError) -> Self {
        Self::CryptoFailed(err.to_string())
    }
}

/// Result type for this crate's operations.
pub type Result<T> = std::result::Result<T, ContactError>;
