//! Error types for the Node API.
//!
//! Errors are categorized to support retry logic in the reachability ladder:
//! transient errors may succeed on retry, permanent errors will not.

use std::borrow::Cow;
use thiserror::Error;

/// Errors that can occur in Node operations.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// Failed to initialize the transport layer.
    #[error("transport initialization failed: {0}")]
    TransportInit(Cow<'static, str>),

    /// Transport operation failed.
    #[error("transport error: {0}")]
    Transport(Cow<'static, str>),

    /// Cryptographic operation failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(Cow<'static, str>),

    /// Session establishment failed.
    #[error("session establishment failed: {0}")]
    SessionEstablishment(Cow<'static, str>),

    /// Session not found for the given peer.
    #[error("session not found for peer {0}")]
    SessionNotFound(String),

    /// Transfer operation failed.
    #[error("transfer error: {0}")]
    Transfer(Cow<'static, str>),

    /// Transfer not found.
    #[error("transfer not found: {0}")]
    TransferNotFound(String),

    /// Hash mismatch during file integrity verification.
    #[error("hash mismatch: integrity verification failed")]
    HashMismatch,

    /// File I/O error.
    #[error("file I/O error: {0}")]
    Io(String),

    /// Discovery operation failed.
    #[error("discovery error: {0}")]
    Discovery(Cow<'static, str>),

    /// NAT traversal failed.
    #[error("NAT traversal failed: {0}")]
    NatTraversal(Cow<'static, str>),

    /// Peer not found in DHT, local cache, or contact list.
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    /// Invalid state transition.
    #[error("invalid state: {0}")]
    InvalidState(Cow<'static, str>),

    /// Operation timed out.
    #[error("operation timed out: {0}")]
    Timeout(Cow<'static, str>),

    /// Task join error.
    #[error("task join error: {0}")]
    TaskJoin(Cow<'static, str>),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(Cow<'static, str>),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(Cow<'static, str>),

    /// Generic error for edge cases.
    #[error("{0}")]
    Other(Cow<'static, str>),
}

impl NodeError {
    /// True if this error is transient and may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NodeError::Timeout(_)
                | NodeError::Transport(_)
                | NodeError::NatTraversal(_)
                | NodeError::Channel(_)
        )
    }

    /// True if this error is permanent and will not succeed on retry.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            NodeError::InvalidConfig(_)
                | NodeError::SessionNotFound(_)
                | NodeError::TransferNotFound(_)
                | NodeError::PeerNotFound(_)
                | NodeError::HashMismatch
                | NodeError::InvalidState(_)
        )
    }

    /// True if this error should trigger a retry with exponential backoff.
    #[must_use]
    pub fn should_retry(&self) -> bool {
        self.is_transient() && !matches!(self, NodeError::Timeout(_))
    }

    /// Create a transport error with static context (zero allocation).
    #[must_use]
    pub const fn transport(context: &'static str) -> Self {
        NodeError::Transport(Cow::Borrowed(context))
    }

    /// Create a timeout error with static context (zero allocation).
    #[must_use]
    pub const fn timeout(context: &'static str) -> Self {
        NodeError::Timeout(Cow::Borrowed(context))
    }

    /// Create a handshake error with static context (zero allocation).
    #[must_use]
    pub const fn handshake(context: &'static str) -> Self {
        NodeError::Handshake(Cow::Borrowed(context))
    }

    /// Create an invalid-state error with static context (zero allocation).
    #[must_use]
    pub const fn invalid_state(context: &'static str) -> Self {
        NodeError::InvalidState(Cow::Borrowed(context))
    }

    /// Create a discovery error with static context (zero allocation).
    #[must_use]
    pub const fn discovery(context: &'static str) -> Self {
        NodeError::Discovery(Cow::Borrowed(context))
    }

    /// Create a serialization error with static context (zero allocation).
    #[must_use]
    pub const fn serialization(context: &'static str) -> Self {
        NodeError::Serialization(Cow::Borrowed(context))
    }
}

impl From<ember_crypto::CryptoError> for NodeError {
    fn from(err: ember_crypto::CryptoError) -> Self {
        NodeError::Crypto(err.to_string())
    }
}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        NodeError::Io(err.to_string())
    }
}

/// Result type for Node operations.
pub type Result<T> = std::result::Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_classify_correctly() {
        assert!(NodeError::Timeout(Cow::Borrowed("test")).is_transient());
        assert!(NodeError::Transport(Cow::Borrowed("test")).is_transient());
        assert!(NodeError::NatTraversal(Cow::Borrowed("test")).is_transient());
        assert!(NodeError::Channel(Cow::Borrowed("test")).is_transient());
    }

    #[test]
    fn permanent_errors_classify_correctly() {
        assert!(NodeError::InvalidConfig(Cow::Borrowed("test")).is_permanent());
        assert!(NodeError::SessionNotFound("abc".into()).is_permanent());
        assert!(NodeError::HashMismatch.is_permanent());
    }

    #[test]
    fn mutual_exclusivity_of_transient_and_permanent() {
        let transient = NodeError::Transport(Cow::Borrowed("x"));
        assert!(transient.is_transient());
        assert!(!transient.is_permanent());

        let permanent = NodeError::HashMismatch;
        assert!(permanent.is_permanent());
        assert!(!permanent.is_transient());
    }

    #[test]
    fn should_retry_excludes_timeout() {
        assert!(!NodeError::Timeout(Cow::Borrowed("test")).should_retry());
        assert!(NodeError::Transport(Cow::Borrowed("test")).should_retry());
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let node_err: NodeError = io_err.into();
        assert!(matches!(node_err, NodeError::Io(_)));
    }

    #[test]
    fn crypto_error_converts() {
        let crypto_err = ember_crypto::CryptoError::DecryptionFailed;
        let node_err: NodeError = crypto_err.into();
        assert!(matches!(node_err, NodeError::Crypto(_)));
    }
}
