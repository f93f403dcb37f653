//! `SecureEnvelope`: the wire wrapper around an encrypted session payload.
//!
//! Plaintext semantics are carried by `payload_type`, never by the
//! ciphertext itself; the two normative tags are [`PAYLOAD_TYPE_CHAT`] and
//! [`PAYLOAD_TYPE_FILE_CONTROL`].

use ember_core::session::EncryptedMessage;
use ember_crypto::identity::PeerId;
use ember_crypto::signatures::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::error::{ContactError, Result};

/// `payload_type` for `ChatContent` carried inside a [`SecureEnvelope`].
pub const PAYLOAD_TYPE_CHAT: &str = "encrypted/chat-v1";
/// `payload_type` for `FileControl` carried inside a [`SecureEnvelope`].
pub const PAYLOAD_TYPE_FILE_CONTROL: &str = "encrypted/file-control-v1";

/// The long-term key type naming an [`AuthorIdentity`]'s public key. Only
/// Ed25519 identities exist today; the tag leaves room for a future type
/// without changing the wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    /// Ed25519 signing key.
    Ed25519,
}

/// The author of a [`SecureEnvelope`] or `SignedCommand`: a key type tag
/// plus the raw public key bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorIdentity {
    /// The key type the bytes below should be interpreted as.
    pub key_type: KeyType,
    /// Raw Ed25519 public key bytes.
    pub public_key: [u8; 32],
}

impl AuthorIdentity {
    /// Build an author identity from a verifying key.
    #[must_use]
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self {
            key_type: KeyType::Ed25519,
            public_key: key.to_bytes(),
        }
    }

    /// Parse the raw public key bytes into a [`VerifyingKey`].
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.public_key)
            .map_err(|_| ContactError::invalid_argument("malformed author public key"))
    }

    /// The Peer ID this identity derives to.
    pub fn peer_id(&self) -> Result<PeerId> {
        Ok(PeerId::from_public_key(&self.verifying_key()?))
    }
}

/// A session-encrypted payload, tagged with its author and semantic type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecureEnvelope {
    /// The sender's long-term identity.
    pub author_identity: AuthorIdentity,
    /// Names how to interpret the decrypted plaintext.
    pub payload_type: String,
    /// AES-256-GCM ciphertext (tag included).
    pub ciphertext: Vec<u8>,
    /// Per-message random nonce.
    pub nonce: [u8; 12],
}

impl SecureEnvelope {
    /// Wrap an [`EncryptedMessage`] for transport.
    #[must_use]
    pub fn new(
        author_identity: AuthorIdentity,
        payload_type: impl Into<String>,
        message: EncryptedMessage,
    ) -> Self {
        Self {
            author_identity,
            payload_type: payload_type.into(),
            ciphertext: message.ciphertext,
            nonce: message.nonce,
        }
    }

    /// Recover the [`EncryptedMessage`] to pass to a [`Session`](ember_core::session::Session).
    #[must_use]
    pub fn encrypted_message(&self) -> EncryptedMessage {
        EncryptedMessage {
            nonce: self.nonce,
            ciphertext: self.ciphertext.clone(),
        }
    }

    /// Serialize for the wire.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ContactError::InvalidArgument(e.to_string().into()))
    }

    /// Parse a previously-encoded envelope.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| ContactError::InvalidArgument(e.to_string().into()))
    }
}
