//! Chat (L8): plaintext content construction/parsing and rendered events.
//!
//! `ChatContent` is the tagged union the session layer encrypts under
//! [`crate::envelope::PAYLOAD_TYPE_CHAT`]. Outgoing text is built here and
//! handed to [`crate::session_manager::SessionManager`] for encryption;
//! incoming text is rendered into the `[<sender>]: <body>` line the host
//! application displays.

use ember_files::transfer::FileMetadata;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::profile::Profile;

/// Plaintext content carried inside a [`crate::envelope::SecureEnvelope`]
/// tagged [`crate::envelope::PAYLOAD_TYPE_CHAT`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChatContent {
    /// A text message body. An empty `body` is a legal, zero-length message.
    Text {
        /// The message text.
        body: String,
    },
    /// A file announcement, the first phase of the file-transfer protocol.
    File {
        /// The announced transfer's metadata.
        metadata: FileMetadata,
    },
}

impl ChatContent {
    /// Serialize for encryption.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| crate::error::ContactError::InvalidArgument(e.to_string().into()))
    }

    /// Parse plaintext recovered from a session decrypt.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| crate::error::ContactError::InvalidArgument(e.to_string().into()))
    }
}

/// A chat event ready to display, built from an incoming [`ChatContent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A rendered text line: `[<sender>]: <body>`.
    Rendered(String),
    /// A file was announced; the host surfaces a download affordance.
    FileAnnounced {
        /// Human-readable sender label, as used in [`ChatEvent::Rendered`].
        sender_label: String,
        /// The announced metadata.
        metadata: FileMetadata,
    },
}

/// Build the outgoing plaintext for a text message.
#[must_use]
pub fn compose_text(body: impl Into<String>) -> ChatContent {
    ChatContent::Text { body: body.into() }
}

/// Build the outgoing plaintext for a file announcement.
#[must_use]
pub fn compose_file_announce(metadata: FileMetadata) -> ChatContent {
    ChatContent::File { metadata }
}

/// Render an incoming, already-decrypted [`ChatContent`] for display.
///
/// `sender_nickname` is the sender's known profile nickname, or `None` if
/// no [`crate::command::CommandPayload::DiscloseProfile`] has been received
/// yet for this peer, in which case `sender_short_id` (the Peer ID) is
/// used instead — matching spec §4.8's
/// "sender-nickname-or-short-id" contract.
#[must_use]
pub fn render_incoming(
    content: &ChatContent,
    sender_nickname: Option<&str>,
    sender_short_id: &str,
) -> ChatEvent {
    let label = sender_nickname.unwrap_or(sender_short_id).to_string();
    match content {
        ChatContent::Text { body } => ChatEvent::Rendered(format!("[{label}]: {body}")),
        ChatContent::File { metadata } => ChatEvent::FileAnnounced {
            sender_label: label,
            metadata: metadata.clone(),
        },
    }
}

/// Build a profile's short display label, used when no nickname has been
/// disclosed yet: the `nickname#discriminator` is unavailable, so callers
/// fall back to the bare discriminator-bearing Peer ID string.
#[must_use]
pub fn short_label(profile: Option<&Profile>, fallback_peer_id: &str) -> String {
    match profile {
        Some(profile) => profile.full_address(),
        None => fallback_peer_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_crypto::identity::Identity;
    use rand_core::OsRng;
    use uuid::Uuid;

    #[test]
    fn text_content_round_trips() {
        let content = compose_text("hi");
        let bytes = content.encode().unwrap();
        let decoded = ChatContent::decode(&bytes).unwrap();
        match decoded {
            ChatContent::Text { body } => assert_eq!(body, "hi"),
            ChatContent::File { .. } => panic!("expected text"),
        }
    }

    #[test]
    fn zero_length_text_is_legal() {
        let content = compose_text("");
        let bytes = content.encode().unwrap();
        let decoded = ChatContent::decode(&bytes).unwrap();
        match decoded {
            ChatContent::Text { body } => assert!(body.is_empty()),
            ChatContent::File { .. } => panic!("expected text"),
        }
    }

    #[test]
    fn incoming_text_renders_with_nickname() {
        let content = compose_text("hello");
        let event = render_incoming(&content, Some("alice"), "short-id");
        assert_eq!(event, ChatEvent::Rendered("[alice]: hello".to_string()));
    }

    #[test]
    fn incoming_text_falls_back_to_short_id_without_nickname() {
        let content = compose_text("hello");
        let event = render_incoming(&content, None, "short-id");
        assert_eq!(event, ChatEvent::Rendered("[short-id]: hello".to_string()));
    }

    #[test]
    fn file_announcement_round_trips_and_renders() {
        let identity = Identity::generate(&mut OsRng);
        let metadata = FileMetadata {
            transfer_id: Uuid::new_v4(),
            filename: "report.pdf".to_string(),
            size_bytes: 1024,
            hash_sha256: [7u8; 32],
        };
        let content = compose_file_announce(metadata.clone());
        let bytes = content.encode().unwrap();
        let decoded = ChatContent::decode(&bytes).unwrap();
        let event = render_incoming(&decoded, None, &identity.peer_id().to_base32());
        match event {
            ChatEvent::FileAnnounced {
                metadata: got_metadata,
                ..
            } => assert_eq!(got_metadata.transfer_id, metadata.transfer_id),
            ChatEvent::Rendered(_) => panic!("expected file announcement"),
        }
    }
}
