//! `SignedCommand`: the authenticated envelope for context-mutation traffic.
//!
//! A `SignedCommand` wraps an opaque, signed `Command` whose payload is one
//! of five mutation kinds. Verification happens in stages: parse, verify
//! signature, verify derived Peer ID on first-contact payloads, then
//! dispatch by sequence number.

use ember_core::node::trust::TrustService;
use ember_crypto::identity::PeerId;
use ember_crypto::signatures::Signature;
use serde::{Deserialize, Serialize};

use crate::context::ContextId;
use crate::envelope::AuthorIdentity;
use crate::error::{ContactError, Result};
use crate::profile::Profile;

/// The mutation carried by a [`Command`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandPayload {
    /// Proposes a new context; first-contact payload.
    InitiateContext {
        /// Public keys of everyone the initiator believes should be a
        /// member of the new context, serialized as raw Ed25519 bytes.
        initial_members: Vec<[u8; 32]>,
        /// The initiator's profile, for display before approval.
        sender_profile: Profile,
        /// The initiator's fresh X25519 ephemeral public key.
        ephemeral_public_key: [u8; 32],
        /// Negotiated cipher suite name; currently always one value, kept
        /// as a string so a future suite can be introduced without a wire
        /// break.
        chosen_crypto_suite: String,
    },
    /// Completes a context the local node initiated; first-contact payload.
    AcknowledgeContext {
        /// The recipient's profile.
        sender_profile: Profile,
        /// The recipient's fresh X25519 ephemeral public key.
        ephemeral_public_key: [u8; 32],
    },
    /// Updates the sender's profile within an already-active context.
    DiscloseProfile {
        /// The sender's updated profile.
        profile: Profile,
    },
    /// Adds members to a group context.
    AddMembers {
        /// Public keys of the members being added.
        members: Vec<[u8; 32]>,
    },
    /// Removes members from a group context.
    RemoveMembers {
        /// Public keys of the members being removed.
        members: Vec<[u8; 32]>,
    },
}

impl CommandPayload {
    /// True for payloads that must bind to a Peer ID because no session
    /// exists yet to vouch for the sender.
    #[must_use]
    pub fn is_first_contact(&self) -> bool {
        matches!(
            self,
            CommandPayload::InitiateContext { .. } | CommandPayload::AcknowledgeContext { .. }
        )
    }
}

/// The inner, signed content of a [`SignedCommand`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// The context this command mutates.
    pub context_id: String,
    /// Strictly increasing per (author, context_id).
    pub sequence_number: u64,
    /// The mutation itself.
    pub payload: CommandPayload,
}

impl Command {
    /// Serialize to the bytes that get signed and transmitted as
    /// `command_data`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ContactError::InvalidArgument(e.to_string().into()))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| ContactError::InvalidArgument(e.to_string().into()))
    }
}

/// The signed, on-the-wire envelope around a [`Command`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedCommand {
    /// The author's long-term identity.
    pub author_identity: AuthorIdentity,
    /// Bincode-serialized [`Command`]; this, verbatim, is what is signed.
    pub command_data: Vec<u8>,
    /// Ed25519 signature over `command_data`.
    #[serde(with = "signature_bytes")]
    pub signature: [u8; 64],
}

/// `serde` does not implement `Serialize`/`Deserialize` for `[u8; 64]`
/// directly; serialize it as a fixed-size sequence of bytes instead,
/// matching what `serde`'s own array impls produce for smaller arrays.
mod signature_bytes {
    use serde::de::{Error as _, SeqAccess, Visitor};
    use serde::ser::SerializeTuple;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(64)?;
        for byte in bytes {
            tup.serialize_element(byte)?;
        }
        tup.end()
    }

    struct SignatureVisitor;

    impl<'de> Visitor<'de> for SignatureVisitor {
        type Value = [u8; 64];

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("an array of 64 bytes")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut bytes = [0u8; 64];
            for (i, byte) in bytes.iter_mut().enumerate() {
                *byte = seq
                    .next_element()?
                    .ok_or_else(|| A::Error::invalid_length(i, &self))?;
            }
            Ok(bytes)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 64], D::Error> {
        deserializer.deserialize_tuple(64, SignatureVisitor)
    }
}

impl SignedCommand {
    /// Sign `command` as the owner of `identity`.
    pub fn sign(identity: &ember_crypto::identity::Identity, command: &Command) -> Result<Self> {
        let command_data = command.encode()?;
        let signature = identity.sign(&command_data);
        Ok(Self {
            author_identity: AuthorIdentity::from_verifying_key(&identity.public_key()),
            command_data,
            signature: *signature.as_bytes(),
        })
    }

    /// Serialize for the wire.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ContactError::InvalidArgument(e.to_string().into()))
    }

    /// Parse a previously-encoded signed command.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| ContactError::InvalidArgument(e.to_string().into()))
    }
}

/// The result of successfully verifying a [`SignedCommand`]: the author's
/// Peer ID, the context it targets, and the decoded command, ready to
/// dispatch.
pub struct VerifiedCommand {
    /// The signer's derived Peer ID.
    pub author: PeerId,
    /// The context this command targets.
    pub context_id: ContextId,
    /// The decoded inner command.
    pub command: Command,
}

/// Verify `signed` under the standard four-step pipeline: parse signature
/// and public key, check the signature over `command_data`, and — for
/// first-contact payloads — check the derived Peer ID against
/// `overlay_peer_id` (the identity the transport actually delivered the
/// packet from).
///
/// # Errors
///
/// Returns [`ContactError::SigInvalid`] if the signature does not verify,
/// or [`ContactError::PeerIdMismatch`] if a first-contact payload's
/// derived Peer ID disagrees with `overlay_peer_id`.
pub fn verify_signed_command(
    signed: &SignedCommand,
    overlay_peer_id: &PeerId,
) -> Result<VerifiedCommand> {
    let verifying_key = signed.author_identity.verifying_key()?;
    let signature = Signature::from_bytes(signed.signature);
    if !TrustService::verify_signature(&verifying_key, &signed.command_data, &signature) {
        return Err(ContactError::SigInvalid);
    }

    let command = Command::decode(&signed.command_data)?;
    let author = TrustService::derive_peer_id(&verifying_key);

    if command.payload.is_first_contact() && &author != overlay_peer_id {
        return Err(ContactError::PeerIdMismatch);
    }

    Ok(VerifiedCommand {
        author,
        context_id: ContextId::from_raw(command.context_id.clone()),
        command,
    })
}

/// Tracks the last accepted sequence number per (author, context), so
/// replays and reorders can be rejected.
#[derive(Default)]
pub struct SequenceTracker {
    last_accepted: dashmap::DashMap<(PeerId, ContextId), u64>,
}

impl SequenceTracker {
    /// Create an empty tracker; every (author, context) pair starts with
    /// no recorded sequence number.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `sequence_number` for `(author, context_id)` if it is
    /// strictly greater than the last one accepted for that pair.
    ///
    /// # Errors
    ///
    /// Returns [`ContactError::SequenceViolation`] otherwise, including on
    /// an exact replay.
    pub fn accept(
        &self,
        author: &PeerId,
        context_id: &ContextId,
        sequence_number: u64,
    ) -> Result<()> {
        let key = (*author, context_id.clone());
        let mut entry = self.last_accepted.entry(key).or_insert(0);
        if *entry != 0 && sequence_number <= *entry {
            return Err(ContactError::SequenceViolation);
        }
        if sequence_number == 0 {
            return Err(ContactError::SequenceViolation);
        }
        *entry = sequence_number;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_crypto::identity::Identity;
    use rand_core::OsRng;

    fn sample_command(context_id: &str, sequence_number: u64) -> Command {
        Command {
            context_id: context_id.to_string(),
            sequence_number,
            payload: CommandPayload::DiscloseProfile {
                profile: Profile::new("alice", &Identity::generate(&mut OsRng).peer_id()),
            },
        }
    }

    #[test]
    fn valid_signature_and_matching_peer_id_verifies() {
        let identity = Identity::generate(&mut OsRng);
        let command = sample_command("ctx1:a:b", 1);
        let signed = SignedCommand::sign(&identity, &command).unwrap();
        let verified = verify_signed_command(&signed, &identity.peer_id()).unwrap();
        assert_eq!(verified.author, identity.peer_id());
    }

    #[test]
    fn tampered_command_data_fails_signature_check() {
        let identity = Identity::generate(&mut OsRng);
        let command = sample_command("ctx1:a:b", 1);
        let mut signed = SignedCommand::sign(&identity, &command).unwrap();
        signed.command_data[0] ^= 0xFF;
        assert!(matches!(
            verify_signed_command(&signed, &identity.peer_id()),
            Err(ContactError::SigInvalid)
        ));
    }

    #[test]
    fn first_contact_payload_rejects_peer_id_mismatch() {
        let identity = Identity::generate(&mut OsRng);
        let stranger = Identity::generate(&mut OsRng);
        let command = Command {
            context_id: "ctx1:a:b".to_string(),
            sequence_number: 1,
            payload: CommandPayload::InitiateContext {
                initial_members: vec![],
                sender_profile: Profile::new("alice", &identity.peer_id()),
                ephemeral_public_key: [0u8; 32],
                chosen_crypto_suite: "x25519-aes256gcm".to_string(),
            },
        };
        let signed = SignedCommand::sign(&identity, &command).unwrap();
        assert!(matches!(
            verify_signed_command(&signed, &stranger.peer_id()),
            Err(ContactError::PeerIdMismatch)
        ));
    }

    #[test]
    fn sequence_tracker_rejects_replay_and_reorder() {
        let tracker = SequenceTracker::new();
        let author = Identity::generate(&mut OsRng).peer_id();
        let ctx = ContextId::from_raw("ctx1:a:b");
        tracker.accept(&author, &ctx, 1).unwrap();
        tracker.accept(&author, &ctx, 2).unwrap();
        assert!(tracker.accept(&author, &ctx, 2).is_err());
        assert!(tracker.accept(&author, &ctx, 1).is_err());
        tracker.accept(&author, &ctx, 5).unwrap();
    }

    #[test]
    fn sequence_tracker_rejects_zero() {
        let tracker = SequenceTracker::new();
        let author = Identity::generate(&mut OsRng).peer_id();
        let ctx = ContextId::from_raw("ctx1:a:b");
        assert!(tracker.accept(&author, &ctx, 0).is_err());
    }
}
