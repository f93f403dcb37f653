//! Trust service: signature verification, peer identity derivation, and
//! per-key verification status.
//!
//! Sits between the dispatcher and the contact/command layer: every signed
//! command is checked here before its payload is trusted, and first-contact
//! commands additionally verify the derived Peer ID against the address the
//! overlay actually delivered the packet from, guarding against a
//! man-in-the-middle substituting a different key mid-handshake.

use dashmap::DashMap;

use ember_crypto::identity::{Fingerprint, PeerId};
use ember_crypto::signatures::{Signature, VerifyingKey};

/// Verification status of a remote public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Signature and/or identity has not been manually confirmed.
    Unverified,
    /// Fingerprint has been confirmed out-of-band.
    Verified,
    /// The user has explicitly rejected this key.
    Blocked,
}

/// Verifies signatures and tracks per-key trust decisions.
///
/// Verification status is keyed by the hex encoding of the serialized
/// public key rather than the Peer ID, since a Peer ID is a lossy 20-byte
/// digest and two distinct keys could in principle share a prefix
/// collision in a weaker hash; keying on the full key removes any
/// ambiguity.
pub struct TrustService {
    statuses: DashMap<String, VerificationStatus>,
}

impl TrustService {
    /// Create an empty trust store; all keys start `Unverified` by
    /// default (absence from the map is treated as `Unverified`).
    pub fn new() -> Self {
        Self {
            statuses: DashMap::new(),
        }
    }

    /// Verify `signature` over `message` under `public_key`.
    pub fn verify_signature(
        public_key: &VerifyingKey,
        message: &[u8],
        signature: &Signature,
    ) -> bool {
        public_key.verify(message, signature).is_ok()
    }

    /// Derive the Peer ID that the overlay would address this key by.
    pub fn derive_peer_id(public_key: &VerifyingKey) -> PeerId {
        PeerId::from_public_key(public_key)
    }

    /// Compare a derived Peer ID against the one the overlay attributes to
    /// the sender of a packet. Returns `false` (not an error) on mismatch:
    /// the signature may be perfectly valid for a key that simply isn't
    /// the peer we think we're talking to.
    pub fn verify_peer_id(public_key: &VerifyingKey, expected: &PeerId) -> bool {
        &Self::derive_peer_id(public_key) == expected
    }

    /// Human-legible fingerprint of `public_key` for out-of-band comparison.
    pub fn fingerprint(public_key: &VerifyingKey) -> Fingerprint {
        Fingerprint::from_public_key(public_key)
    }

    /// Current verification status for `public_key` (`Unverified` if never set).
    pub fn status(&self, public_key: &VerifyingKey) -> VerificationStatus {
        self.statuses
            .get(&hex::encode(public_key.to_bytes()))
            .map(|entry| *entry.value())
            .unwrap_or(VerificationStatus::Unverified)
    }

    /// Record a verification decision for `public_key`.
    pub fn set_status(&self, public_key: &VerifyingKey, status: VerificationStatus) {
        self.statuses.insert(hex::encode(public_key.to_bytes()), status);
    }
}

impl Default for TrustService {
    fn default() -> Self {
        Self::new()
    }
}
