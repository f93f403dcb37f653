//! Long-term Ed25519 identity: signing, Peer ID derivation, and fingerprints.
//!
//! An identity is a single Ed25519 keypair. There is no long-term X25519
//! key: the session handshake always generates a fresh ephemeral X25519
//! keypair per context (see [`crate::x25519`]), so trust and verification
//! operate purely on the Ed25519 public key.

use rand_core::{CryptoRng, RngCore};

use crate::hash::hash;
use crate::signatures::{Signature, SigningKey, VerifyingKey};
use crate::CryptoError;

/// A node's long-term cryptographic identity.
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Generate a fresh identity.
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            signing_key: SigningKey::generate(rng),
        }
    }

    /// Restore an identity from a 32-byte Ed25519 seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// The raw 32-byte seed. Handle with care: this is the private key.
    #[must_use]
    pub fn seed_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// This identity's long-term public key.
    #[must_use]
    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign `message` with the long-term key.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// This identity's canonical [`PeerId`].
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(&self.public_key())
    }

    /// This identity's out-of-band verification [`Fingerprint`].
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_public_key(&self.public_key())
    }
}

/// Short canonical identifier for a peer: base32 (RFC 4648, lowercase,
/// unpadded) of the first 20 bytes of SHA-256(public key).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId([u8; 20]);

impl PeerId {
    /// Derive the Peer ID for a given public key.
    #[must_use]
    pub fn from_public_key(key: &VerifyingKey) -> Self {
        let digest = hash(&key.to_bytes());
        let mut id = [0u8; 20];
        id.copy_from_slice(&digest[..20]);
        Self(id)
    }

    /// Reconstruct a Peer ID from a raw 20-byte identifier received over
    /// the wire (e.g. a discovery announcement), without the originating
    /// public key.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Raw 20-byte identifier.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Render as lowercase unpadded base32 (RFC 4648).
    #[must_use]
    pub fn to_base32(&self) -> String {
        base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &self.0).to_lowercase()
    }

    /// Parse a Peer ID from its base32 text form.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if `s` does not decode to
    /// exactly 20 bytes of valid base32.
    pub fn from_base32(s: &str) -> Result<Self, CryptoError> {
        let bytes = base32::decode(base32::Alphabet::Rfc4648 { padding: false }, s)
            .ok_or(CryptoError::InvalidPublicKey)?;
        if bytes.len() != 20 {
            return Err(CryptoError::InvalidPublicKey);
        }
        let mut id = [0u8; 20];
        id.copy_from_slice(&bytes);
        Ok(Self(id))
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base32())
    }
}

/// Out-of-band verification fingerprint: hex of the full public key,
/// grouped into 4-byte (8 hex character) blocks separated by spaces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a public key.
    #[must_use]
    pub fn from_public_key(key: &VerifyingKey) -> Self {
        let hex = hex::encode(key.to_bytes());
        let grouped = hex
            .as_bytes()
            .chunks(8)
            .map(|chunk| std::str::from_utf8(chunk).expect("hex is ASCII"))
            .collect::<Vec<_>>()
            .join(" ");
        Self(grouped)
    }

    /// The grouped-hex string form of this fingerprint.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn identity_roundtrips_through_seed() {
        let identity = Identity::generate(&mut OsRng);
        let restored = Identity::from_seed(&identity.seed_bytes());
        assert_eq!(identity.public_key(), restored.public_key());
    }

    #[test]
    fn peer_id_is_stable_for_same_key() {
        let identity = Identity::generate(&mut OsRng);
        assert_eq!(identity.peer_id(), identity.peer_id());
    }

    #[test]
    fn peer_id_differs_across_identities() {
        let a = Identity::generate(&mut OsRng);
        let b = Identity::generate(&mut OsRng);
        assert_ne!(a.peer_id(), b.peer_id());
    }

    #[test]
    fn peer_id_base32_roundtrip() {
        let identity = Identity::generate(&mut OsRng);
        let id = identity.peer_id();
        let text = id.to_base32();
        let parsed = PeerId::from_base32(&text).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn peer_id_base32_rejects_garbage() {
        assert!(PeerId::from_base32("not valid base32!!").is_err());
    }

    #[test]
    fn fingerprint_is_grouped_hex() {
        let identity = Identity::generate(&mut OsRng);
        let fp = identity.fingerprint();
        assert!(fp.as_str().contains(' '));
        assert_eq!(fp.as_str().replace(' ', "").len(), 64);
    }

    #[test]
    fn fingerprint_matches_same_key() {
        let identity = Identity::generate(&mut OsRng);
        assert_eq!(
            Fingerprint::from_public_key(&identity.public_key()),
            identity.fingerprint()
        );
    }

    #[test]
    fn signature_from_identity_verifies() {
        let identity = Identity::generate(&mut OsRng);
        let message = b"contact request";
        let signature = identity.sign(message);
        assert!(identity.public_key().verify(message, &signature).is_ok());
    }
}
