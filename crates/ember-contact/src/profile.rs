//! User profile and the `nickname#discriminator` full address form.

use ember_crypto::identity::PeerId;
use serde::{Deserialize, Serialize};

/// Number of trailing characters of the canonical Peer ID string used as
/// the profile discriminator. A UI disambiguator, not a security
/// primitive.
pub const DISCRIMINATOR_LEN: usize = 6;

/// A user-chosen nickname plus the discriminator derived from their Peer ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// User-chosen display name.
    pub nickname: String,
    /// Trailing characters of the owner's canonical Peer ID.
    pub discriminator: String,
}

impl Profile {
    /// Build a profile for `peer_id`, deriving the discriminator from it.
    #[must_use]
    pub fn new(nickname: impl Into<String>, peer_id: &PeerId) -> Self {
        Self {
            nickname: nickname.into(),
            discriminator: discriminator_for(peer_id),
        }
    }

    /// This profile's `nickname#discriminator` full address.
    #[must_use]
    pub fn full_address(&self) -> String {
        format!("{}#{}", self.nickname, self.discriminator)
    }
}

/// Derive the discriminator for `peer_id`: its canonical string's trailing
/// [`DISCRIMINATOR_LEN`] characters.
#[must_use]
pub fn discriminator_for(peer_id: &PeerId) -> String {
    let canonical = peer_id.to_base32();
    let start = canonical.len().saturating_sub(DISCRIMINATOR_LEN);
    canonical[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_crypto::identity::Identity;
    use rand::rngs::OsRng;

    #[test]
    fn full_address_joins_nickname_and_discriminator() {
        let peer_id = Identity::generate(&mut OsRng).peer_id();
        let profile = Profile::new("alice", &peer_id);
        assert_eq!(
            profile.full_address(),
            format!("alice#{}", profile.discriminator)
        );
        assert_eq!(profile.discriminator.len(), DISCRIMINATOR_LEN);
    }

    #[test]
    fn discriminator_is_stable_for_same_peer_id() {
        let peer_id = Identity::generate(&mut OsRng).peer_id();
        assert_eq!(discriminator_for(&peer_id), discriminator_for(&peer_id));
    }
}
