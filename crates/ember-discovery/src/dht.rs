//! Rendezvous directory: peer addresses, tag-based rendezvous membership,
//! and content-id providers.
//!
//! This is the on-demand "DHT" half of discovery — a Provide/FindProviders
//! directory plus a fixed-tag rendezvous table. It is backed by in-memory
//! concurrent maps rather than a Kademlia routing table; the companion
//! local-link finder in [`crate::broadcast`] and the NAT/relay machinery in
//! [`crate::nat`]/[`crate::relay`] round out the rest of discovery.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use ember_crypto::hash::hash;
use ember_crypto::identity::PeerId;

/// Entries older than this are treated as stale and excluded from lookups.
pub const ENTRY_TTL: Duration = Duration::from_secs(5 * 60);

/// Content identifier: `base-multi-hash(SHA-256(data))` with the raw codec,
/// rendered as lowercase unpadded base32 to match [`PeerId`]'s own textual
/// convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentId(String);

impl ContentId {
    /// SHA-256 multihash function code.
    const MULTIHASH_CODE_SHA2_256: u8 = 0x12;
    /// Digest length in bytes.
    const MULTIHASH_LEN: u8 = 0x20;

    /// Derive the content id for `data`.
    #[must_use]
    pub fn derive(data: &[u8]) -> Self {
        let digest = hash(data);
        let mut buf = Vec::with_capacity(2 + digest.len());
        buf.push(Self::MULTIHASH_CODE_SHA2_256);
        buf.push(Self::MULTIHASH_LEN);
        buf.extend_from_slice(&digest);
        let text = base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &buf).to_lowercase();
        Self(text)
    }

    /// Parse a previously-derived content id from its textual form.
    #[must_use]
    pub fn from_str_unchecked(s: &str) -> Self {
        Self(s.to_string())
    }

    /// The textual form used on the wire and in lookups.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Stamped<T> {
    value: T,
    seen_at: Instant,
}

fn fresh(seen_at: Instant) -> bool {
    seen_at.elapsed() < ENTRY_TTL
}

/// In-memory rendezvous directory shared by the local-link and DHT-style
/// finders, and consulted directly by [`crate::manager::DiscoveryManager`]'s
/// `find_peer`/`provide_content`/`find_providers` operations.
#[derive(Default)]
pub struct RendezvousDirectory {
    addresses: DashMap<PeerId, Stamped<Vec<SocketAddr>>>,
    tags: DashMap<String, DashMap<PeerId, Instant>>,
    providers: DashMap<ContentId, DashMap<PeerId, Instant>>,
}

impl RendezvousDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or refresh) `peer_id`'s currently known addresses.
    pub fn announce_addresses(&self, peer_id: PeerId, addresses: Vec<SocketAddr>) {
        self.addresses.insert(
            peer_id,
            Stamped {
                value: addresses,
                seen_at: Instant::now(),
            },
        );
    }

    /// Look up a peer's last-announced addresses, if the entry is still fresh.
    #[must_use]
    pub fn find_addresses(&self, peer_id: &PeerId) -> Option<Vec<SocketAddr>> {
        let entry = self.addresses.get(peer_id)?;
        fresh(entry.seen_at).then(|| entry.value.clone())
    }

    /// Announce membership of `peer_id` under `tag` (called by both the
    /// local-link broadcaster and the DHT-style finder on every sighting).
    pub fn announce_tag(&self, tag: &str, peer_id: PeerId) {
        self.tags
            .entry(tag.to_string())
            .or_default()
            .insert(peer_id, Instant::now());
    }

    /// Peers currently registered under `tag`, excluding `exclude`.
    #[must_use]
    pub fn find_tag_members(&self, tag: &str, exclude: &PeerId) -> Vec<PeerId> {
        let Some(members) = self.tags.get(tag) else {
            return Vec::new();
        };
        members
            .iter()
            .filter(|entry| fresh(*entry.value()) && entry.key() != exclude)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Publish that `peer_id` provides `content_id`.
    pub fn provide(&self, content_id: ContentId, peer_id: PeerId) {
        self.providers
            .entry(content_id)
            .or_default()
            .insert(peer_id, Instant::now());
    }

    /// Look up providers of `content_id`, excluding `exclude`.
    #[must_use]
    pub fn find_providers(&self, content_id: &ContentId, exclude: &PeerId) -> Vec<PeerId> {
        let Some(providers) = self.providers.get(content_id) else {
            return Vec::new();
        };
        providers
            .iter()
            .filter(|entry| fresh(*entry.value()) && entry.key() != exclude)
            .map(|entry| *entry.key())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_crypto::identity::Identity;
    use rand::rngs::OsRng;

    fn peer() -> PeerId {
        Identity::generate(&mut OsRng).peer_id()
    }

    #[test]
    fn content_id_is_deterministic_and_distinct() {
        let a = ContentId::derive(b"alice#1234");
        let b = ContentId::derive(b"alice#1234");
        let c = ContentId::derive(b"bob#5678");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn announce_and_find_addresses_roundtrips() {
        let dir = RendezvousDirectory::new();
        let p = peer();
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert!(dir.find_addresses(&p).is_none());
        dir.announce_addresses(p, vec![addr]);
        assert_eq!(dir.find_addresses(&p), Some(vec![addr]));
    }

    #[test]
    fn tag_membership_excludes_self_and_strangers() {
        let dir = RendezvousDirectory::new();
        let (me, other) = (peer(), peer());
        dir.announce_tag("ember-rendezvous-v1", me);
        dir.announce_tag("ember-rendezvous-v1", other);
        let members = dir.find_tag_members("ember-rendezvous-v1", &me);
        assert_eq!(members, vec![other]);
        assert!(dir.find_tag_members("some-other-tag", &me).is_empty());
    }

    #[test]
    fn provider_lookup_excludes_self_and_is_content_scoped() {
        let dir = RendezvousDirectory::new();
        let (me, other) = (peer(), peer());
        let cid = ContentId::derive(b"carol#0001");
        dir.provide(cid.clone(), me);
        dir.provide(cid.clone(), other);
        assert_eq!(dir.find_providers(&cid, &me), vec![other]);
        let unrelated = ContentId::derive(b"dave#0002");
        assert!(dir.find_providers(&unrelated, &me).is_empty());
    }
}
