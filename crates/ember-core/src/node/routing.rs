//! Routing table mapping peer identities to live sessions.
//!
//! Incoming packets arrive addressed to a peer's overlay identity, not a
//! connection ID; the dispatcher looks up the matching [`PeerConnection`]
//! here before decrypting and routing the payload to the chat, file, or
//! call handler named by the frame's type tag.
//!
//! Uses `DashMap` for lock-free concurrent access, matching the rest of
//! the node's hot-path data structures.

use dashmap::DashMap;
use ember_crypto::identity::PeerId;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::node::session::PeerConnection;

/// Routes peer identities to their live session.
pub struct RoutingTable {
    routes: DashMap<PeerId, Arc<PeerConnection>>,
    total_lookups: AtomicU64,
    successful_lookups: AtomicU64,
    failed_lookups: AtomicU64,
}

impl RoutingTable {
    /// Create a new empty routing table.
    pub fn new() -> Self {
        Self {
            routes: DashMap::new(),
            total_lookups: AtomicU64::new(0),
            successful_lookups: AtomicU64::new(0),
            failed_lookups: AtomicU64::new(0),
        }
    }

    /// Register a route for a newly established session. Replaces any
    /// existing route for the same peer.
    pub fn add_route(&self, peer_id: PeerId, connection: Arc<PeerConnection>) {
        tracing::debug!(peer = %peer_id, "adding route");
        self.routes.insert(peer_id, connection);
    }

    /// Remove the route for `peer_id`, returning the connection if one existed.
    pub fn remove_route(&self, peer_id: &PeerId) -> Option<Arc<PeerConnection>> {
        tracing::debug!(peer = %peer_id, "removing route");
        self.routes.remove(peer_id).map(|(_, v)| v)
    }

    /// Look up the live session for `peer_id`, if any.
    pub fn lookup(&self, peer_id: &PeerId) -> Option<Arc<PeerConnection>> {
        self.total_lookups.fetch_add(1, Ordering::Relaxed);
        match self.routes.get(peer_id) {
            Some(entry) => {
                self.successful_lookups.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(entry.value()))
            }
            None => {
                self.failed_lookups.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Whether a route exists for `peer_id`.
    pub fn has_route(&self, peer_id: &PeerId) -> bool {
        self.routes.contains_key(peer_id)
    }

    /// Find the peer identity already routed at `addr`, if any.
    ///
    /// Used to recover a sender's identity for frame types (signed
    /// commands, call signaling) that carry no peer id of their own at the
    /// dispatch layer: by the time either can arrive, the per-peer overlay
    /// handshake has already registered a route for the sending address.
    pub fn find_by_addr(&self, addr: std::net::SocketAddr) -> Option<PeerId> {
        self.routes
            .iter()
            .find(|entry| entry.value().peer_addr == addr)
            .map(|entry| *entry.key())
    }

    /// All peer identities currently routed.
    pub fn active_routes(&self) -> Vec<PeerId> {
        self.routes.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of active routes.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Point-in-time routing statistics.
    pub fn stats(&self) -> RoutingStats {
        RoutingStats {
            active_routes: self.routes.len(),
            total_lookups: self.total_lookups.load(Ordering::Relaxed),
            successful_lookups: self.successful_lookups.load(Ordering::Relaxed),
            failed_lookups: self.failed_lookups.load(Ordering::Relaxed),
        }
    }

    /// Remove all routes. Used during node shutdown.
    pub fn clear(&self) {
        tracing::debug!("clearing all routes");
        self.routes.clear();
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Routing table statistics.
#[derive(Debug, Clone, Copy)]
pub struct RoutingStats {
    /// Number of active routes.
    pub active_routes: usize,
    /// Total lookup operations performed.
    pub total_lookups: u64,
    /// Lookups that found a route.
    pub successful_lookups: u64,
    /// Lookups that found no route.
    pub failed_lookups: u64,
}

impl RoutingStats {
    /// Percentage of lookups that found a route.
    pub fn hit_rate(&self) -> f64 {
        if self.total_lookups == 0 {
            0.0
        } else {
            self.successful_lookups as f64 / self.total_lookups as f64 * 100.0
        }
    }
}
