//! Binds a [`Session`] state machine to a live peer address and transport.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ember_crypto::identity::PeerId;
use ember_crypto::x25519::PublicKey;
use tokio::sync::RwLock;

use crate::node::error::{NodeError, Result};
use crate::session::{EncryptedMessage, Session, SessionState};

fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A live session bound to a peer's identity and network address.
///
/// Owns the [`Session`] crypto state machine plus the bookkeeping the
/// routing table and health monitor need: last-activity tracking for
/// idle-session eviction and basic traffic counters.
pub struct PeerConnection {
    /// The peer's identity.
    pub peer_id: PeerId,

    /// Last known network address for this peer.
    pub peer_addr: SocketAddr,

    /// Session crypto state machine.
    pub session: Arc<RwLock<Session>>,

    /// Traffic counters.
    pub stats: ConnectionStats,

    last_activity_ms: AtomicU64,
}

impl PeerConnection {
    /// Wrap a freshly prepared or activated [`Session`] for `peer_id` at `peer_addr`.
    pub fn new(peer_id: PeerId, peer_addr: SocketAddr, session: Session) -> Self {
        Self {
            peer_id,
            peer_addr,
            session: Arc::new(RwLock::new(session)),
            stats: ConnectionStats::default(),
            last_activity_ms: AtomicU64::new(current_time_ms()),
        }
    }

    /// Whether this connection has been idle longer than `idle_timeout`.
    pub fn is_stale(&self, idle_timeout: Duration) -> bool {
        let elapsed_ms = current_time_ms().saturating_sub(self.last_activity_ms.load(Ordering::Relaxed));
        elapsed_ms > idle_timeout.as_millis() as u64
    }

    /// Record activity, resetting the idle clock. Lock-free, safe to call
    /// from the routing table's hot path.
    pub fn touch(&self) {
        self.last_activity_ms.store(current_time_ms(), Ordering::Relaxed);
    }

    /// Milliseconds elapsed since the last [`PeerConnection::touch`].
    pub fn idle_duration_ms(&self) -> u64 {
        current_time_ms().saturating_sub(self.last_activity_ms.load(Ordering::Relaxed))
    }

    /// Current session lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.session.read().await.state()
    }

    /// This side's ephemeral public key, to be carried in the handshake
    /// frame sent to the peer.
    pub async fn local_ephemeral_public(&self) -> PublicKey {
        *self.session.read().await.local_ephemeral_public()
    }

    /// Complete the handshake as the side that dialed out, draining any
    /// messages queued while the session was pending.
    pub async fn activate_as_initiator(&self, peer_ephemeral_public: &PublicKey) -> Result<Vec<Vec<u8>>> {
        self.session.write().await.activate_as_initiator(peer_ephemeral_public)
    }

    /// Complete the handshake as the side that received the dial,
    /// draining any messages queued while the session was pending.
    pub async fn activate_as_recipient(&self, peer_ephemeral_public: &PublicKey) -> Result<Vec<Vec<u8>>> {
        self.session.write().await.activate_as_recipient(peer_ephemeral_public)
    }

    /// Encrypt `plaintext` for transmission, updating byte/packet counters.
    ///
    /// Returns `None` if the session is still pending (message was queued).
    pub async fn encrypt(&self, plaintext: &[u8]) -> Result<Option<EncryptedMessage>> {
        let mut session = self.session.write().await;
        let result = session
            .encrypt_for_session(plaintext)
            .map_err(|e| NodeError::Crypto(e.to_string()))?;
        if let Some(ref msg) = result {
            self.stats.record_sent(msg.ciphertext.len() as u64);
        }
        self.touch();
        Ok(result)
    }

    /// Decrypt a message received from this peer, updating byte/packet counters.
    pub async fn decrypt(&self, message: &EncryptedMessage) -> Result<Vec<u8>> {
        let session = self.session.read().await;
        let plaintext = session
            .decrypt_for_session(message)
            .map_err(|e| NodeError::Crypto(e.to_string()))?;
        self.stats.record_received(message.ciphertext.len() as u64);
        self.touch();
        Ok(plaintext)
    }
}

/// Per-connection traffic counters, updated with relaxed atomics so they
/// can be read from monitoring code without contending with the hot path.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
}

impl ConnectionStats {
    fn record_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of bytes sent so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Snapshot of bytes received so far.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Snapshot of packets sent so far.
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    /// Snapshot of packets received so far.
    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_crypto::identity::Identity;
    use rand_core::OsRng;

    fn test_peer(seed: u8) -> PeerId {
        Identity::from_seed(&[seed; 32]).peer_id()
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    #[tokio::test]
    async fn idle_tracking() {
        let conn = PeerConnection::new(test_peer(1), addr(), Session::prepare(&mut OsRng));
        assert!(!conn.is_stale(Duration::from_secs(60)));
        conn.touch();
        assert!(conn.idle_duration_ms() < 1000);
    }

    #[tokio::test]
    async fn encrypt_decrypt_roundtrip_across_two_connections() {
        let mut a = Session::prepare(&mut OsRng);
        let mut b = Session::prepare(&mut OsRng);
        let a_pub = *a.local_ephemeral_public();
        let b_pub = *b.local_ephemeral_public();
        a.activate_as_initiator(&b_pub).unwrap();
        b.activate_as_recipient(&a_pub).unwrap();

        let alice = PeerConnection::new(test_peer(1), addr(), a);
        let bob = PeerConnection::new(test_peer(2), addr(), b);

        let encrypted = alice.encrypt(b"hello bob").await.unwrap().unwrap();
        let plaintext = bob.decrypt(&encrypted).await.unwrap();
        assert_eq!(plaintext, b"hello bob");

        assert_eq!(alice.stats.packets_sent(), 1);
        assert_eq!(bob.stats.packets_received(), 1);
    }

    #[tokio::test]
    async fn pending_session_queues_without_stats_update() {
        let conn = PeerConnection::new(test_peer(1), addr(), Session::prepare(&mut OsRng));
        let result = conn.encrypt(b"queued").await.unwrap();
        assert!(result.is_none());
        assert_eq!(conn.stats.packets_sent(), 0);
    }
}
