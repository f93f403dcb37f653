//! The overlay node: owns the long-term identity, the reachability ladder
//! for dialing peers, and the infrastructure (routing, circuit breaker,
//! rate limiter, IP reputation, health monitor) the controller sits on
//! top of.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ember_crypto::identity::{Identity, PeerId};
use ember_crypto::x25519::PublicKey;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::node::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::node::config::NodeConfig;
use crate::node::controller::{Controller, DiscoveryHandle, PROTOCOL_CHAT};
use crate::node::dispatch::{self, MessageType};
use crate::node::error::{NodeError, Result};
use crate::node::health::{HealthConfig, HealthMonitor};
use crate::node::ip_reputation::{IpReputationConfig, IpReputationSystem};
use crate::node::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::node::routing::RoutingTable;
use crate::node::session::PeerConnection;
use crate::node::transport::OverlayTransport;
use crate::session::Session;

/// Timeout waiting for the peer's handshake reply before a newly dialed
/// session is left `Pending` to be activated by a later message.
const HANDSHAKE_REPLY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Wire body of a `PingEnvelope` frame: the unencrypted first-contact
/// handshake that carries each side's long-term Peer ID and fresh ephemeral
/// public key so both sides can activate a matching [`Session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HandshakeBody {
    peer_id: [u8; 20],
    ephemeral_public: [u8; 32],
}

/// Where a dial actually landed, returned by a successful [`Dialer`] stage.
#[derive(Debug, Clone, Copy)]
pub struct DialOutcome {
    /// The address the connection was established on.
    pub addr: SocketAddr,
}

/// Abstracts the overlay's actual network dial so [`Node`] can run its
/// reachability ladder without a hard dependency on one transport crate's
/// concrete socket types.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Attempt a direct dial to `addr` with the given `timeout`.
    async fn dial(&self, addr: SocketAddr, timeout: std::time::Duration) -> Result<DialOutcome>;
    /// Attempt NAT hole-punching to reach `peer_id`.
    async fn hole_punch(&self, peer_id: &PeerId) -> Result<DialOutcome>;
    /// Attempt a relay-proxied dial to `peer_id`.
    async fn relay_dial(&self, peer_id: &PeerId) -> Result<DialOutcome>;
}

/// The overlay node.
///
/// `identity` is declared last: `routing`/`controller` are torn down
/// explicitly in [`Node::stop`] before any `Node` clone's `identity` field
/// is actually dropped, so key material outlives the structures that might
/// still reference a peer by it during shutdown.
pub struct Node {
    config: NodeConfig,
    routing: Arc<RoutingTable>,
    circuit_breaker: CircuitBreaker,
    rate_limiter: RateLimiter,
    ip_reputation: IpReputationSystem,
    health: Arc<HealthMonitor>,
    controller: Arc<Controller>,
    running: AtomicBool,
    dialer: Option<Arc<dyn Dialer>>,
    transport: Option<Arc<dyn OverlayTransport>>,
    pending_handshakes: DashMap<PeerId, oneshot::Sender<[u8; 32]>>,
    identity: Arc<Identity>,
}

impl Node {
    /// Create a node with a freshly generated identity and no discovery or
    /// dial backend. Useful for tests and for layers that drive the
    /// reachability ladder themselves.
    pub fn new_random(config: NodeConfig) -> Self {
        Self::build(config, Identity::generate(&mut OsRng), None, None, None)
    }

    /// Create a node restoring a previously generated identity.
    pub fn with_identity(config: NodeConfig, identity: Identity) -> Self {
        Self::build(config, identity, None, None, None)
    }

    /// Create a node with discovery and dialer backends wired in, but no
    /// overlay transport: sessions dial and register a route but never
    /// complete the ephemeral-key handshake, matching this constructor's
    /// historical behavior. Prefer [`Node::with_full_backends`] for a node
    /// that actually puts bytes on the wire.
    pub fn with_backends(
        config: NodeConfig,
        identity: Identity,
        discovery: Option<Arc<dyn DiscoveryHandle>>,
        dialer: Option<Arc<dyn Dialer>>,
    ) -> Self {
        Self::build(config, identity, discovery, dialer, None)
    }

    /// Create a node with discovery, dialer, and overlay transport backends
    /// all wired in. This is the constructor production binaries should use:
    /// `connect` drives a real `PingEnvelope` handshake over `transport` and
    /// the controller's `send_to_peer`/`broadcast` actually transmit.
    pub fn with_full_backends(
        config: NodeConfig,
        identity: Identity,
        discovery: Option<Arc<dyn DiscoveryHandle>>,
        dialer: Option<Arc<dyn Dialer>>,
        transport: Option<Arc<dyn OverlayTransport>>,
    ) -> Self {
        Self::build(config, identity, discovery, dialer, transport)
    }

    fn build(
        config: NodeConfig,
        identity: Identity,
        discovery: Option<Arc<dyn DiscoveryHandle>>,
        dialer: Option<Arc<dyn Dialer>>,
        transport: Option<Arc<dyn OverlayTransport>>,
    ) -> Self {
        let identity = Arc::new(identity);
        let routing = Arc::new(RoutingTable::new());
        let controller = Arc::new(Controller::with_transport(
            identity.peer_id(),
            Arc::clone(&routing),
            discovery,
            transport.clone(),
        ));
        Self {
            circuit_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            rate_limiter: RateLimiter::new(RateLimitConfig::default()),
            ip_reputation: IpReputationSystem::new(IpReputationConfig::default()),
            health: Arc::new(HealthMonitor::new(HealthConfig::default())),
            controller,
            running: AtomicBool::new(false),
            dialer,
            transport,
            pending_handshakes: DashMap::new(),
            routing,
            config,
            identity,
        }
    }

    /// This node's long-term Peer ID.
    pub fn peer_id(&self) -> PeerId {
        self.identity.peer_id()
    }

    /// This node's identity, for signing commands and deriving fingerprints.
    pub fn identity(&self) -> &Arc<Identity> {
        &self.identity
    }

    /// Shared controller surface (L3 operations and event queue).
    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    /// Routing table of live sessions.
    pub fn routing(&self) -> &Arc<RoutingTable> {
        &self.routing
    }

    /// Node configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Health monitor, polled periodically against current session count
    /// and resource usage.
    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Rate limiter guarding inbound connection/session traffic.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// IP reputation tracker for inbound first-contact handshakes.
    pub fn ip_reputation(&self) -> &IpReputationSystem {
        &self.ip_reputation
    }

    /// Per-peer circuit breaker gating the reachability ladder.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Start the node: marks the controller ready, emitting `core_ready`.
    /// Listener accept loops are driven by the transport layer, outside
    /// this call.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        self.controller.start();
        tracing::info!(peer_id = %self.peer_id(), "node started");
    }

    /// Whether the node is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the node.
    ///
    /// Flips the running flag first so any poll loop observes it, then
    /// tears down the controller (closes its streams and clears routes),
    /// then clears the routing table directly in case routes were added
    /// concurrently. `identity` outlives all of this; it is only dropped
    /// when the last `Node` reference goes away.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.controller.stop();
        self.routing.clear();
        tracing::info!(peer_id = %self.peer_id(), "node stopped");
    }

    /// Run the bounded reachability ladder against `peer_id` at `addr`:
    /// short dial, long dial, hole-punch, relay, in that order, gated by
    /// the per-peer circuit breaker. On success, registers a pending
    /// session in the routing table and opens a `chat/1` stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the circuit is open, no dialer is configured,
    /// or every stage of the ladder fails.
    pub async fn connect(&self, peer_id: PeerId, addr: SocketAddr) -> Result<()> {
        if !self.circuit_breaker.allows_request(&peer_id).await {
            return Err(NodeError::transport("circuit open for peer"));
        }

        let Some(dialer) = &self.dialer else {
            return Err(NodeError::transport("no dialer configured"));
        };

        let short_timeout = std::time::Duration::from_millis(500);
        let long_timeout = self.config.transport.connection_timeout;

        let mut last_err = None;
        for timeout in [short_timeout, long_timeout] {
            match dialer.dial(addr, timeout).await {
                Ok(outcome) => return self.finish_connect(peer_id, outcome).await,
                Err(err) => last_err = Some(err),
            }
        }

        if self.config.discovery.enable_nat_traversal {
            match dialer.hole_punch(&peer_id).await {
                Ok(outcome) => return self.finish_connect(peer_id, outcome).await,
                Err(err) => last_err = Some(err),
            }
        }

        if self.config.discovery.enable_relay {
            match dialer.relay_dial(&peer_id).await {
                Ok(outcome) => return self.finish_connect(peer_id, outcome).await,
                Err(err) => last_err = Some(err),
            }
        }

        self.circuit_breaker.record_failure(&peer_id).await;
        Err(last_err.unwrap_or_else(|| NodeError::transport("connect_exhausted")))
    }

    async fn finish_connect(&self, peer_id: PeerId, outcome: DialOutcome) -> Result<()> {
        self.circuit_breaker.record_success(&peer_id).await;
        self.rate_limiter.increment_sessions();
        let mut session = Session::prepare(&mut OsRng);

        if let Some(transport) = &self.transport {
            let local_ephemeral_public = *session.local_ephemeral_public();
            let (reply_tx, reply_rx) = oneshot::channel();
            self.pending_handshakes.insert(peer_id, reply_tx);

            if let Err(err) = self
                .send_ping_envelope(transport.as_ref(), outcome.addr, local_ephemeral_public)
                .await
            {
                self.pending_handshakes.remove(&peer_id);
                tracing::debug!(peer = %peer_id, %err, "failed to send handshake ping");
            } else {
                match tokio::time::timeout(HANDSHAKE_REPLY_TIMEOUT, reply_rx).await {
                    Ok(Ok(peer_ephemeral_bytes)) => {
                        let peer_public = PublicKey::from_bytes(peer_ephemeral_bytes);
                        if let Err(err) = session.activate_as_initiator(&peer_public) {
                            tracing::warn!(peer = %peer_id, %err, "handshake activation failed; session remains pending");
                        }
                    }
                    _ => {
                        self.pending_handshakes.remove(&peer_id);
                        tracing::debug!(peer = %peer_id, "no handshake reply; session remains pending");
                    }
                }
            }
        }

        let connection = Arc::new(PeerConnection::new(peer_id, outcome.addr, session));
        self.routing.add_route(peer_id, connection);
        self.controller.notify_peer_connected(peer_id);
        self.controller
            .open_stream(peer_id, PROTOCOL_CHAT)
            .map(|_| ())
    }

    async fn send_ping_envelope(
        &self,
        transport: &dyn OverlayTransport,
        dest: SocketAddr,
        ephemeral_public: PublicKey,
    ) -> Result<()> {
        let body = HandshakeBody {
            peer_id: *self.peer_id().as_bytes(),
            ephemeral_public: ephemeral_public.to_bytes(),
        };
        let encoded =
            bincode::serialize(&body).map_err(|e| NodeError::Serialization(e.to_string().into()))?;
        let frame = dispatch::encode_frame(MessageType::PingEnvelope, &encoded);
        transport.send_datagram(dest, &frame).await
    }

    /// Tear down the session and routing entry for a peer that disconnected.
    pub fn disconnect(&self, peer_id: &PeerId) {
        self.routing.remove_route(peer_id);
        self.rate_limiter.remove_session(peer_id);
        self.controller.notify_peer_disconnected(*peer_id);
    }

    /// Drive the overlay transport's inbound side: receive frames in a loop
    /// and route each to the handshake handler or the controller's
    /// decrypted-message path. Runs until `Node::stop` flips the running
    /// flag or the transport errors out; callers spawn this as its own task
    /// alongside `Node::start`.
    ///
    /// # Errors
    ///
    /// Returns an error immediately if no transport is configured.
    pub async fn run_receive_loop(self: Arc<Self>) -> Result<()> {
        let Some(transport) = self.transport.clone() else {
            return Err(NodeError::transport("no overlay transport configured"));
        };
        while self.is_running() {
            match transport.recv_datagram().await {
                Ok((frame, from_addr)) => self.handle_inbound_frame(&frame, from_addr).await,
                Err(err) => {
                    tracing::warn!(%err, "overlay transport receive failed");
                }
            }
        }
        Ok(())
    }

    async fn handle_inbound_frame(&self, frame: &[u8], from_addr: SocketAddr) {
        let (message_type, body) = match dispatch::decode_frame(frame) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::debug!(%err, from = %from_addr, "dropping malformed inbound frame");
                return;
            }
        };

        match message_type {
            MessageType::PingEnvelope => self.handle_handshake(body, from_addr).await,
            MessageType::SecureEnvelope => self.handle_secure_envelope(body),
            MessageType::SignedCommand | MessageType::Signaling => {
                let Some(sender) = self.routing.find_by_addr(from_addr) else {
                    tracing::debug!(
                        from = %from_addr,
                        "dropping signed command/signaling frame from an unrouted address"
                    );
                    return;
                };
                self.controller
                    .notify_new_message(sender, message_type.tag(), body.to_vec());
            }
        }
    }

    fn handle_secure_envelope(&self, body: &[u8]) {
        let envelope: crate::node::controller::SecureEnvelopeBody = match bincode::deserialize(body) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!(%err, "dropping malformed secure envelope");
                return;
            }
        };
        let sender = PeerId::from_bytes(envelope.sender);
        let Some(connection) = self.routing.lookup(&sender) else {
            tracing::debug!(peer = %sender, "secure envelope from unknown peer");
            return;
        };

        let controller = Arc::clone(&self.controller);
        let sender_for_task = sender;
        tokio::spawn(async move {
            match connection.decrypt(&envelope.message).await {
                Ok(plaintext) => {
                    controller.notify_new_message(
                        sender_for_task,
                        MessageType::SecureEnvelope.tag(),
                        plaintext,
                    );
                }
                Err(err) => {
                    tracing::debug!(peer = %sender_for_task, %err, "failed to decrypt inbound message");
                }
            }
        });
    }

    async fn handle_handshake(&self, body: &[u8], from_addr: SocketAddr) {
        let handshake: HandshakeBody = match bincode::deserialize(body) {
            Ok(handshake) => handshake,
            Err(err) => {
                tracing::debug!(%err, from = %from_addr, "dropping malformed handshake");
                return;
            }
        };
        let peer_id = PeerId::from_bytes(handshake.peer_id);
        let peer_ephemeral_public = PublicKey::from_bytes(handshake.ephemeral_public);

        // A reply to a handshake we initiated: hand the ephemeral key to
        // `finish_connect`, which is waiting on the oneshot.
        if let Some((_, waiter)) = self.pending_handshakes.remove(&peer_id) {
            let _ = waiter.send(handshake.ephemeral_public);
            return;
        }

        // Otherwise this is an inbound dial: activate a fresh session as
        // the recipient and reply with our own ephemeral key.
        if self.routing.has_route(&peer_id) {
            tracing::debug!(peer = %peer_id, "ignoring handshake from already-connected peer");
            return;
        }

        let mut session = Session::prepare(&mut OsRng);
        let local_ephemeral_public = *session.local_ephemeral_public();
        if let Err(err) = session.activate_as_recipient(&peer_ephemeral_public) {
            tracing::warn!(peer = %peer_id, %err, "inbound handshake activation failed");
            return;
        }

        let connection = Arc::new(PeerConnection::new(peer_id, from_addr, session));
        self.routing.add_route(peer_id, connection);
        self.rate_limiter.increment_sessions();
        self.controller.notify_peer_connected(peer_id);
        let _ = self.controller.register_incoming_stream(peer_id, PROTOCOL_CHAT);

        if let Some(transport) = &self.transport {
            if let Err(err) = self
                .send_ping_envelope(transport.as_ref(), from_addr, local_ephemeral_public)
                .await
            {
                tracing::debug!(peer = %peer_id, %err, "failed to reply to handshake");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct AlwaysFailDialer {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Dialer for AlwaysFailDialer {
        async fn dial(&self, _addr: SocketAddr, _timeout: std::time::Duration) -> Result<DialOutcome> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(NodeError::transport("dial failed"))
        }
        async fn hole_punch(&self, _peer_id: &PeerId) -> Result<DialOutcome> {
            Err(NodeError::transport("hole punch failed"))
        }
        async fn relay_dial(&self, _peer_id: &PeerId) -> Result<DialOutcome> {
            Err(NodeError::transport("relay failed"))
        }
    }

    struct SucceedsOnHolePunch {
        addr: SocketAddr,
    }

    #[async_trait]
    impl Dialer for SucceedsOnHolePunch {
        async fn dial(&self, _addr: SocketAddr, _timeout: std::time::Duration) -> Result<DialOutcome> {
            Err(NodeError::transport("direct dial failed"))
        }
        async fn hole_punch(&self, _peer_id: &PeerId) -> Result<DialOutcome> {
            Ok(DialOutcome { addr: self.addr })
        }
        async fn relay_dial(&self, _peer_id: &PeerId) -> Result<DialOutcome> {
            Err(NodeError::transport("relay failed"))
        }
    }

    struct DirectDialer {
        addr: SocketAddr,
    }

    #[async_trait]
    impl Dialer for DirectDialer {
        async fn dial(&self, _addr: SocketAddr, _timeout: std::time::Duration) -> Result<DialOutcome> {
            Ok(DialOutcome { addr: self.addr })
        }
        async fn hole_punch(&self, _peer_id: &PeerId) -> Result<DialOutcome> {
            Err(NodeError::transport("hole punch failed"))
        }
        async fn relay_dial(&self, _peer_id: &PeerId) -> Result<DialOutcome> {
            Err(NodeError::transport("relay failed"))
        }
    }

    /// A tiny in-process "network": each node's transport is keyed by its
    /// socket address, and sending delivers straight into the destination's
    /// inbound queue. Lets the handshake and receive-loop logic be tested
    /// end to end without a real socket.
    #[derive(Default)]
    struct InMemoryNetwork {
        inboxes: std::sync::Mutex<std::collections::HashMap<SocketAddr, tokio::sync::mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>>>,
    }

    struct InMemoryTransport {
        local_addr: SocketAddr,
        network: Arc<InMemoryNetwork>,
        inbox: tokio::sync::Mutex<tokio::sync::mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>>,
    }

    impl InMemoryTransport {
        fn register(network: Arc<InMemoryNetwork>, local_addr: SocketAddr) -> Arc<Self> {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            network.inboxes.lock().unwrap().insert(local_addr, tx);
            Arc::new(Self {
                local_addr,
                network,
                inbox: tokio::sync::Mutex::new(rx),
            })
        }
    }

    #[async_trait]
    impl OverlayTransport for InMemoryTransport {
        async fn send_datagram(&self, dest: SocketAddr, frame: &[u8]) -> Result<()> {
            let sender = self
                .network
                .inboxes
                .lock()
                .unwrap()
                .get(&dest)
                .cloned()
                .ok_or_else(|| NodeError::transport("no such peer in test network"))?;
            sender
                .send((frame.to_vec(), self.local_addr))
                .map_err(|_| NodeError::transport("peer inbox closed"))
        }

        async fn recv_datagram(&self) -> Result<(Vec<u8>, SocketAddr)> {
            self.inbox
                .lock()
                .await
                .recv()
                .await
                .ok_or_else(|| NodeError::transport("inbox closed"))
        }

        fn local_addr(&self) -> Result<SocketAddr> {
            Ok(self.local_addr)
        }
    }

    fn test_peer(seed: u8) -> PeerId {
        Identity::from_seed(&[seed; 32]).peer_id()
    }

    #[test]
    fn peer_id_is_derived_from_identity() {
        let node = Node::new_random(NodeConfig::default());
        assert_eq!(node.peer_id(), node.identity().peer_id());
    }

    #[test]
    fn start_stop_toggles_running() {
        let node = Node::new_random(NodeConfig::default());
        assert!(!node.is_running());
        node.start();
        assert!(node.is_running());
        node.stop();
        assert!(!node.is_running());
    }

    #[tokio::test]
    async fn connect_without_dialer_fails_fast() {
        let node = Node::new_random(NodeConfig::default());
        let addr = "127.0.0.1:9999".parse().unwrap();
        assert!(node.connect(test_peer(1), addr).await.is_err());
    }

    #[tokio::test]
    async fn connect_exhausts_ladder_and_opens_circuit() {
        let mut config = NodeConfig::default();
        config.discovery.enable_nat_traversal = true;
        config.discovery.enable_relay = true;

        let dialer = Arc::new(AlwaysFailDialer {
            attempts: AtomicUsize::new(0),
        });
        let node = Node::with_backends(
            config,
            Identity::generate(&mut OsRng),
            None,
            Some(dialer.clone()),
        );
        let addr = "127.0.0.1:9999".parse().unwrap();
        let peer = test_peer(2);

        let result = node.connect(peer, addr).await;
        assert!(result.is_err());
        assert_eq!(dialer.attempts.load(Ordering::SeqCst), 2);
        assert!(!node.routing().has_route(&peer));
    }

    #[tokio::test]
    async fn connect_succeeds_via_hole_punch_and_registers_route() {
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let dialer = Arc::new(SucceedsOnHolePunch { addr });
        let node = Node::with_backends(
            NodeConfig::default(),
            Identity::generate(&mut OsRng),
            None,
            Some(dialer),
        );
        let peer = test_peer(3);

        node.connect(peer, addr).await.unwrap();
        assert!(node.routing().has_route(&peer));
    }

    #[tokio::test]
    async fn disconnect_removes_route() {
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let dialer = Arc::new(SucceedsOnHolePunch { addr });
        let node = Node::with_backends(
            NodeConfig::default(),
            Identity::generate(&mut OsRng),
            None,
            Some(dialer),
        );
        let peer = test_peer(4);
        node.connect(peer, addr).await.unwrap();
        assert!(node.routing().has_route(&peer));

        node.disconnect(&peer);
        assert!(!node.routing().has_route(&peer));
    }

    #[tokio::test]
    async fn connect_performs_handshake_and_delivers_real_message() {
        let network = Arc::new(InMemoryNetwork::default());
        let addr_a: SocketAddr = "127.0.0.1:7001".parse().unwrap();
        let addr_b: SocketAddr = "127.0.0.1:7002".parse().unwrap();

        let transport_a = InMemoryTransport::register(network.clone(), addr_a);
        let transport_b = InMemoryTransport::register(network.clone(), addr_b);

        let node_a = Arc::new(Node::with_full_backends(
            NodeConfig::default(),
            Identity::from_seed(&[10; 32]),
            None,
            Some(Arc::new(DirectDialer { addr: addr_b })),
            Some(transport_a as Arc<dyn OverlayTransport>),
        ));
        let node_b = Arc::new(Node::with_full_backends(
            NodeConfig::default(),
            Identity::from_seed(&[11; 32]),
            None,
            None,
            Some(transport_b as Arc<dyn OverlayTransport>),
        ));
        node_a.start();
        node_b.start();

        let mut b_events = node_b.controller().take_event_receiver().await.unwrap();
        tokio::spawn(node_b.clone().run_receive_loop());
        tokio::spawn(node_a.clone().run_receive_loop());

        node_a.connect(node_b.peer_id(), addr_b).await.unwrap();

        // The handshake activated a real session on A's side.
        let connection = node_a.routing().lookup(&node_b.peer_id()).unwrap();
        assert_eq!(connection.state().await, crate::session::SessionState::Active);

        node_a
            .controller()
            .send_to_peer(&node_b.peer_id(), b"hello from a")
            .await
            .unwrap();

        let plaintext = loop {
            match tokio::time::timeout(std::time::Duration::from_secs(2), b_events.recv())
                .await
                .unwrap()
                .unwrap()
            {
                crate::node::controller::ControllerEvent::NewMessage { data, .. } => break data,
                _ => continue,
            }
        };
        assert_eq!(plaintext, b"hello from a");
    }
}
