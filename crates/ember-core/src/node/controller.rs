//! Controller: the public operational surface over the overlay node.
//!
//! Exposes start/stop, unicast/broadcast, stream open/write/close, and
//! peer/content lookup, and funnels network notifications into a single
//! bounded, single-consumer event queue. The queue drops the newest event
//! (not the oldest) on overflow, logging the drop, so a slow consumer loses
//! the least-useful event rather than corrupting ordering of what it has
//! already been shown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ember_crypto::identity::PeerId;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};

use crate::node::dispatch::{self, MessageType};
use crate::node::error::{NodeError, Result};
use crate::node::routing::RoutingTable;
use crate::node::transport::OverlayTransport;
use crate::session::EncryptedMessage;

/// Capacity of the controller's event queue before newest events are dropped.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Registered `chat/1` protocol identifier for framed small messages.
pub const PROTOCOL_CHAT: &str = "chat/1";
/// Registered `file/1` protocol identifier for bulk file streams.
pub const PROTOCOL_FILE: &str = "file/1";

/// Monotonically increasing identifier for an open stream.
pub type StreamId = u64;

/// Events surfaced to upper layers through the controller's event queue.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// The node has finished starting and is ready; carries its own Peer ID.
    CoreReady { peer_id: PeerId },
    /// A new session became reachable.
    PeerConnected { peer_id: PeerId },
    /// A previously connected peer is no longer reachable.
    PeerDisconnected { peer_id: PeerId },
    /// A decrypted application message arrived from `sender_id`.
    NewMessage {
        sender_id: PeerId,
        message_type: u8,
        data: Vec<u8>,
    },
    /// A peer opened a new inbound stream on `protocol_id`.
    NewIncomingStream {
        stream_id: StreamId,
        peer_id: PeerId,
        protocol_id: String,
    },
    /// Raw bytes arrived on an open stream.
    StreamDataReceived { stream_id: StreamId, data: Vec<u8> },
    /// A stream (inbound or outbound) has closed.
    StreamClosed { stream_id: StreamId, peer_id: PeerId },
}

/// Address information returned by [`Controller::find_peer`].
#[derive(Debug, Clone)]
pub struct PeerAddressInfo {
    pub peer_id: PeerId,
    pub addresses: Vec<std::net::SocketAddr>,
}

/// Discovery operations the controller delegates to, kept as a trait so
/// `ember-core` does not need a hard dependency on `ember-discovery`'s
/// concrete DHT client.
#[async_trait]
pub trait DiscoveryHandle: Send + Sync {
    /// Resolve current addresses for `peer_id` via the DHT.
    async fn find_peer(&self, peer_id: &PeerId) -> Result<PeerAddressInfo>;
    /// Publish that this node provides `content_id`.
    async fn provide_content(&self, content_id: &str) -> Result<()>;
    /// Look up providers of `content_id`, excluding self.
    async fn find_providers(&self, content_id: &str) -> Result<Vec<PeerId>>;
}

struct StreamHandle {
    peer_id: PeerId,
    protocol_id: String,
}

/// Wire body of a `SecureEnvelope` frame: an encrypted session message
/// tagged with the sender's Peer ID so the receiving node can look up the
/// right session before decrypting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecureEnvelopeBody {
    pub sender: [u8; 20],
    pub message: EncryptedMessage,
}

/// Implements the L3 controller operations over a [`RoutingTable`] of live
/// sessions plus an injected discovery backend.
pub struct Controller {
    self_peer_id: PeerId,
    routing: Arc<RoutingTable>,
    streams: DashMap<StreamId, StreamHandle>,
    next_stream_id: AtomicU64,
    event_tx: mpsc::Sender<ControllerEvent>,
    event_rx: RwLock<Option<mpsc::Receiver<ControllerEvent>>>,
    discovery: Option<Arc<dyn DiscoveryHandle>>,
    transport: Option<Arc<dyn OverlayTransport>>,
    running: std::sync::atomic::AtomicBool,
}

impl Controller {
    /// Build a controller for `self_peer_id`, routing through `routing`,
    /// with no outbound transport wired (sends fail with a transport error).
    pub fn new(self_peer_id: PeerId, routing: Arc<RoutingTable>, discovery: Option<Arc<dyn DiscoveryHandle>>) -> Self {
        Self::with_transport(self_peer_id, routing, discovery, None)
    }

    /// Build a controller with an outbound transport so `send_to_peer` and
    /// `write_to_stream` actually put bytes on the wire.
    pub fn with_transport(
        self_peer_id: PeerId,
        routing: Arc<RoutingTable>,
        discovery: Option<Arc<dyn DiscoveryHandle>>,
        transport: Option<Arc<dyn OverlayTransport>>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        Self {
            self_peer_id,
            routing,
            streams: DashMap::new(),
            next_stream_id: AtomicU64::new(1),
            event_tx,
            event_rx: RwLock::new(Some(event_rx)),
            discovery,
            transport,
            running: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Take ownership of the event receiver. May only be called once; later
    /// calls return `None`.
    pub async fn take_event_receiver(&self) -> Option<mpsc::Receiver<ControllerEvent>> {
        self.event_rx.write().await.take()
    }

    /// Push an event onto the queue, dropping it (not an older one) and
    /// logging if the queue is full.
    fn emit(&self, event: ControllerEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            tracing::warn!("controller event queue full; dropping newest event");
        }
    }

    /// Mark the node ready, emitting `core_ready`.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        self.emit(ControllerEvent::CoreReady {
            peer_id: self.self_peer_id,
        });
    }

    /// Whether [`Controller::start`] has been called without a matching [`Controller::stop`].
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Shut down: flips the running flag first so any poll loops observe it,
    /// then clears streams and routes.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.streams.clear();
        self.routing.clear();
    }

    /// Send `payload` to `peer_id` over its active session.
    ///
    /// Encrypts under the peer's session, frames the result as a
    /// `SecureEnvelope`, and hands it to the configured transport. If the
    /// session is still pending, the plaintext is queued inside the
    /// session and this returns `Ok(())` without touching the wire; it
    /// will go out once the session activates and a later send flushes it.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::PeerNotFound`] if no session is routed for
    /// `peer_id`, or a transport error if no transport is configured or
    /// the send itself fails.
    pub async fn send_to_peer(&self, peer_id: &PeerId, payload: &[u8]) -> Result<()> {
        let connection = self
            .routing
            .lookup(peer_id)
            .ok_or_else(|| NodeError::PeerNotFound(peer_id.to_string()))?;
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| NodeError::transport("no outbound transport configured"))?;

        let Some(message) = connection.encrypt(payload).await? else {
            tracing::debug!(peer = %peer_id, "session pending; message queued, not yet sent");
            return Ok(());
        };

        let body = SecureEnvelopeBody {
            sender: *self.self_peer_id.as_bytes(),
            message,
        };
        let encoded = bincode::serialize(&body)
            .map_err(|e| NodeError::Serialization(e.to_string().into()))?;
        let frame = dispatch::encode_frame(MessageType::SecureEnvelope, &encoded);
        transport.send_datagram(connection.peer_addr, &frame).await
    }

    /// Send a pre-built frame to `peer_id` without going through session
    /// encryption, for message types that must work before an application
    /// session exists: signed commands (self-authenticating by their own
    /// signature) and call signaling, which the wire format transmits
    /// unencrypted for exactly this reason.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::PeerNotFound`] if no route exists for
    /// `peer_id`, or a transport error if no transport is configured or
    /// the send itself fails.
    pub async fn send_raw_frame(
        &self,
        peer_id: &PeerId,
        message_type: MessageType,
        body: &[u8],
    ) -> Result<()> {
        let connection = self
            .routing
            .lookup(peer_id)
            .ok_or_else(|| NodeError::PeerNotFound(peer_id.to_string()))?;
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| NodeError::transport("no outbound transport configured"))?;
        let frame = dispatch::encode_frame(message_type, body);
        transport.send_datagram(connection.peer_addr, &frame).await
    }

    /// Best-effort send to every connected peer. Per-peer failures are
    /// logged, never surfaced, matching the spec's broadcast contract.
    pub async fn broadcast(&self, payload: &[u8]) {
        for peer_id in self.routing.active_routes() {
            if let Err(err) = self.send_to_peer(&peer_id, payload).await {
                tracing::debug!(peer = %peer_id, error = %err, "broadcast send failed");
            }
        }
    }

    /// Open a new outbound stream to `peer_id` over `protocol_id`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::PeerNotFound`] if `peer_id` is not reachable.
    pub fn open_stream(&self, peer_id: PeerId, protocol_id: &str) -> Result<StreamId> {
        if !self.routing.has_route(&peer_id) {
            return Err(NodeError::PeerNotFound(peer_id.to_string()));
        }
        let stream_id = self.next_stream_id.fetch_add(1, Ordering::SeqCst);
        self.streams.insert(
            stream_id,
            StreamHandle {
                peer_id,
                protocol_id: protocol_id.to_string(),
            },
        );
        Ok(stream_id)
    }

    /// Record an inbound stream opened by a remote peer, emitting
    /// `new_incoming_stream`.
    pub fn register_incoming_stream(&self, peer_id: PeerId, protocol_id: &str) -> StreamId {
        let stream_id = self.next_stream_id.fetch_add(1, Ordering::SeqCst);
        self.streams.insert(
            stream_id,
            StreamHandle {
                peer_id,
                protocol_id: protocol_id.to_string(),
            },
        );
        self.emit(ControllerEvent::NewIncomingStream {
            stream_id,
            peer_id,
            protocol_id: protocol_id.to_string(),
        });
        stream_id
    }

    /// Surface bytes received on an already-open stream.
    pub fn deliver_stream_data(&self, stream_id: StreamId, data: Vec<u8>) -> Result<()> {
        if !self.streams.contains_key(&stream_id) {
            return Err(NodeError::invalid_state("unknown_stream"));
        }
        self.emit(ControllerEvent::StreamDataReceived { stream_id, data });
        Ok(())
    }

    /// Write `bytes` to an already-open stream.
    ///
    /// The protocol id distinguishes `chat/1` from `file/1` at the
    /// application layer above; both ride the same per-peer encrypted
    /// session, so this resolves the stream's peer and forwards through
    /// [`Controller::send_to_peer`].
    ///
    /// # Errors
    ///
    /// Returns an error if `stream_id` is not open, or if the send fails.
    pub async fn write_to_stream(&self, stream_id: StreamId, bytes: &[u8]) -> Result<()> {
        let peer_id = self
            .streams
            .get(&stream_id)
            .map(|handle| handle.peer_id)
            .ok_or_else(|| NodeError::invalid_state("unknown_stream"))?;
        self.send_to_peer(&peer_id, bytes).await
    }

    /// Close a stream, emitting `stream_closed`.
    ///
    /// # Errors
    ///
    /// Returns an error if `stream_id` is not open.
    pub fn close_stream(&self, stream_id: StreamId) -> Result<()> {
        match self.streams.remove(&stream_id) {
            Some((_, handle)) => {
                self.emit(ControllerEvent::StreamClosed {
                    stream_id,
                    peer_id: handle.peer_id,
                });
                Ok(())
            }
            None => Err(NodeError::invalid_state("unknown_stream")),
        }
    }

    /// Number of currently open streams.
    pub fn open_stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Record that a peer became reachable, emitting `peer_connected`.
    pub fn notify_peer_connected(&self, peer_id: PeerId) {
        self.emit(ControllerEvent::PeerConnected { peer_id });
    }

    /// Record that a peer became unreachable, emitting `peer_disconnected`.
    pub fn notify_peer_disconnected(&self, peer_id: PeerId) {
        self.emit(ControllerEvent::PeerDisconnected { peer_id });
    }

    /// Surface a decrypted application message, emitting `new_message`.
    pub fn notify_new_message(&self, sender_id: PeerId, message_type: u8, data: Vec<u8>) {
        self.emit(ControllerEvent::NewMessage {
            sender_id,
            message_type,
            data,
        });
    }

    /// Resolve `peer_id`'s current addresses via the discovery backend.
    ///
    /// # Errors
    ///
    /// Returns an error if no discovery backend is configured or the
    /// lookup fails/times out.
    pub async fn find_peer(&self, peer_id: &PeerId) -> Result<PeerAddressInfo> {
        match &self.discovery {
            Some(discovery) => discovery.find_peer(peer_id).await,
            None => Err(NodeError::discovery("no discovery backend configured")),
        }
    }

    /// Publish that this node provides `content_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if no discovery backend is configured.
    pub async fn provide_content(&self, content_id: &str) -> Result<()> {
        match &self.discovery {
            Some(discovery) => discovery.provide_content(content_id).await,
            None => Err(NodeError::discovery("dht_unavailable")),
        }
    }

    /// Find providers of `content_id`, excluding self.
    ///
    /// # Errors
    ///
    /// Returns an error if no discovery backend is configured or no
    /// providers are found.
    pub async fn find_providers(&self, content_id: &str) -> Result<Vec<PeerId>> {
        match &self.discovery {
            Some(discovery) => discovery.find_providers(content_id).await,
            None => Err(NodeError::discovery("dht_unavailable")),
        }
    }
}

/// Protocol table mapping a registered protocol id to whether it is known.
/// Kept as a tiny helper rather than a full handler registry since the
/// controller only needs registration checks; actual dispatch happens in
/// [`crate::node::dispatch`].
pub fn is_registered_protocol(protocol_id: &str) -> bool {
    matches!(protocol_id, PROTOCOL_CHAT | PROTOCOL_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use ember_crypto::identity::Identity;
    use rand_core::OsRng;
    use std::net::SocketAddr;
    use std::sync::Mutex;

    fn test_peer(seed: u8) -> PeerId {
        Identity::from_seed(&[seed; 32]).peer_id()
    }

    /// Records every frame handed to it, so tests can assert real bytes
    /// were produced rather than just that the call returned `Ok`.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
    }

    #[async_trait]
    impl OverlayTransport for RecordingTransport {
        async fn send_datagram(&self, dest: SocketAddr, frame: &[u8]) -> Result<()> {
            self.sent.lock().unwrap().push((dest, frame.to_vec()));
            Ok(())
        }

        async fn recv_datagram(&self) -> Result<(Vec<u8>, SocketAddr)> {
            std::future::pending().await
        }

        fn local_addr(&self) -> Result<SocketAddr> {
            Ok("127.0.0.1:0".parse().unwrap())
        }
    }

    fn controller_with_route(self_seed: u8, peer_seed: u8) -> (Controller, PeerId, Arc<RecordingTransport>) {
        let routing = Arc::new(RoutingTable::new());
        let peer = test_peer(peer_seed);
        let addr = "127.0.0.1:6000".parse().unwrap();
        routing.add_route(
            peer,
            Arc::new(crate::node::session::PeerConnection::new(
                peer,
                addr,
                Session::prepare(&mut OsRng),
            )),
        );
        let transport = Arc::new(RecordingTransport::default());
        let controller = Controller::with_transport(
            test_peer(self_seed),
            routing,
            None,
            Some(transport.clone() as Arc<dyn OverlayTransport>),
        );
        (controller, peer, transport)
    }

    #[tokio::test]
    async fn start_emits_core_ready() {
        let (controller, _, _) = controller_with_route(1, 2);
        let mut rx = controller.take_event_receiver().await.unwrap();
        controller.start();
        assert!(controller.is_running());
        match rx.recv().await.unwrap() {
            ControllerEvent::CoreReady { peer_id } => assert_eq!(peer_id, test_peer(1)),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_to_unreachable_peer_fails() {
        let (controller, _, _) = controller_with_route(1, 2);
        let stranger = test_peer(99);
        assert!(controller.send_to_peer(&stranger, b"hi").await.is_err());
    }

    #[tokio::test]
    async fn send_without_transport_errors() {
        let routing = Arc::new(RoutingTable::new());
        let peer = test_peer(2);
        routing.add_route(
            peer,
            Arc::new(crate::node::session::PeerConnection::new(
                peer,
                "127.0.0.1:6000".parse().unwrap(),
                Session::prepare(&mut OsRng),
            )),
        );
        let controller = Controller::new(test_peer(1), routing, None);
        assert!(controller.send_to_peer(&peer, b"hi").await.is_err());
    }

    #[tokio::test]
    async fn send_to_routed_peer_with_active_session_reaches_transport() {
        let (controller, peer, transport) = controller_with_route(1, 2);
        // Sessions start pending; the message is queued, not sent yet.
        controller.send_to_peer(&peer, b"hi").await.unwrap();
        assert!(transport.sent.lock().unwrap().is_empty());

        // Once the session activates, a send actually reaches the transport
        // as an encoded SecureEnvelope frame addressed to the peer.
        let remote = Session::prepare(&mut OsRng);
        let remote_pub = *remote.local_ephemeral_public();
        let connection = routing_peer_connection(&controller, &peer).unwrap();
        connection.activate_as_initiator(&remote_pub).await.unwrap();

        controller.send_to_peer(&peer, b"hi").await.unwrap();
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, connection.peer_addr);
        assert_eq!(sent[0].1[0], MessageType::SecureEnvelope.tag());
    }

    fn routing_peer_connection(
        controller: &Controller,
        peer: &PeerId,
    ) -> Option<Arc<crate::node::session::PeerConnection>> {
        controller.routing.lookup(peer)
    }

    #[tokio::test]
    async fn stream_ids_are_monotonic_and_lifecycle_works() {
        let (controller, peer, _transport) = controller_with_route(1, 2);
        let s1 = controller.open_stream(peer, PROTOCOL_CHAT).unwrap();
        let s2 = controller.open_stream(peer, PROTOCOL_FILE).unwrap();
        assert!(s2 > s1);
        assert_eq!(controller.open_stream_count(), 2);

        assert!(controller.write_to_stream(s1, b"data").await.is_ok());
        assert!(controller.close_stream(s1).is_ok());
        assert_eq!(controller.open_stream_count(), 1);
        assert!(controller.write_to_stream(s1, b"data").await.is_err());
    }

    #[tokio::test]
    async fn closing_unknown_stream_fails() {
        let (controller, _, _) = controller_with_route(1, 2);
        assert!(controller.close_stream(999).is_err());
    }

    #[tokio::test]
    async fn event_queue_drops_newest_when_full() {
        let routing = Arc::new(RoutingTable::new());
        let controller = Controller::new(test_peer(1), routing, None);
        // Fill the queue without a consumer draining it.
        for _ in 0..(EVENT_QUEUE_CAPACITY + 10) {
            controller.notify_peer_connected(test_peer(2));
        }
        // No panic, and the channel never exceeds its bound: this is the
        // defining behavior under test.
        assert!(controller.open_stream_count() == 0);
    }

    #[tokio::test]
    async fn find_peer_without_discovery_backend_errors() {
        let (controller, _, _) = controller_with_route(1, 2);
        assert!(controller.find_peer(&test_peer(2)).await.is_err());
    }

    #[test]
    fn protocol_registration() {
        assert!(is_registered_protocol(PROTOCOL_CHAT));
        assert!(is_registered_protocol(PROTOCOL_FILE));
        assert!(!is_registered_protocol("unknown/1"));
    }
}
