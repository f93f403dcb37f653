//! Discovery manager: ties the local-link broadcaster, DHT-style rendezvous
//! directory, NAT detection/hole-punching, and relay fallback together
//! behind the [`ember_core`] `DiscoveryHandle` trait.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ember_core::node::controller::{DiscoveryHandle, PeerAddressInfo};
use ember_core::node::error::{NodeError, Result as NodeResult};
use ember_crypto::identity::PeerId;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::sleep;

use crate::broadcast::LocalLinkFinder;
use crate::dht::{ContentId, RendezvousDirectory};
use crate::nat::{HolePuncher, IceGatherer, NatDetector, NatType};
use crate::relay::client::{RelayClient, RelayClientState};
use crate::relay::selection::{RelayInfo, RelaySelector};

/// Errors raised while configuring or running discovery. The
/// `DiscoveryHandle` impl below translates lookup failures into
/// `NodeError::discovery(...)` at the trait boundary; this type covers the
/// manager's own lifecycle operations (`start`/`connect_to_peer`).
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("local-link broadcast failed: {0}")]
    Broadcast(#[from] crate::broadcast::BroadcastError),
    #[error("relay connection failed: {0}")]
    Relay(String),
}

/// Static configuration for a [`DiscoveryManager`].
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// This node's identity.
    pub self_id: PeerId,
    /// Address the overlay transport listens on (advertised to peers).
    pub listen_addr: SocketAddr,
    /// Fixed rendezvous tag both finders advertise under.
    pub rendezvous_tag: String,
    /// UDP broadcast port used by the local-link finder.
    pub broadcast_port: u16,
    /// STUN servers used for NAT detection and ICE gathering.
    pub stun_servers: Vec<SocketAddr>,
    /// Known relay servers, ordered by preference.
    pub relay_servers: Vec<RelayInfo>,
    /// Whether to run NAT type detection on start.
    pub nat_detection_enabled: bool,
    /// Whether to maintain relay connections.
    pub relay_enabled: bool,
    /// How long `find_peer` waits for the directory to surface an address
    /// before giving up (spec: ~30s).
    pub find_peer_timeout: Duration,
}

impl DiscoveryConfig {
    /// Start a config with sane defaults for everything but identity,
    /// listen address, and rendezvous tag.
    #[must_use]
    pub fn new(self_id: PeerId, listen_addr: SocketAddr, rendezvous_tag: String) -> Self {
        Self {
            self_id,
            listen_addr,
            rendezvous_tag,
            broadcast_port: 41337,
            stun_servers: Vec::new(),
            relay_servers: Vec::new(),
            nat_detection_enabled: true,
            relay_enabled: true,
            find_peer_timeout: Duration::from_secs(30),
        }
    }

    /// Add a STUN server used for NAT detection and ICE gathering.
    #[must_use]
    pub fn with_stun_server(mut self, addr: SocketAddr) -> Self {
        self.stun_servers.push(addr);
        self
    }

    /// Add a known relay server.
    #[must_use]
    pub fn with_relay_server(mut self, relay: RelayInfo) -> Self {
        self.relay_servers.push(relay);
        self
    }
}

/// How a [`PeerConnection`] was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    /// Direct connection, no NAT traversal needed.
    Direct,
    /// Established via UDP hole punching.
    HolePunched,
    /// Routed through a relay server.
    Relayed,
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::HolePunched => write!(f, "hole-punched"),
            Self::Relayed => write!(f, "relayed"),
        }
    }
}

/// A resolved path to a peer.
#[derive(Debug, Clone)]
pub struct PeerConnection {
    /// The peer this connection reaches.
    pub peer_id: PeerId,
    /// The address (or relay address, for `Relayed`) to dial.
    pub addr: SocketAddr,
    /// How the address was resolved.
    pub connection_type: ConnectionType,
}

/// Lifecycle state of a [`DiscoveryManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    /// Not running; no finders active.
    Stopped,
    /// `start` is in progress.
    Starting,
    /// Finders active, ready to serve lookups.
    Running,
    /// `stop` is in progress.
    Stopping,
}

/// Runs the two concurrent finders (local-link broadcast, DHT-style
/// rendezvous) plus NAT/relay machinery, and exposes the
/// find_peer/provide_content/find_providers surface the controller calls
/// through [`DiscoveryHandle`].
pub struct DiscoveryManager {
    config: DiscoveryConfig,
    directory: Arc<RendezvousDirectory>,
    discovered_tx: mpsc::UnboundedSender<PeerId>,
    ice_gatherer: IceGatherer,
    hole_puncher: RwLock<Option<Arc<HolePuncher>>>,
    relay_selector: RwLock<RelaySelector>,
    relay_client: RwLock<Option<RelayClient>>,
    nat_type: RwLock<Option<NatType>>,
    state: RwLock<DiscoveryState>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DiscoveryManager {
    /// Construct a manager. Every peer either finder sights (excluding
    /// self) is pushed to the returned channel; the controller drains it
    /// and launches a best-effort connect per spec's single-callback shape.
    #[must_use]
    pub fn new(config: DiscoveryConfig) -> (Self, mpsc::UnboundedReceiver<PeerId>) {
        let (discovered_tx, discovered_rx) = mpsc::unbounded_channel();
        let mut selector = RelaySelector::new();
        for relay in &config.relay_servers {
            selector.add_relay(relay.clone());
        }
        let ice_gatherer = IceGatherer::with_stun_servers(config.stun_servers.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = Self {
            config,
            directory: Arc::new(RendezvousDirectory::new()),
            discovered_tx,
            ice_gatherer,
            hole_puncher: RwLock::new(None),
            relay_selector: RwLock::new(selector),
            relay_client: RwLock::new(None),
            nat_type: RwLock::new(None),
            state: RwLock::new(DiscoveryState::Stopped),
            shutdown_tx,
            shutdown_rx,
        };
        (manager, discovered_rx)
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> DiscoveryState {
        *self.state.read().await
    }

    /// Detected NAT type, if detection has run.
    pub async fn nat_type(&self) -> Option<NatType> {
        *self.nat_type.read().await
    }

    /// Start the local-link broadcaster, run NAT detection, and connect to
    /// the best configured relay.
    pub async fn start(&self) -> Result<(), DiscoveryError> {
        *self.state.write().await = DiscoveryState::Starting;

        if self.config.nat_detection_enabled {
            let detector = if self.config.stun_servers.is_empty() {
                NatDetector::new()
            } else {
                NatDetector::with_servers(self.config.stun_servers.clone())
            };
            match detector.detect().await {
                Ok(nat_type) => {
                    tracing::info!(%nat_type, "NAT type detected");
                    *self.nat_type.write().await = Some(nat_type);
                }
                Err(err) => tracing::warn!(%err, "NAT detection failed, assuming worst case"),
            }
        }

        *self.hole_puncher.write().await = match HolePuncher::new(self.config.listen_addr).await {
            Ok(puncher) => Some(Arc::new(puncher)),
            Err(err) => {
                tracing::warn!(%err, "failed to bind hole puncher socket");
                None
            }
        };

        match self.ice_gatherer.gather(self.config.listen_addr).await {
            Ok(candidates) => tracing::debug!(count = candidates.len(), "gathered ICE candidates"),
            Err(err) => tracing::debug!(%err, "ICE candidate gathering failed"),
        }

        if self.config.relay_enabled {
            self.connect_best_relay().await;
        }

        self.spawn_local_link();

        *self.state.write().await = DiscoveryState::Running;
        Ok(())
    }

    fn spawn_local_link(&self) {
        let bind_addr = SocketAddr::new(self.config.listen_addr.ip(), 0);
        let broadcast_port = self.config.broadcast_port;
        let tag = self.config.rendezvous_tag.clone();
        let self_id = self.config.self_id;
        let listen_port = self.config.listen_addr.port();
        let directory = Arc::clone(&self.directory);
        let discovered = self.discovered_tx.clone();
        let shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let finder =
                match LocalLinkFinder::bind(bind_addr, broadcast_port, tag, self_id, listen_port)
                    .await
                {
                    Ok(f) => f,
                    Err(err) => {
                        tracing::warn!(%err, "local-link finder failed to bind");
                        return;
                    }
                };
            if let Err(err) = finder.run(directory, discovered, shutdown_rx).await {
                tracing::warn!(%err, "local-link finder exited");
            }
        });
    }

    async fn connect_best_relay(&self) {
        let best = self.relay_selector.read().await.select_best().cloned();
        let Some(relay) = best else {
            tracing::debug!("no relay servers configured, skipping relay connect");
            return;
        };
        let node_id = relay_node_id(&self.config.self_id);
        match RelayClient::connect(relay.addr, node_id).await {
            Ok(mut client) => {
                if let Err(err) = client.register(&node_id).await {
                    tracing::warn!(%err, "relay registration failed");
                }
                *self.relay_client.write().await = Some(client);
            }
            Err(err) => tracing::warn!(%err, addr = %relay.addr, "relay connect failed"),
        }
    }

    /// Stop background finders and drop relay/hole-punch resources.
    pub async fn stop(&self) {
        *self.state.write().await = DiscoveryState::Stopping;
        let _ = self.shutdown_tx.send(true);
        *self.relay_client.write().await = None;
        *self.hole_puncher.write().await = None;
        *self.state.write().await = DiscoveryState::Stopped;
    }

    /// Resolve a path to `peer_id`: prefer a directly reachable address,
    /// fall back to hole punching, then to the active relay.
    pub async fn connect_to_peer(
        &self,
        peer_id: PeerId,
    ) -> Result<PeerConnection, DiscoveryError> {
        let known = self.directory.find_addresses(&peer_id);

        if let Some(&addr) = known.as_ref().and_then(|addrs| addrs.first()) {
            return Ok(PeerConnection {
                peer_id,
                addr,
                connection_type: ConnectionType::Direct,
            });
        }

        if let (Some(puncher), Some(&external)) = (
            self.hole_puncher.read().await.clone(),
            known.as_ref().and_then(|addrs| addrs.first()),
        ) {
            match puncher.punch(external, None).await {
                Ok(addr) => {
                    return Ok(PeerConnection {
                        peer_id,
                        addr,
                        connection_type: ConnectionType::HolePunched,
                    })
                }
                Err(err) => tracing::debug!(%err, "hole punch failed"),
            }
        }

        if let Some(client) = self.relay_client.read().await.as_ref() {
            if matches!(client.state().await, RelayClientState::Connected) {
                return Ok(PeerConnection {
                    peer_id,
                    addr: client.relay_addr(),
                    connection_type: ConnectionType::Relayed,
                });
            }
        }

        Err(DiscoveryError::Relay(format!(
            "no reachable path to {peer_id}"
        )))
    }

    async fn await_tag_member(&self, peer_id: &PeerId) -> Option<Vec<SocketAddr>> {
        let deadline = tokio::time::Instant::now() + self.config.find_peer_timeout;
        loop {
            if let Some(addrs) = self.directory.find_addresses(peer_id) {
                return Some(addrs);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            sleep(Duration::from_millis(500)).await;
        }
    }
}

fn relay_node_id(peer_id: &PeerId) -> [u8; 32] {
    let mut node_id = [0u8; 32];
    node_id[..20].copy_from_slice(peer_id.as_bytes());
    node_id
}

#[async_trait]
impl DiscoveryHandle for DiscoveryManager {
    async fn find_peer(&self, peer_id: &PeerId) -> NodeResult<PeerAddressInfo> {
        match self.await_tag_member(peer_id).await {
            Some(addresses) => Ok(PeerAddressInfo {
                peer_id: *peer_id,
                addresses,
            }),
            None => Err(NodeError::discovery("not_found")),
        }
    }

    async fn provide_content(&self, content_id: &str) -> NodeResult<()> {
        if *self.state.read().await != DiscoveryState::Running {
            return Err(NodeError::discovery("dht_unavailable"));
        }
        self.directory.provide(
            ContentId::from_str_unchecked(content_id),
            self.config.self_id,
        );
        Ok(())
    }

    async fn find_providers(&self, content_id: &str) -> NodeResult<Vec<PeerId>> {
        if *self.state.read().await != DiscoveryState::Running {
            return Err(NodeError::discovery("dht_unavailable"));
        }
        let providers = self.directory.find_providers(
            &ContentId::from_str_unchecked(content_id),
            &self.config.self_id,
        );
        if providers.is_empty() {
            return Err(NodeError::discovery("not_found"));
        }
        Ok(providers)
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

    fn config() -> DiscoveryConfig {
        DiscoveryConfig::new(
            peer(),
            "127.0.0.1:0".parse().unwrap(),
            "ember-rendezvous-v1".to_string(),
        )
    }

    #[test]
    fn config_builders_accumulate() {
        let cfg = config()
            .with_stun_server("127.0.0.1:3478".parse().unwrap())
            .with_relay_server(RelayInfo::new(
                "127.0.0.1:4000".parse().unwrap(),
                "local".to_string(),
            ));
        assert_eq!(cfg.stun_servers.len(), 1);
        assert_eq!(cfg.relay_servers.len(), 1);
    }

    #[test]
    fn connection_type_display() {
        assert_eq!(ConnectionType::Direct.to_string(), "direct");
        assert_eq!(ConnectionType::HolePunched.to_string(), "hole-punched");
        assert_eq!(ConnectionType::Relayed.to_string(), "relayed");
    }

    #[tokio::test]
    async fn manager_starts_stopped() {
        let (manager, _rx) = DiscoveryManager::new(config());
        assert_eq!(manager.state().await, DiscoveryState::Stopped);
        assert!(manager.nat_type().await.is_none());
    }

    #[tokio::test]
    async fn find_peer_times_out_when_unknown() {
        let mut cfg = config();
        cfg.find_peer_timeout = Duration::from_millis(50);
        let (manager, _rx) = DiscoveryManager::new(cfg);
        *manager.state.write().await = DiscoveryState::Running;
        let result = manager.find_peer(&peer()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn provide_and_find_providers_roundtrip() {
        let (manager, _rx) = DiscoveryManager::new(config());
        *manager.state.write().await = DiscoveryState::Running;
        assert!(manager.provide_content("abc").await.is_ok());
        // self is excluded from its own provider list, so the lookup still
        // reports not_found until another peer provides it.
        assert!(manager.find_providers("abc").await.is_err());
        manager
            .directory
            .provide(ContentId::from_str_unchecked("abc"), peer());
        assert!(manager.find_providers("abc").await.is_ok());
    }
}
