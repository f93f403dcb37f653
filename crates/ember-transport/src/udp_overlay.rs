//! Adapts [`AsyncUdpTransport`] to the overlay node's [`Dialer`] and
//! [`OverlayTransport`] traits.
//!
//! A single bound UDP socket plays both roles: dialing out (the
//! reachability ladder's direct-dial stage) and carrying the handshake and
//! frame traffic the ladder's result feeds into. UDP has no connection
//! handshake of its own, so [`UdpOverlay::dial`] only confirms the address
//! accepts a send; actual liveness is established by the node's own
//! `PingEnvelope` handshake once [`Node::connect`](ember_core::Node::connect)
//! hands off to `finish_connect`.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use ember_core::{DialOutcome, Dialer, NodeError, OverlayTransport};
use ember_crypto::identity::PeerId;

use crate::transport::Transport;
use crate::udp_async::AsyncUdpTransport;

type NodeResult<T> = Result<T, NodeError>;

/// Maximum datagram size read per `recv_datagram` call.
const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// A bound UDP socket usable as both an outbound [`Dialer`] and the
/// [`OverlayTransport`] the node's receive loop drains.
pub struct UdpOverlay {
    socket: AsyncUdpTransport,
}

impl UdpOverlay {
    /// Bind a fresh UDP socket at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::TransportInit`] if the bind fails.
    pub async fn bind(addr: SocketAddr) -> NodeResult<Self> {
        let socket = AsyncUdpTransport::bind(addr)
            .await
            .map_err(|e| NodeError::TransportInit(e.to_string().into()))?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl Dialer for UdpOverlay {
    async fn dial(&self, addr: SocketAddr, timeout: Duration) -> NodeResult<DialOutcome> {
        match tokio::time::timeout(timeout, self.socket.send_to(&[], addr)).await {
            Ok(Ok(_)) => Ok(DialOutcome { addr }),
            Ok(Err(e)) => Err(NodeError::Transport(e.to_string().into())),
            Err(_) => Err(NodeError::timeout("udp dial probe timed out")),
        }
    }

    async fn hole_punch(&self, _peer_id: &PeerId) -> NodeResult<DialOutcome> {
        Err(NodeError::transport(
            "direct UDP dialer does not perform NAT hole-punching; wire ember-discovery's nat module for that",
        ))
    }

    async fn relay_dial(&self, _peer_id: &PeerId) -> NodeResult<DialOutcome> {
        Err(NodeError::transport(
            "direct UDP dialer does not perform relay dialing; wire ember-discovery's relay module for that",
        ))
    }
}

#[async_trait]
impl OverlayTransport for UdpOverlay {
    async fn send_datagram(&self, dest: SocketAddr, frame: &[u8]) -> NodeResult<()> {
        self.socket
            .send_to(frame, dest)
            .await
            .map(|_| ())
            .map_err(|e| NodeError::Transport(e.to_string().into()))
    }

    async fn recv_datagram(&self) -> NodeResult<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (size, from) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| NodeError::Transport(e.to_string().into()))?;
        buf.truncate(size);
        Ok((buf, from))
    }

    fn local_addr(&self) -> NodeResult<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| NodeError::Transport(e.to_string().into()))
    }
}
