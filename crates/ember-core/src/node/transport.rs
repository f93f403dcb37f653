//! Overlay transport abstraction: the wire beneath the [`Controller`](crate::node::controller::Controller).
//!
//! `ember-core` never binds a socket itself. Concrete transports (UDP, TCP,
//! WebSocket) live in `ember-transport` and are handed to [`Node`](crate::node::node::Node)
//! and [`Controller`](crate::node::controller::Controller) as `Arc<dyn OverlayTransport>`,
//! mirroring how [`Dialer`](crate::node::node::Dialer) and
//! [`DiscoveryHandle`](crate::node::controller::DiscoveryHandle) keep those
//! concerns out of this crate.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::node::error::Result;

/// Datagram-oriented send/receive surface a [`Node`](crate::node::node::Node)
/// drives its handshake and frame traffic over.
///
/// Implementations are responsible for their own framing below the byte
/// slices passed here; `ember-core` only ever hands it already-encoded
/// [`dispatch`](crate::node::dispatch) frames.
#[async_trait]
pub trait OverlayTransport: Send + Sync {
    /// Send `frame` to `dest`, returning once the transport has accepted it.
    async fn send_datagram(&self, dest: SocketAddr, frame: &[u8]) -> Result<()>;

    /// Receive the next inbound frame and the address it arrived from.
    ///
    /// Implementations should block until a datagram arrives; the receive
    /// loop driving this is expected to run as its own task.
    async fn recv_datagram(&self) -> Result<(Vec<u8>, SocketAddr)>;

    /// The local address this transport is bound to.
    fn local_addr(&self) -> Result<SocketAddr>;
}
