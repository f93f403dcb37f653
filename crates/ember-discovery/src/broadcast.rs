//! Local-link discovery: a UDP broadcaster advertising a fixed rendezvous
//! tag on the local network, and a listener that feeds sightings into the
//! shared [`crate::dht::RendezvousDirectory`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ember_crypto::identity::PeerId;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

use crate::dht::RendezvousDirectory;

/// How often the broadcaster announces itself.
pub const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(10);

/// Maximum announcement datagram size.
const MAX_DATAGRAM: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("announcement encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Wire form of a local-link announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Announcement {
    tag: String,
    peer_id: [u8; 20],
    listen_port: u16,
}

/// Runs the local-link broadcaster and listener on a single bound socket.
pub struct LocalLinkFinder {
    socket: Arc<UdpSocket>,
    broadcast_addr: SocketAddr,
    tag: String,
    self_id: PeerId,
    listen_port: u16,
}

impl LocalLinkFinder {
    /// Bind to `bind_addr` (typically `0.0.0.0:<port>` with broadcast
    /// enabled) and prepare to advertise `tag` on behalf of `self_id`.
    pub async fn bind(
        bind_addr: SocketAddr,
        broadcast_port: u16,
        tag: String,
        self_id: PeerId,
        listen_port: u16,
    ) -> Result<Self, BroadcastError> {
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.set_broadcast(true)?;
        Ok(Self {
            socket: Arc::new(socket),
            broadcast_addr: SocketAddr::new(std::net::Ipv4Addr::BROADCAST.into(), broadcast_port),
            tag,
            self_id,
            listen_port,
        })
    }

    /// Run the announce-and-listen loop until `shutdown` resolves. Discovered
    /// peers are recorded in `directory` under `self.tag` and forwarded on
    /// `discovered`; the bare Ok(()) return only happens on clean shutdown.
    pub async fn run(
        self,
        directory: Arc<RendezvousDirectory>,
        discovered: mpsc::UnboundedSender<PeerId>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), BroadcastError> {
        let mut announce_tick = interval(ANNOUNCE_INTERVAL);
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = announce_tick.tick() => {
                    if let Err(err) = self.announce().await {
                        tracing::debug!(?err, "local-link announce failed");
                    }
                }
                recv = self.socket.recv_from(&mut buf) => {
                    let (len, _from) = recv?;
                    self.handle_datagram(&buf[..len], &directory, &discovered);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn announce(&self) -> Result<(), BroadcastError> {
        let msg = Announcement {
            tag: self.tag.clone(),
            peer_id: *self.self_id.as_bytes(),
            listen_port: self.listen_port,
        };
        let bytes = bincode::serialize(&msg)?;
        self.socket.send_to(&bytes, self.broadcast_addr).await?;
        Ok(())
    }

    fn handle_datagram(
        &self,
        bytes: &[u8],
        directory: &RendezvousDirectory,
        discovered: &mpsc::UnboundedSender<PeerId>,
    ) {
        let Ok(msg) = bincode::deserialize::<Announcement>(bytes) else {
            return;
        };
        if msg.tag != self.tag {
            return;
        }
        let peer_id = PeerId::from_bytes(msg.peer_id);
        if peer_id == self.self_id {
            return;
        }
        directory.announce_tag(&self.tag, peer_id);
        let _ = discovered.send(peer_id);
    }
}
