//! WebSocket-backed transport.
//!
//! No repo in this workspace's lineage carries a websocket dependency, but
//! overlay nodes that sit behind strict corporate firewalls often can only
//! reach the outside world over port 443 HTTP(S) upgrades. `tokio-tungstenite`
//! is the standard tokio-ecosystem crate for that, so it fills the same role
//! here that `udp_overlay`/`tcp_stream` fill for their transports: frame
//! bytes in, frame bytes out, multiplexed by peer address the same way
//! [`crate::tcp_stream::TcpStreamTransport`] does.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::transport::{Transport, TransportError, TransportResult, TransportStats};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = futures_util::stream::SplitSink<WsStream, Message>;

/// WebSocket-backed [`Transport`]: each peer gets one upgraded connection,
/// carrying binary frames exactly as sent (no extra length prefix needed,
/// the WebSocket framing already delimits messages).
pub struct WebSocketTransport {
    local_addr: SocketAddr,
    writers: Mutex<HashMap<SocketAddr, WsSink>>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>>,
    inbound_tx: mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>,
    closed: AtomicBool,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    send_errors: AtomicU64,
    recv_errors: AtomicU64,
}

impl WebSocketTransport {
    /// Bind a listener at `addr` and accept inbound WebSocket upgrades.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BindFailed`] if the listener cannot bind.
    pub async fn bind(addr: SocketAddr) -> TransportResult<Arc<Self>> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        let local_addr = listener.local_addr().map_err(TransportError::Io)?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let transport = Arc::new(Self {
            local_addr,
            writers: Mutex::new(HashMap::new()),
            inbound_rx: Mutex::new(inbound_rx),
            inbound_tx,
            closed: AtomicBool::new(false),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            recv_errors: AtomicU64::new(0),
        });

        let accept_transport = Arc::clone(&transport);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer_addr)) => match tokio_tungstenite::accept_async(
                        MaybeTlsStream::Plain(stream),
                    )
                    .await
                    {
                        Ok(ws) => {
                            let (sink, stream) = ws.split();
                            accept_transport.writers.lock().await.insert(peer_addr, sink);
                            accept_transport.spawn_reader(stream, peer_addr);
                        }
                        Err(err) => tracing::debug!(%err, "websocket upgrade failed"),
                    },
                    Err(err) => {
                        tracing::debug!(%err, "websocket accept failed");
                        break;
                    }
                }
            }
        });

        Ok(transport)
    }

    fn spawn_reader(
        self: &Arc<Self>,
        mut stream: futures_util::stream::SplitStream<WsStream>,
        peer_addr: SocketAddr,
    ) {
        let transport = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Binary(frame)) => {
                        transport.bytes_received.fetch_add(frame.len() as u64, Ordering::Relaxed);
                        transport.packets_received.fetch_add(1, Ordering::Relaxed);
                        if transport.inbound_tx.send((frame, peer_addr)).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(_) => {
                        transport.recv_errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                }
            }
            transport.writers.lock().await.remove(&peer_addr);
        });
    }

    async fn connection_for(self: &Arc<Self>, addr: SocketAddr) -> std::io::Result<()> {
        if self.writers.lock().await.contains_key(&addr) {
            return Ok(());
        }
        let url = format!("ws://{addr}/");
        let (ws, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::ConnectionRefused, e.to_string()))?;
        let (sink, stream) = ws.split();
        self.writers.lock().await.insert(addr, sink);
        self.spawn_reader(stream, addr);
        Ok(())
    }
}

#[async_trait]
impl Transport for Arc<WebSocketTransport> {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }
        if let Err(err) = self.connection_for(addr).await {
            self.send_errors.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::ConnectionFailed(err.to_string()));
        }
        let mut writers = self.writers.lock().await;
        let Some(sink) = writers.get_mut(&addr) else {
            self.send_errors.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::ConnectionFailed("connection vanished".into()));
        };
        match sink.send(Message::Binary(buf.to_vec())).await {
            Ok(()) => {
                self.bytes_sent.fetch_add(buf.len() as u64, Ordering::Relaxed);
                self.packets_sent.fetch_add(1, Ordering::Relaxed);
                Ok(buf.len())
            }
            Err(err) => {
                writers.remove(&addr);
                self.send_errors.fetch_add(1, Ordering::Relaxed);
                Err(TransportError::Other(err.to_string()))
            }
        }
    }

    async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }
        let mut rx = self.inbound_rx.lock().await;
        match rx.recv().await {
            Some((frame, addr)) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok((len, addr))
            }
            None => Err(TransportError::Closed),
        }
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.local_addr)
    }

    async fn close(&self) -> TransportResult<()> {
        self.closed.store(true, Ordering::Relaxed);
        self.writers.lock().await.clear();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    fn stats(&self) -> TransportStats {
        TransportStats {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
        }
    }
}
