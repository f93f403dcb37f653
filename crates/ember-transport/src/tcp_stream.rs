//! Length-prefixed TCP stream transport.
//!
//! `AsyncUdpTransport` is connectionless: one socket, any peer. TCP is not,
//! so this transport keeps a map of live connections keyed by peer address,
//! opening one lazily on first send and accepting inbound ones on a
//! listener task. Every connection is framed with a 4-byte big-endian
//! length prefix so `recv_from` can hand callers whole messages instead of
//! arbitrary stream chunks.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};

use crate::transport::{Transport, TransportError, TransportResult, TransportStats};

const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, buf: &[u8]) -> std::io::Result<()> {
    writer.write_u32(buf.len() as u32).await?;
    writer.write_all(buf).await
}

async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let len = reader.read_u32().await?;
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "frame exceeds maximum length",
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// TCP-backed [`Transport`]: connects lazily on send, accepts inbound
/// connections on a background task, and multiplexes every peer's frames
/// into a single `recv_from` queue.
pub struct TcpStreamTransport {
    local_addr: SocketAddr,
    writers: Mutex<HashMap<SocketAddr, OwnedWriteHalf>>,
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

impl TcpStreamTransport {
    /// Bind a listener at `addr` and start accepting inbound connections.
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
                    Ok((stream, peer_addr)) => {
                        let (read_half, write_half) = stream.into_split();
                        accept_transport.writers.lock().await.insert(peer_addr, write_half);
                        accept_transport.spawn_reader(read_half, peer_addr);
                    }
                    Err(err) => {
                        tracing::debug!(%err, "tcp accept failed");
                        break;
                    }
                }
            }
        });

        Ok(transport)
    }

    fn spawn_reader(self: &Arc<Self>, mut read_half: OwnedReadHalf, peer_addr: SocketAddr) {
        let transport = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match read_frame(&mut read_half).await {
                    Ok(frame) => {
                        transport.bytes_received.fetch_add(frame.len() as u64, Ordering::Relaxed);
                        transport.packets_received.fetch_add(1, Ordering::Relaxed);
                        if transport.inbound_tx.send((frame, peer_addr)).is_err() {
                            break;
                        }
                    }
                    Err(_) => {
                        transport.recv_errors.fetch_add(1, Ordering::Relaxed);
                        transport.writers.lock().await.remove(&peer_addr);
                        break;
                    }
                }
            }
        });
    }

    async fn connection_for(self: &Arc<Self>, addr: SocketAddr) -> std::io::Result<()> {
        if self.writers.lock().await.contains_key(&addr) {
            return Ok(());
        }
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        self.writers.lock().await.insert(addr, write_half);
        self.spawn_reader(read_half, addr);
        Ok(())
    }
}

#[async_trait]
impl Transport for Arc<TcpStreamTransport> {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }
        if let Err(err) = self.connection_for(addr).await {
            self.send_errors.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::ConnectionFailed(err.to_string()));
        }
        let mut writers = self.writers.lock().await;
        let Some(writer) = writers.get_mut(&addr) else {
            self.send_errors.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::ConnectionFailed("connection vanished".into()));
        };
        match write_frame(writer, buf).await {
            Ok(()) => {
                self.bytes_sent.fetch_add(buf.len() as u64, Ordering::Relaxed);
                self.packets_sent.fetch_add(1, Ordering::Relaxed);
                Ok(buf.len())
            }
            Err(err) => {
                writers.remove(&addr);
                self.send_errors.fetch_add(1, Ordering::Relaxed);
                Err(TransportError::Io(err))
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
