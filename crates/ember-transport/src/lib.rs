//! # Ember Transport
//!
//! Overlay network transport for the Ember messenger.
//!
//! This crate provides the [`transport::Transport`] trait and a Tokio-based
//! UDP implementation the overlay's reachability ladder dials out over.
//! There is no kernel-bypass path here: the messenger overlay sits on
//! ordinary sockets, not a dedicated wire-speed data plane.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod tcp_stream;
pub mod transport;
pub mod udp_async;
pub mod udp_overlay;
pub mod websocket;

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Receive buffer size in bytes.
    pub recv_buffer_size: usize,
    /// Send buffer size in bytes.
    pub send_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: 2 * 1024 * 1024,
            send_buffer_size: 2 * 1024 * 1024,
        }
    }
}
