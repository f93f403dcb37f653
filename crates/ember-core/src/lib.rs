//! # Ember Core
//!
//! Overlay node, controller, dispatcher, trust, and session state machine
//! for the Ember peer-to-peer messenger.
//!
//! This crate provides:
//! - **Node**: identity, reachability ladder, and the infrastructure
//!   (routing, circuit breaker, rate limiter, IP reputation, health
//!   monitor) everything else sits on top of
//! - **Controller**: the public operational surface (L3) — unicast,
//!   broadcast, stream lifecycle, and peer/content discovery, funneled
//!   through a single bounded event queue
//! - **Dispatcher**: one-byte type-tag framing (L4) for the `chat/1` wire
//!   protocol
//! - **Trust service**: signature verification, Peer ID derivation, and
//!   per-key verification status (L5)
//! - **Session**: the ephemeral-key handshake and AEAD session state
//!   machine each authenticated context is built on
//!
//! ## Quick Start
//!
//! ```no_run
//! use ember_core::{Node, NodeConfig};
//!
//! let node = Node::new_random(NodeConfig::default());
//! node.start();
//! assert!(node.is_running());
//! node.stop();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Node (identity, reachability)                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                    Controller (L3 operations)                   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │         Dispatcher (L4 framing)  │  Trust service (L5)          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │        Session (ephemeral handshake + AEAD, per peer context)   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod node;
pub mod session;

pub use node::{
    decode_frame, encode_frame, CircuitBreaker, CircuitBreakerConfig, CircuitMetrics,
    CircuitState, Controller, ControllerEvent, DialOutcome, Dialer, DiscoveryHandle,
    DispatchError, HealthAction, HealthConfig, HealthMonitor, HealthStatus, IpReputationConfig,
    IpReputationSystem, MessageType, Node, NodeConfig, NodeError, OverlayTransport,
    PeerAddressInfo, PeerConnection, RateLimitConfig, RateLimitMetrics, RateLimiter,
    ReputationStatus, RoutingStats, RoutingTable, StreamId, TrustService, VerificationStatus,
    PROTOCOL_CHAT, PROTOCOL_FILE,
};
pub use session::{EncryptedMessage, Session, SessionState, PENDING_QUEUE_CAPACITY};
