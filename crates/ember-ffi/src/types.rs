//! JSON-serializable shapes returned across the FFI boundary.
//!
//! Every "telemetry" symbol in spec §6 returns a heap C string holding one
//! of these, serialized with `serde_json`. Host applications parse the
//! string on their side of the boundary; this crate never interprets it
//! again once built.

use serde::Serialize;

use ember_contact::ContactStatus;
use ember_core::node::controller::PeerAddressInfo;
use ember_crypto::identity::PeerId;

/// Returned by `generate_new_key_pair`.
#[derive(Debug, Serialize)]
pub struct KeyPairResponse {
    /// Base64-encoded 32-byte Ed25519 seed.
    pub private_key: String,
    /// The derived Peer ID, base32 text form.
    pub peer_id: String,
    /// Always `"Ed25519"`; kept as a field so a future suite is a
    /// non-breaking addition.
    pub key_type: String,
    /// Length of the raw private key in bytes.
    pub key_length: usize,
}

/// Returned by `get_my_profile`.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    /// Display nickname.
    pub nickname: String,
    /// Trailing characters of the canonical Peer ID.
    pub discriminator: String,
    /// `nickname#discriminator`.
    pub full_address: String,
}

/// One entry of `get_connected_peers`.
#[derive(Debug, Serialize)]
pub struct PeerSummary {
    /// The peer's canonical Peer ID, base32 text form.
    pub peer_id: String,
    /// Display nickname, if a profile has been disclosed.
    pub nickname: Option<String>,
    /// Current reachability/approval status.
    pub status: String,
    /// Whether this peer is in the protected set.
    pub protected: bool,
}

/// Returned by `get_connection_status`.
#[derive(Debug, Serialize)]
pub struct ConnectionStatusResponse {
    /// Whether the node has been started.
    pub running: bool,
    /// This node's Peer ID, if running.
    pub peer_id: Option<String>,
    /// Number of peers currently routed.
    pub connected_peer_count: usize,
}

/// Returned by `get_network_stats`.
#[derive(Debug, Serialize)]
pub struct NetworkStatsResponse {
    /// Number of currently open controller streams.
    pub open_stream_count: usize,
    /// Number of peers currently routed.
    pub connected_peer_count: usize,
    /// Number of peers with a recorded contact entry.
    pub known_contact_count: usize,
}

/// Returned by `get_connection_quality`.
#[derive(Debug, Serialize)]
pub struct ConnectionQualityResponse {
    /// The peer being reported on.
    pub peer_id: String,
    /// Whether a route currently exists for this peer.
    pub reachable: bool,
    /// Consecutive reconnect attempts recorded for this peer.
    pub reconnect_attempts: u32,
}

/// Returned by `find_peer`.
#[derive(Debug, Serialize)]
pub struct PeerAddressResponse {
    /// The resolved peer.
    pub peer_id: String,
    /// Addresses the discovery backend reported for this peer.
    pub addresses: Vec<String>,
}

impl From<PeerAddressInfo> for PeerAddressResponse {
    fn from(info: PeerAddressInfo) -> Self {
        Self {
            peer_id: info.peer_id.to_string(),
            addresses: info.addresses.iter().map(std::net::SocketAddr::to_string).collect(),
        }
    }
}

/// One entry of `get_chat_history`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatHistoryEntry {
    /// `true` if the local node sent this message.
    pub outgoing: bool,
    /// Rendered message body.
    pub body: String,
}

/// Render a [`ContactStatus`] the way the FFI JSON surface names it.
#[must_use]
pub fn status_label(status: ContactStatus) -> &'static str {
    match status {
        ContactStatus::Offline => "offline",
        ContactStatus::Online => "online",
        ContactStatus::Connecting => "connecting",
        ContactStatus::Unknown => "unknown",
        ContactStatus::AwaitingApproval => "awaiting_approval",
    }
}

/// Parse a base32 Peer ID string coming in from a host application.
///
/// # Errors
///
/// Returns [`crate::error::EmberError::invalid_argument`] if `text` is not
/// a valid Peer ID.
pub fn parse_peer_id(text: &str) -> Result<PeerId, crate::error::EmberError> {
    PeerId::from_base32(text)
        .map_err(|_| crate::error::EmberError::invalid_argument(format!("invalid peer id: {text}")))
}
