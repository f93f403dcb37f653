//! Node configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Top-level node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Listen address for incoming connections.
    pub listen_addr: SocketAddr,

    /// Transport configuration.
    pub transport: TransportConfig,

    /// Discovery configuration.
    pub discovery: DiscoveryConfig,

    /// File transfer configuration.
    pub transfer: TransferConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            #[cfg(test)]
            listen_addr: "0.0.0.0:0".parse().unwrap(),
            #[cfg(not(test))]
            listen_addr: "0.0.0.0:7420".parse().unwrap(),
            transport: TransportConfig::default(),
            discovery: DiscoveryConfig::default(),
            transfer: TransferConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Transport layer configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Socket buffer size for UDP transports.
    pub udp_buffer_size: usize,

    /// Connection establishment timeout.
    pub connection_timeout: Duration,

    /// Idle timeout before a session is considered stale.
    pub idle_timeout: Duration,

    /// Number of short-dial attempts before escalating to hole-punch/relay.
    pub short_dial_attempts: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            udp_buffer_size: 1024 * 1024,
            connection_timeout: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(180),
            short_dial_attempts: 3,
        }
    }
}

/// Discovery configuration: local broadcast plus DHT rendezvous.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Enable DHT-based rendezvous discovery.
    pub enable_dht: bool,

    /// Bootstrap nodes for DHT.
    pub bootstrap_nodes: Vec<SocketAddr>,

    /// Enable local-network broadcast discovery.
    pub enable_local_broadcast: bool,

    /// UDP port used for local broadcast discovery.
    pub broadcast_port: u16,

    /// Enable NAT traversal (hole-punch).
    pub enable_nat_traversal: bool,

    /// Enable relay fallback when hole-punch fails.
    pub enable_relay: bool,

    /// Relay servers.
    pub relay_servers: Vec<SocketAddr>,

    /// DHT re-announcement interval.
    pub announcement_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enable_dht: true,
            bootstrap_nodes: Vec::new(),
            enable_local_broadcast: true,
            broadcast_port: 7421,
            enable_nat_traversal: true,
            enable_relay: true,
            relay_servers: Vec::new(),
            announcement_interval: Duration::from_secs(300),
        }
    }
}

/// File transfer configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Maximum chunk size in bytes.
    pub chunk_size: usize,

    /// Flow-control window size in bytes.
    pub window_size: usize,

    /// Maximum number of concurrent transfers.
    pub max_concurrent_transfers: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            window_size: 16 * 1024 * 1024,
            max_concurrent_transfers: 10,
        }
    }
}

/// Logging configuration, applied via `tracing-subscriber`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level to emit.
    pub level: LogLevel,

    /// Destination for log output.
    pub output: LogOutput,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            output: LogOutput::Stderr,
        }
    }
}

/// Log levels, mirroring `tracing::Level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    Info,
    /// Warn level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Convert to the `tracing` crate's level type.
    #[must_use]
    pub fn to_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Where log output is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    /// Standard error (the default).
    Stderr,
    /// A file at the given path.
    File(std::path::PathBuf),
}
