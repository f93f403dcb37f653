//! On-disk configuration for the `ember` CLI.
//!
//! Mirrors the sections of [`ember_core::node::config::NodeConfig`] so the
//! TOML file on disk maps onto the node config the binary builds at
//! startup, plus a CLI-only `identity` section for the private key path.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level CLI configuration, serialized as TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Local identity.
    pub identity: IdentityConfig,
    /// Listen/transport settings.
    pub network: NetworkConfig,
    /// Peer discovery settings.
    pub discovery: DiscoveryConfig,
    /// File transfer settings.
    pub transfer: TransferConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Local identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Path to the base64-encoded Ed25519 seed, if a persistent identity is
    /// wanted. A fresh identity is generated when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<PathBuf>,
    /// Display nickname advertised in this node's profile.
    #[serde(default = "default_nickname")]
    pub nickname: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            private_key_file: None,
            nickname: default_nickname(),
        }
    }
}

/// Network/transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Listen address for incoming connections.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Enable DHT-based rendezvous discovery.
    #[serde(default = "default_true")]
    pub enable_dht: bool,
    /// DHT bootstrap nodes.
    #[serde(default)]
    pub bootstrap_nodes: Vec<String>,
    /// Enable local-network broadcast discovery.
    #[serde(default = "default_true")]
    pub enable_local_broadcast: bool,
    /// Enable NAT traversal (hole-punch).
    #[serde(default = "default_true")]
    pub enable_nat_traversal: bool,
    /// Enable relay fallback when hole-punch fails.
    #[serde(default = "default_true")]
    pub enable_relay: bool,
    /// Relay servers.
    #[serde(default)]
    pub relay_servers: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enable_dht: true,
            bootstrap_nodes: Vec::new(),
            enable_local_broadcast: true,
            enable_nat_traversal: true,
            enable_relay: true,
            relay_servers: Vec::new(),
        }
    }
}

/// File transfer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Maximum chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Maximum number of concurrent transfers.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_transfers: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_concurrent_transfers: default_max_concurrent(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file path; stderr when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_nickname() -> String {
    "anonymous".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:7420".to_string()
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_max_concurrent() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Write configuration to `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    /// The default config path, `$XDG_CONFIG_HOME/ember/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("ember/config.toml")
    }

    /// Load from the default path, writing a fresh default file if none
    /// exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Parse the listen address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn parse_listen_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.network.listen_addr.parse()?)
    }

    /// Validate configuration, rejecting values the node would reject at
    /// startup anyway (but surfacing the error before a key is generated).
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field found.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.parse_listen_addr()?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "invalid log level '{}'; must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        if self.transfer.chunk_size == 0 || self.transfer.chunk_size > 16 * 1024 * 1024 {
            anyhow::bail!("chunk size must be between 1 and 16MB");
        }

        if self.transfer.max_concurrent_transfers == 0 {
            anyhow::bail!("max_concurrent_transfers must be at least 1");
        }

        for node in &self.discovery.bootstrap_nodes {
            self.validate_host_port(node, "bootstrap node")?;
        }
        for server in &self.discovery.relay_servers {
            self.validate_host_port(server, "relay server")?;
        }

        Ok(())
    }

    fn validate_host_port(&self, addr: &str, name: &str) -> anyhow::Result<()> {
        let parts: Vec<&str> = addr.rsplitn(2, ':').collect();
        let [port_str, host] = parts.as_slice() else {
            anyhow::bail!("{name} '{addr}' missing port (expected host:port)");
        };

        let port: u16 = port_str
            .parse()
            .map_err(|_| anyhow::anyhow!("{name} '{addr}' has invalid port: {port_str}"))?;
        if port == 0 {
            anyhow::bail!("{name} '{addr}' has invalid port: 0");
        }
        if host.is_empty() {
            anyhow::bail!("{name} '{addr}' has empty hostname");
        }
        if host.contains("..") || host.contains('/') || host.contains('\\') {
            anyhow::bail!("{name} '{addr}' contains invalid characters");
        }
        Ok(())
    }

    /// Build the [`ember_core::node::config::NodeConfig`] this configuration
    /// describes.
    ///
    /// # Errors
    ///
    /// Returns an error if `network.listen_addr` or an address list entry
    /// does not parse.
    pub fn to_node_config(&self) -> anyhow::Result<ember_core::node::config::NodeConfig> {
        use ember_core::node::config::{DiscoveryConfig as NodeDiscoveryConfig, NodeConfig, TransferConfig as NodeTransferConfig};

        let parse_all = |addrs: &[String]| -> anyhow::Result<Vec<SocketAddr>> {
            addrs.iter().map(|a| a.parse().map_err(anyhow::Error::from)).collect()
        };

        Ok(NodeConfig {
            listen_addr: self.parse_listen_addr()?,
            discovery: NodeDiscoveryConfig {
                enable_dht: self.discovery.enable_dht,
                bootstrap_nodes: parse_all(&self.discovery.bootstrap_nodes)?,
                enable_local_broadcast: self.discovery.enable_local_broadcast,
                enable_nat_traversal: self.discovery.enable_nat_traversal,
                enable_relay: self.discovery.enable_relay,
                relay_servers: parse_all(&self.discovery.relay_servers)?,
                ..NodeDiscoveryConfig::default()
            },
            transfer: NodeTransferConfig {
                chunk_size: self.transfer.chunk_size,
                max_concurrent_transfers: self.transfer.max_concurrent_transfers,
                ..NodeTransferConfig::default()
            },
            ..NodeConfig::default()
        })
    }
}
