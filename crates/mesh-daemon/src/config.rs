// crates/mesh-daemon/src/config.rs
//
// Runtime configuration for the Mesh calculator daemon.
// Loaded from a TOML file or populated with sensible defaults.

use std::fs;

use mesh_p2p::{DiscoveryConfig, P2pConfig, TransportConfig};
use mesh_subnet::ClientConfig;
use serde::Deserialize;

/// Which side of the calculator protocol this node plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Evaluate expressions for peers.
    Server,
    /// Send expressions to a server and report the answers.
    Client,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Server => write!(f, "server"),
            Mode::Client => write!(f, "client"),
        }
    }
}

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// "server" or "client".
    #[serde(default = "default_mode")]
    pub mode: Mode,

    /// Subnet partition tag; also scopes the DHT provider key.
    #[serde(default = "default_subnet_id")]
    pub subnet_id: u64,

    /// Multiaddr to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Also listen on QUIC (same port, UDP).
    #[serde(default)]
    pub enable_quic: bool,

    /// Discover peers on the local network via mDNS.
    #[serde(default = "default_enable_mdns")]
    pub enable_mdns: bool,

    /// Full multiaddrs (ending in /p2p/<peer id>) to bootstrap from.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,

    /// Hex-encoded ed25519 secret. An ephemeral key is used if missing.
    #[serde(default = "default_identity_path")]
    pub identity_path: String,

    /// Sign outbound and verify inbound calls.
    #[serde(default)]
    pub authorize: bool,

    /// How long startup may take before the daemon gives up.
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,

    /// Client mode: how long to let discovery run before looking up servers.
    #[serde(default = "default_discovery_wait_secs")]
    pub discovery_wait_secs: u64,

    /// Transport timeout for one request/response exchange.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Retry policy for calls to other nodes.
    #[serde(default)]
    pub client: ClientConfig,
}

fn default_mode() -> Mode {
    Mode::Server
}

fn default_subnet_id() -> u64 {
    1
}

fn default_listen_addr() -> String {
    "/ip4/0.0.0.0/tcp/31330".to_string()
}

fn default_enable_mdns() -> bool {
    true
}

fn default_identity_path() -> String {
    "~/.mesh/identity.key".to_string()
}

fn default_ready_timeout_secs() -> u64 {
    30
}

fn default_discovery_wait_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            subnet_id: default_subnet_id(),
            listen_addr: default_listen_addr(),
            enable_quic: false,
            enable_mdns: default_enable_mdns(),
            bootstrap_peers: Vec::new(),
            identity_path: default_identity_path(),
            authorize: false,
            ready_timeout_secs: default_ready_timeout_secs(),
            discovery_wait_secs: default_discovery_wait_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            log_level: default_log_level(),
            client: ClientConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: DaemonConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Overlay settings derived from this configuration.
    pub fn p2p_config(&self) -> P2pConfig {
        P2pConfig {
            transport: TransportConfig {
                listen_addr: self.listen_addr.clone(),
                enable_quic: self.enable_quic,
                enable_mdns: self.enable_mdns,
                request_timeout_secs: self.request_timeout_secs,
            },
            discovery: DiscoveryConfig {
                bootstrap_peers: self.bootstrap_peers.clone(),
            },
        }
    }
}

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn empty_file_gives_defaults() {
        let config = DaemonConfig::parse("").unwrap();
        assert_eq!(config.mode, Mode::Server);
        assert_eq!(config.subnet_id, 1);
        assert_eq!(config.listen_addr, "/ip4/0.0.0.0/tcp/31330");
        assert!(!config.enable_quic);
        assert!(config.enable_mdns);
        assert!(config.bootstrap_peers.is_empty());
        assert_eq!(config.identity_path, "~/.mesh/identity.key");
        assert!(!config.authorize);
        assert_eq!(config.ready_timeout_secs, 30);
        assert_eq!(config.discovery_wait_secs, 5);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.client.max_attempts, 1);
    }

    #[test]
    fn file_values_override_defaults() {
        let config = DaemonConfig::parse(
            r#"
            mode = "client"
            subnet_id = 9
            authorize = true
            bootstrap_peers = ["/ip4/10.0.0.2/tcp/31330/p2p/12D3KooWExample"]

            [client]
            max_attempts = 3
            retry_backoff = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, Mode::Client);
        assert_eq!(config.subnet_id, 9);
        assert!(config.authorize);
        assert_eq!(config.client.max_attempts, 3);
        assert_eq!(config.client.retry_backoff, Duration::from_millis(250));

        let p2p = config.p2p_config();
        assert_eq!(p2p.discovery.bootstrap_peers.len(), 1);
        assert_eq!(p2p.transport.request_timeout_secs, 30);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(DaemonConfig::parse(r#"mode = "hybrid""#).is_err());
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths_alone() {
        assert_eq!(expand_tilde("/etc/mesh.key"), "/etc/mesh.key");
        if dirs::home_dir().is_some() {
            assert!(!expand_tilde("~/x.key").starts_with('~'));
        }
    }
}
