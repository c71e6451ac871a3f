// crates/mesh-p2p/src/transport.rs
//
// TCP/QUIC transport setup for the Mesh overlay.

use libp2p::identity::Keypair;
use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, Swarm};
use mesh_core::MeshError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::behaviour::MeshBehaviour;

/// Configuration for the P2P transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Multiaddr to listen on (e.g., "/ip4/0.0.0.0/tcp/31330").
    pub listen_addr: String,
    /// Also listen on the QUIC counterpart of `listen_addr` (same port, UDP).
    pub enable_quic: bool,
    /// Enable mDNS local discovery.
    pub enable_mdns: bool,
    /// Transport-enforced timeout for one request/response exchange.
    pub request_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/31330".to_string(),
            enable_quic: false,
            enable_mdns: true,
            request_timeout_secs: 30,
        }
    }
}

/// Set up the libp2p Swarm with the given configuration and keypair.
///
/// The returned Swarm is already listening; it is meant to be moved into the
/// overlay event loop, which owns it from then on.
pub fn setup_transport(
    config: &TransportConfig,
    keypair: Keypair,
) -> Result<Swarm<MeshBehaviour>, MeshError> {
    let behaviour = MeshBehaviour::new(
        &keypair,
        config.enable_mdns,
        Duration::from_secs(config.request_timeout_secs),
    )
    .map_err(|e| MeshError::Network(format!("Failed to create behaviour: {}", e)))?;

    let mut swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            libp2p::tcp::Config::default(),
            libp2p::noise::Config::new,
            libp2p::yamux::Config::default,
        )
        .map_err(|e| MeshError::Network(format!("TCP transport error: {}", e)))?
        .with_quic()
        .with_behaviour(|_key| Ok(behaviour))
        .map_err(|e| MeshError::Network(format!("Behaviour setup error: {}", e)))?
        .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(60)))
        .build();

    let listen_addr: Multiaddr = config.listen_addr.parse().map_err(|e| {
        MeshError::Network(format!("Invalid multiaddr '{}': {}", config.listen_addr, e))
    })?;

    swarm.listen_on(listen_addr.clone()).map_err(|e| {
        MeshError::Network(format!("Failed to listen on {}: {}", config.listen_addr, e))
    })?;
    info!("P2P transport listening on {}", config.listen_addr);

    if config.enable_quic {
        let quic_addr = quic_counterpart(&listen_addr).ok_or_else(|| {
            MeshError::Network(format!("No QUIC counterpart for {}", config.listen_addr))
        })?;
        swarm
            .listen_on(quic_addr.clone())
            .map_err(|e| MeshError::Network(format!("Failed to listen on {}: {}", quic_addr, e)))?;
        info!("P2P transport listening on {}", quic_addr);
    }

    Ok(swarm)
}

/// libp2p identity derived from a 32-byte ed25519 secret, so the overlay
/// peer ID and the RPC signing key belong to the same node key.
pub fn keypair_from_secret(secret: [u8; 32]) -> Result<Keypair, MeshError> {
    Keypair::ed25519_from_bytes(secret)
        .map_err(|e| MeshError::Crypto(format!("Invalid ed25519 secret: {}", e)))
}

/// Map `/…/tcp/<port>` to `/…/udp/<port>/quic-v1`.
pub fn quic_counterpart(tcp_addr: &Multiaddr) -> Option<Multiaddr> {
    let mut out = Multiaddr::empty();
    let mut swapped = false;
    for proto in tcp_addr.iter() {
        match proto {
            Protocol::Tcp(port) => {
                out.push(Protocol::Udp(port));
                out.push(Protocol::QuicV1);
                swapped = true;
            }
            other => out.push(other),
        }
    }
    swapped.then_some(out)
}
