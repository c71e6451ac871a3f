// crates/mesh-p2p/src/discovery.rs
//
// Kademlia bootstrap and multiaddr helpers for the Mesh overlay.

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId, Swarm};
use mesh_core::{MeshError, PeerInfo};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::behaviour::MeshBehaviour;

/// Configuration for peer discovery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Bootstrap peers to connect to on startup
    /// (e.g., "/ip4/127.0.0.1/tcp/31330/p2p/12D3Koo...").
    pub bootstrap_peers: Vec<String>,
}

/// Split a full multiaddr into its peer ID and the dialable prefix.
pub fn split_peer_addr(addr_str: &str) -> Result<(PeerId, Multiaddr), MeshError> {
    let addr: Multiaddr = addr_str
        .parse()
        .map_err(|e| MeshError::Network(format!("Invalid peer addr '{}': {}", addr_str, e)))?;

    let Some(Protocol::P2p(peer_id)) = addr.iter().last() else {
        return Err(MeshError::Network(format!(
            "Peer addr '{}' has no /p2p/ component",
            addr_str
        )));
    };

    let dial_addr = addr
        .iter()
        .filter(|p| !matches!(p, Protocol::P2p(_)))
        .collect::<Multiaddr>();

    Ok((peer_id, dial_addr))
}

/// Build a PeerInfo from a full multiaddr ending in `/p2p/<peer id>`.
pub fn peer_info_from_multiaddr(addr_str: &str) -> Result<PeerInfo, MeshError> {
    let (peer_id, dial_addr) = split_peer_addr(addr_str)?;
    Ok(PeerInfo::new(peer_id.to_base58()).with_addrs(vec![dial_addr.to_string()]))
}

/// Seed Kademlia with the bootstrap peers, dial them, and start a bootstrap
/// query.
///
/// Unparseable bootstrap entries are an error; unreachable ones are only
/// logged, since the swarm keeps retrying through Kademlia.
pub fn start_discovery(
    swarm: &mut Swarm<MeshBehaviour>,
    config: &DiscoveryConfig,
) -> Result<(), MeshError> {
    for peer_addr_str in &config.bootstrap_peers {
        let (peer_id, peer_addr) = split_peer_addr(peer_addr_str)?;

        swarm
            .behaviour_mut()
            .kademlia
            .add_address(&peer_id, peer_addr.clone());

        if let Err(e) = swarm.dial(peer_addr) {
            warn!("Failed to dial bootstrap peer {}: {}", peer_addr_str, e);
        }

        info!("Added bootstrap peer: {}", peer_addr_str);
    }

    if !config.bootstrap_peers.is_empty() {
        if let Err(e) = swarm.behaviour_mut().kademlia.bootstrap() {
            warn!("Kademlia bootstrap not started: {}", e);
        } else {
            info!("Kademlia bootstrap initiated");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{setup_transport, TransportConfig};

    fn local_swarm() -> Swarm<MeshBehaviour> {
        let config = TransportConfig {
            listen_addr: "/ip4/127.0.0.1/tcp/0".to_string(),
            enable_quic: false,
            enable_mdns: false,
            request_timeout_secs: 5,
        };
        let keypair = libp2p::identity::Keypair::generate_ed25519();
        setup_transport(&config, keypair).unwrap()
    }

    #[tokio::test]
    async fn discovery_with_empty_bootstrap() {
        let mut swarm = local_swarm();
        let result = start_discovery(&mut swarm, &DiscoveryConfig::default());
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn discovery_rejects_addr_without_peer_id() {
        let mut swarm = local_swarm();
        let config = DiscoveryConfig {
            bootstrap_peers: vec!["/ip4/127.0.0.1/tcp/31330".to_string()],
        };
        assert!(start_discovery(&mut swarm, &config).is_err());
    }

    #[test]
    fn peer_info_from_full_multiaddr() {
        let peer_id = PeerId::random();
        let addr = format!("/ip4/127.0.0.1/tcp/31330/p2p/{}", peer_id);
        let info = peer_info_from_multiaddr(&addr).unwrap();
        assert_eq!(info.peer_id, peer_id.to_base58());
        assert_eq!(info.addrs, vec!["/ip4/127.0.0.1/tcp/31330".to_string()]);
    }
}
