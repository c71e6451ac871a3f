// crates/mesh-p2p/src/behaviour.rs
//
// Composed NetworkBehaviour for the Mesh overlay.

use libp2p::identity::Keypair;
use libp2p::kad::store::MemoryStore;
use libp2p::request_response::ProtocolSupport;
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::StreamProtocol;
use libp2p::{identify, kad, mdns, request_response, swarm::NetworkBehaviour};
use std::time::Duration;

/// Protocol name for RPC envelopes exchanged between servicers and stubs.
pub const RPC_PROTOCOL: &str = "/mesh/rpc/1.0.0";

/// Protocol name advertised through identify.
pub const IDENTIFY_PROTOCOL: &str = "/mesh/id/1.0.0";

/// The composed network behaviour for the Mesh overlay.
#[derive(NetworkBehaviour)]
pub struct MeshBehaviour {
    /// Request-response carrying JSON-encoded RPC envelopes as byte frames.
    pub request_response: request_response::cbor::Behaviour<Vec<u8>, Vec<u8>>,
    /// Kademlia DHT for peer discovery and provider records.
    pub kademlia: kad::Behaviour<MemoryStore>,
    /// mDNS for local network peer discovery (disabled unless configured).
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    /// Identify protocol for exchanging listen addresses.
    pub identify: identify::Behaviour,
}

impl MeshBehaviour {
    /// Create a new MeshBehaviour with the given keypair.
    pub fn new(
        keypair: &Keypair,
        enable_mdns: bool,
        request_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let peer_id = keypair.public().to_peer_id();

        let request_response = request_response::cbor::Behaviour::new(
            [(StreamProtocol::new(RPC_PROTOCOL), ProtocolSupport::Full)],
            request_response::Config::default().with_request_timeout(request_timeout),
        );

        let store = MemoryStore::new(peer_id);
        let mut kademlia = kad::Behaviour::new(peer_id, store);
        // Answer DHT queries even before an external address is confirmed.
        kademlia.set_mode(Some(kad::Mode::Server));

        let mdns = if enable_mdns {
            Some(mdns::tokio::Behaviour::new(mdns::Config::default(), peer_id)?)
        } else {
            None
        };

        let identify = identify::Behaviour::new(identify::Config::new(
            IDENTIFY_PROTOCOL.to_string(),
            keypair.public(),
        ));

        Ok(Self {
            request_response,
            kademlia,
            mdns: Toggle::from(mdns),
            identify,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_behaviour_succeeds() {
        let keypair = Keypair::generate_ed25519();
        let behaviour = MeshBehaviour::new(&keypair, false, Duration::from_secs(10));
        assert!(behaviour.is_ok());
    }

    #[tokio::test]
    async fn create_behaviour_with_mdns() {
        let keypair = Keypair::generate_ed25519();
        let behaviour = MeshBehaviour::new(&keypair, true, Duration::from_secs(10)).unwrap();
        assert!(behaviour.mdns.is_enabled());
    }
}
