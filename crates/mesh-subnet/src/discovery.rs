// crates/mesh-subnet/src/discovery.rs
//
// Provider records that let clients find calculator nodes of a subnet.

use mesh_core::{MeshError, PeerInfo};
use mesh_p2p::Overlay;
use tracing::info;

/// DHT key under which calculator nodes of `subnet_id` advertise.
pub fn calculator_key(subnet_id: u64) -> String {
    format!("subnet/{}/calculator", subnet_id)
}

/// Advertise the local node as a calculator for `subnet_id`.
pub async fn announce_calculator(overlay: &dyn Overlay, subnet_id: u64) -> Result<(), MeshError> {
    let key = calculator_key(subnet_id);
    overlay.provide(&key).await?;
    info!("Announced calculator for subnet {} as {}", subnet_id, overlay.local_peer());
    Ok(())
}

/// Calculator nodes of `subnet_id`, excluding the local node.
pub async fn find_calculators(
    overlay: &dyn Overlay,
    subnet_id: u64,
) -> Result<Vec<PeerInfo>, MeshError> {
    let local = overlay.local_peer();
    let peers = overlay
        .find_providers(&calculator_key(subnet_id))
        .await?
        .into_iter()
        .filter(|p| p.peer_id != local.peer_id)
        .collect::<Vec<_>>();
    info!("Found {} calculator(s) for subnet {}", peers.len(), subnet_id);
    Ok(peers)
}
