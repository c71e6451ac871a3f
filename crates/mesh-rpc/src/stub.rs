// crates/mesh-rpc/src/stub.rs
//
// Stub: local proxy for the methods a remote peer serves.

use std::sync::Arc;

use mesh_core::{MeshError, PeerInfo, RpcRequest, RpcResponse};
use mesh_p2p::Overlay;
use tracing::debug;

/// Proxy bound to one remote peer.
///
/// Carries no auth logic of its own; wrap it in an
/// [`crate::AuthRpcWrapper`] with [`crate::Role::Client`] to sign calls.
#[derive(Clone)]
pub struct Stub {
    overlay: Arc<dyn Overlay>,
    peer: PeerInfo,
    service_public_key: Option<[u8; 32]>,
}

impl std::fmt::Debug for Stub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stub").field("peer", &self.peer).finish()
    }
}

impl Stub {
    pub fn new(overlay: Arc<dyn Overlay>, peer: PeerInfo) -> Self {
        Self {
            overlay,
            peer,
            service_public_key: None,
        }
    }

    /// Only accept responses signed with this key.
    pub fn with_service_key(mut self, public_key: [u8; 32]) -> Self {
        self.service_public_key = Some(public_key);
        self
    }

    pub fn peer(&self) -> &PeerInfo {
        &self.peer
    }

    pub fn service_public_key(&self) -> Option<&[u8; 32]> {
        self.service_public_key.as_ref()
    }

    /// Send a request envelope to the bound peer.
    pub async fn send(&self, request: RpcRequest) -> Result<RpcResponse, MeshError> {
        debug!("Calling '{}' on {}", request.method, self.peer);
        self.overlay.call(&self.peer, request).await
    }
}
