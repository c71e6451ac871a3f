// crates/mesh-p2p/src/overlay.rs
//
// The Overlay abstraction consumed by servicers and clients.

use async_trait::async_trait;
use mesh_core::{MeshError, PeerInfo, RpcRequest, RpcResponse};
use tokio::sync::{mpsc, oneshot};

/// An inbound RPC delivered by the overlay to a registered handler.
///
/// The handler answers by sending exactly one [`RpcResponse`] on `reply`.
/// Dropping `reply` without answering surfaces at the caller as a closed
/// connection.
#[derive(Debug)]
pub struct InboundCall {
    /// The peer that issued the call.
    pub remote: PeerInfo,
    /// The decoded request envelope.
    pub request: RpcRequest,
    /// Where to send the answer.
    pub reply: oneshot::Sender<RpcResponse>,
}

/// Sending half of a handler's inbox.
pub type HandlerInbox = mpsc::Sender<InboundCall>;

/// A peer-to-peer overlay: handler registration, request/response calls to
/// remote peers, and provider records for discovery.
///
/// Implementations are shared (`Arc<dyn Overlay>`) between a servicer's
/// worker and any number of clients, so every method takes `&self`.
#[async_trait]
pub trait Overlay: Send + Sync {
    /// Identity of the local node.
    fn local_peer(&self) -> PeerInfo;

    /// Make sure the local node is attached to the overlay. Idempotent.
    async fn join(&self) -> Result<(), MeshError>;

    /// Route inbound calls for `method` into `inbox`.
    ///
    /// Fails if the method already has a handler.
    async fn add_handler(&self, method: &str, inbox: HandlerInbox) -> Result<(), MeshError>;

    /// Stop routing `method`. Removing an unknown method is not an error.
    async fn remove_handler(&self, method: &str) -> Result<(), MeshError>;

    /// Send `request` to `peer` and wait for its response.
    async fn call(&self, peer: &PeerInfo, request: RpcRequest) -> Result<RpcResponse, MeshError>;

    /// Advertise the local node as a provider of `key`.
    async fn provide(&self, key: &str) -> Result<(), MeshError>;

    /// Look up the peers advertising `key`.
    async fn find_providers(&self, key: &str) -> Result<Vec<PeerInfo>, MeshError>;
}

/// Forward an inbound call to a handler inbox and produce the response.
///
/// Shared by every overlay: a full or closed inbox and a dropped reply all
/// become network errors seen by the caller.
pub async fn deliver(
    inbox: &HandlerInbox,
    remote: PeerInfo,
    request: RpcRequest,
) -> Result<RpcResponse, MeshError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    let method = request.method.clone();
    inbox
        .send(InboundCall {
            remote,
            request,
            reply: reply_tx,
        })
        .await
        .map_err(|_| MeshError::Network(format!("Handler for '{}' is no longer running", method)))?;

    reply_rx
        .await
        .map_err(|_| MeshError::Network(format!("Connection closed before '{}' answered", method)))
}
