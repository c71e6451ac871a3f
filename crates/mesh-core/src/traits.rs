// crates/mesh-core/src/traits.rs

use async_trait::async_trait;

use crate::error::MeshError;
use crate::rpc::{RpcRequest, RpcResponse};

/// Pluggable signer/verifier for RPC envelopes.
///
/// Implemented by mesh-rpc (`Ed25519Authorizer`). A client signs outbound
/// requests and validates responses; a servicer validates inbound requests
/// and signs responses.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Attach an auth block to an outbound request. `service_public_key`
    /// pins the key the responder is expected to sign with.
    async fn sign_request(
        &self,
        request: &mut RpcRequest,
        service_public_key: Option<&[u8; 32]>,
    ) -> Result<(), MeshError>;

    /// Check an inbound request. `Err` carries the rejection reason.
    async fn validate_request(&self, request: &RpcRequest) -> Result<(), MeshError>;

    /// Attach an auth block to the response for `request`.
    async fn sign_response(
        &self,
        response: &mut RpcResponse,
        request: &RpcRequest,
    ) -> Result<(), MeshError>;

    /// Check a response against the request it answers.
    async fn validate_response(
        &self,
        response: &RpcResponse,
        request: &RpcRequest,
    ) -> Result<(), MeshError>;
}
