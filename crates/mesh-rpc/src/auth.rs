// crates/mesh-rpc/src/auth.rs
//
// AuthRpcWrapper: puts an optional Authorizer in front of a servicer
// (verify inbound, sign outbound) or a stub (sign outbound, verify inbound).

use std::sync::Arc;

use mesh_core::{Authorizer, MeshError, RpcRequest, RpcResponse};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::role::Role;
use crate::servicer::{CallContext, Servicer};
use crate::stub::Stub;

/// Authorization wrapper around a servicer or a stub.
///
/// Without an authorizer every call passes straight through. A wrapper only
/// acts in the role it was built for; using a client wrapper to serve, or a
/// servicer wrapper to call, is refused.
pub struct AuthRpcWrapper<T> {
    inner: T,
    role: Role,
    authorizer: Option<Arc<dyn Authorizer>>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for AuthRpcWrapper<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRpcWrapper")
            .field("inner", &self.inner)
            .field("role", &self.role)
            .field("authorized", &self.authorizer.is_some())
            .finish()
    }
}

impl<T> AuthRpcWrapper<T> {
    pub fn new(inner: T, role: Role, authorizer: Option<Arc<dyn Authorizer>>) -> Self {
        Self {
            inner,
            role,
            authorizer,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// True when no authorizer is configured.
    pub fn is_passthrough(&self) -> bool {
        self.authorizer.is_none()
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<S: Servicer> AuthRpcWrapper<S> {
    /// Verify and handle one inbound request, then sign the response.
    ///
    /// Never fails: rejected or failing calls become failed responses so the
    /// worker keeps serving.
    pub async fn handle_request(&mut self, request: RpcRequest, ctx: &CallContext) -> RpcResponse {
        if self.role != Role::Servicer {
            warn!(
                "{} wrapper asked to serve '{}'; refusing",
                self.role, request.method
            );
            return RpcResponse::failure(format!(
                "Authorization failed: wrapper built for {} role cannot serve requests",
                self.role
            ));
        }

        if let Some(authorizer) = &self.authorizer {
            if let Err(e) = authorizer.validate_request(&request).await {
                warn!(
                    "Rejected '{}' from {}: {}",
                    request.method, ctx.remote, e
                );
                let mut response =
                    RpcResponse::failure(format!("Authorization failed: {}", e.detail()));
                self.sign_response(&mut response, &request).await;
                return response;
            }
        }

        let mut response = match self
            .inner
            .handle(&request.method, request.params.clone(), ctx)
            .await
        {
            Ok(value) => RpcResponse::ok(value),
            Err(err) => RpcResponse::failure(err),
        };
        self.sign_response(&mut response, &request).await;
        response
    }

    async fn sign_response(&self, response: &mut RpcResponse, request: &RpcRequest) {
        if let Some(authorizer) = &self.authorizer {
            if let Err(e) = authorizer.sign_response(response, request).await {
                warn!("Failed to sign response to '{}': {}", request.method, e);
            }
        }
    }
}

impl AuthRpcWrapper<Stub> {
    /// Sign and send a call, verify the response, and return its result.
    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, MeshError> {
        if self.role != Role::Client {
            return Err(MeshError::InvalidState(format!(
                "{} wrapper cannot issue calls",
                self.role
            )));
        }

        let mut request = RpcRequest::new(method, params);
        if let Some(authorizer) = &self.authorizer {
            authorizer
                .sign_request(&mut request, self.inner.service_public_key())
                .await?;
        }

        let response = self.inner.send(request.clone()).await?;

        if let Some(authorizer) = &self.authorizer {
            authorizer.validate_response(&response, &request).await?;
            debug!("Verified response to '{}' from {}", method, self.inner.peer());
        }
        response.into_result()
    }

    /// Typed variant of [`AuthRpcWrapper::call`].
    pub async fn call_typed<P, R>(&self, method: &str, params: &P) -> Result<R, MeshError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let value = self.call(method, serde_json::to_value(params)?).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorizer::Ed25519Authorizer;
    use async_trait::async_trait;
    use mesh_core::crypto::Keypair;
    use mesh_core::PeerInfo;
    use mesh_p2p::{InboundCall, MemoryNetwork, Overlay};
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Echo;

    #[async_trait(?Send)]
    impl Servicer for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn methods(&self) -> Vec<String> {
            vec!["echo".to_string()]
        }

        async fn handle(
            &mut self,
            _method: &str,
            params: serde_json::Value,
            _ctx: &CallContext,
        ) -> Result<serde_json::Value, String> {
            Ok(params)
        }
    }

    fn ctx() -> CallContext {
        CallContext {
            remote: PeerInfo::new("client"),
            local: PeerInfo::new("server"),
        }
    }

    fn authorizer() -> Arc<dyn Authorizer> {
        Arc::new(Ed25519Authorizer::new(Keypair::generate()))
    }

    /// Serve `wrapper` on `overlay` from a background task.
    async fn serve(overlay: &dyn Overlay, mut wrapper: AuthRpcWrapper<Echo>) {
        let (tx, mut rx) = mpsc::channel::<InboundCall>(8);
        overlay.add_handler("echo", tx).await.unwrap();
        tokio::task::spawn_local(async move {
            while let Some(call) = rx.recv().await {
                let response = wrapper.handle_request(call.request, &ctx()).await;
                let _ = call.reply.send(response);
            }
        });
    }

    #[tokio::test]
    async fn passthrough_servicer_handles_unsigned_request() {
        let mut wrapper = AuthRpcWrapper::new(Echo, Role::Servicer, None);
        assert!(wrapper.is_passthrough());
        let resp = wrapper
            .handle_request(RpcRequest::new("echo", json!(5)), &ctx())
            .await;
        assert_eq!(resp.result, Some(json!(5)));
        assert!(resp.auth.is_none());
    }

    #[tokio::test]
    async fn unsigned_request_rejected_when_authorizing() {
        let mut wrapper = AuthRpcWrapper::new(Echo, Role::Servicer, Some(authorizer()));
        let resp = wrapper
            .handle_request(RpcRequest::new("echo", json!(5)), &ctx())
            .await;
        assert!(!resp.success);
        assert!(resp.error.unwrap().starts_with("Authorization failed"));
    }

    #[tokio::test]
    async fn client_wrapper_refuses_to_serve() {
        let mut wrapper = AuthRpcWrapper::new(Echo, Role::Client, None);
        let resp = wrapper
            .handle_request(RpcRequest::new("echo", json!(1)), &ctx())
            .await;
        assert!(!resp.success);
    }

    #[tokio::test]
    async fn signed_round_trip_over_memory_overlay() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let network = MemoryNetwork::new();
                let server: Arc<dyn Overlay> = Arc::new(network.node("server"));
                let client: Arc<dyn Overlay> = Arc::new(network.node("client"));
                server.join().await.unwrap();
                client.join().await.unwrap();

                serve(
                    server.as_ref(),
                    AuthRpcWrapper::new(Echo, Role::Servicer, Some(authorizer())),
                )
                .await;

                let stub = Stub::new(client.clone(), PeerInfo::new("server"));
                let signed = AuthRpcWrapper::new(stub.clone(), Role::Client, Some(authorizer()));
                let out: String = signed.call_typed("echo", &"hello").await.unwrap();
                assert_eq!(out, "hello");

                // An unsigned client is turned away by the authorizing servicer.
                let unsigned = AuthRpcWrapper::new(stub, Role::Client, None);
                let err = unsigned.call("echo", json!(1)).await.unwrap_err();
                assert!(matches!(err, MeshError::Remote(ref m) if m.starts_with("Authorization failed")));
            })
            .await;
    }

    #[tokio::test]
    async fn pinned_service_key_mismatch_is_auth_error() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let network = MemoryNetwork::new();
                let server: Arc<dyn Overlay> = Arc::new(network.node("server"));
                let client: Arc<dyn Overlay> = Arc::new(network.node("client"));
                server.join().await.unwrap();
                client.join().await.unwrap();

                serve(
                    server.as_ref(),
                    AuthRpcWrapper::new(Echo, Role::Servicer, Some(authorizer())),
                )
                .await;

                let wrong_key = Keypair::generate().public_key_bytes();
                let stub = Stub::new(client, PeerInfo::new("server")).with_service_key(wrong_key);
                let wrapper = AuthRpcWrapper::new(stub, Role::Client, Some(authorizer()));
                let err = wrapper.call("echo", json!(1)).await.unwrap_err();
                // The server's signed refusal fails the client's key check.
                assert_eq!(
                    err,
                    MeshError::Auth("Response signed by an unexpected key".to_string())
                );
            })
            .await;
    }

    #[tokio::test]
    async fn servicer_wrapper_refuses_to_call() {
        let network = MemoryNetwork::new();
        let overlay: Arc<dyn Overlay> = Arc::new(network.node("a"));
        let stub = Stub::new(overlay, PeerInfo::new("b"));
        let wrapper = AuthRpcWrapper::new(stub, Role::Servicer, None);
        let err = wrapper.call("echo", json!(1)).await.unwrap_err();
        assert!(matches!(err, MeshError::InvalidState(_)));
    }
}
