// crates/mesh-p2p/src/axon.rs
//
// Axon: inbound side of the overlay. Maps method names to handler inboxes
// and turns inbound frames into responses.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use mesh_core::{MeshError, PeerInfo, RpcRequest, RpcResponse};
use tracing::{debug, warn};

use crate::overlay::{deliver, HandlerInbox};

/// Routing table for inbound requests.
///
/// Cheap to clone; all clones share the same table. Servicers register their
/// methods through the overlay, and the event loop consults the table for
/// every inbound request.
#[derive(Clone, Default)]
pub struct Axon {
    handlers: Arc<RwLock<HashMap<String, HandlerInbox>>>,
}

impl std::fmt::Debug for Axon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Axon")
            .field("methods", &self.methods())
            .finish()
    }
}

impl Axon {
    /// Create an Axon with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the inbox serving `method`.
    pub fn add(&self, method: &str, inbox: HandlerInbox) -> Result<(), MeshError> {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        if handlers.contains_key(method) {
            return Err(MeshError::InvalidState(format!(
                "Handler for '{}' is already registered",
                method
            )));
        }
        handlers.insert(method.to_string(), inbox);
        debug!("Axon now serving '{}'", method);
        Ok(())
    }

    /// Stop serving `method`.
    pub fn remove(&self, method: &str) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        if handlers.remove(method).is_some() {
            debug!("Axon stopped serving '{}'", method);
        }
    }

    /// The inbox serving `method`, if any.
    pub fn inbox_for(&self, method: &str) -> Option<HandlerInbox> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(method).cloned()
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        let mut methods: Vec<String> = handlers.keys().cloned().collect();
        methods.sort();
        methods
    }

    /// Route a decoded request and return its response.
    ///
    /// Never fails: routing and delivery errors become failed responses so
    /// the remote caller always gets an answer.
    pub async fn dispatch(&self, remote: PeerInfo, request: RpcRequest) -> RpcResponse {
        let Some(inbox) = self.inbox_for(&request.method) else {
            return RpcResponse::failure(format!("Unknown method: {}", request.method));
        };
        match deliver(&inbox, remote, request).await {
            Ok(response) => response,
            Err(e) => RpcResponse::failure(e.to_string()),
        }
    }

    /// Handle one inbound wire frame and produce the response frame.
    pub async fn handle_frame(&self, remote: PeerInfo, frame: &[u8]) -> Vec<u8> {
        let response = match RpcRequest::from_bytes(frame) {
            Ok(request) => self.dispatch(remote, request).await,
            Err(e) => {
                warn!("Dropping malformed request from {}: {}", remote, e);
                RpcResponse::failure(format!("Invalid RPC request: {}", e))
            }
        };
        // An RpcResponse holds only JSON values and strings; encoding cannot fail.
        response.to_bytes().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::InboundCall;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn frame_for_registered_method_is_answered() {
        let axon = Axon::new();
        let (tx, mut rx) = mpsc::channel::<InboundCall>(4);
        axon.add("double", tx).unwrap();
        tokio::spawn(async move {
            while let Some(call) = rx.recv().await {
                let n = call.request.params.as_i64().unwrap_or(0);
                let _ = call.reply.send(RpcResponse::ok(json!(n * 2)));
            }
        });

        let frame = RpcRequest::new("double", json!(21)).to_bytes().unwrap();
        let out = axon.handle_frame(PeerInfo::new("remote"), &frame).await;
        let resp = RpcResponse::from_bytes(&out).unwrap();
        assert_eq!(resp.result, Some(json!(42)));
    }

    #[tokio::test]
    async fn malformed_frame_gets_failed_response() {
        let axon = Axon::new();
        let out = axon.handle_frame(PeerInfo::new("remote"), b"garbage").await;
        let resp = RpcResponse::from_bytes(&out).unwrap();
        assert!(!resp.success);
        assert!(resp.error.unwrap().starts_with("Invalid RPC request"));
    }

    #[tokio::test]
    async fn removed_method_is_unknown() {
        let axon = Axon::new();
        let (tx, _rx) = mpsc::channel::<InboundCall>(1);
        axon.add("m", tx).unwrap();
        assert_eq!(axon.methods(), vec!["m".to_string()]);
        axon.remove("m");

        let resp = axon
            .dispatch(PeerInfo::new("r"), RpcRequest::new("m", json!(null)))
            .await;
        assert_eq!(resp.error.as_deref(), Some("Unknown method: m"));
    }
}
