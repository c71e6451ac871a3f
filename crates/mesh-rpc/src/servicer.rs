// crates/mesh-rpc/src/servicer.rs
//
// The Servicer trait: a value whose methods are exposed on the overlay.
//
// Servicers run inside a managed worker's single-threaded loop, so their
// futures need not be Send and handlers may take `&mut self`.

use async_trait::async_trait;
use mesh_core::{MeshError, PeerInfo};

/// Per-call information handed to a servicer.
#[derive(Debug, Clone, PartialEq)]
pub struct CallContext {
    /// Peer that issued the call.
    pub remote: PeerInfo,
    /// The local node answering it.
    pub local: PeerInfo,
}

/// A set of remotely-invokable methods.
#[async_trait(?Send)]
pub trait Servicer: 'static {
    /// Short name used in logs and the worker thread name.
    fn name(&self) -> &str;

    /// Method names to register on the overlay.
    fn methods(&self) -> Vec<String>;

    /// One-time setup on the worker thread, before handlers are registered.
    /// A failure aborts startup.
    async fn setup(&mut self, _local: &PeerInfo) -> Result<(), MeshError> {
        Ok(())
    }

    /// Handle one call. `Err` becomes a failed RPC response.
    async fn handle(
        &mut self,
        method: &str,
        params: serde_json::Value,
        ctx: &CallContext,
    ) -> Result<serde_json::Value, String>;
}

/// Generic dispatch helper: deserialize params into a request type,
/// call the handler, and serialize the result to JSON.
pub async fn dispatch_handler<Req, Resp, F, Fut>(
    params: serde_json::Value,
    handler: F,
) -> Result<serde_json::Value, String>
where
    Req: serde::de::DeserializeOwned,
    Resp: serde::Serialize,
    F: FnOnce(Req) -> Fut,
    Fut: std::future::Future<Output = Result<Resp, String>>,
{
    let request: Req = serde_json::from_value(params)
        .map_err(|e| format!("Failed to deserialize request: {}", e))?;
    let response = handler(request).await?;
    serde_json::to_value(response).map_err(|e| format!("Failed to serialize response: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn dispatch_handler_round_trips_typed_values() {
        let out = dispatch_handler(json!([2, 3]), |(a, b): (i64, i64)| async move {
            Ok::<_, String>(a * b)
        })
        .await
        .unwrap();
        assert_eq!(out, json!(6));
    }

    #[tokio::test]
    async fn dispatch_handler_reports_bad_params() {
        let err = dispatch_handler(json!("nope"), |n: i64| async move { Ok::<_, String>(n) })
            .await
            .unwrap_err();
        assert!(err.starts_with("Failed to deserialize request"));
    }
}
