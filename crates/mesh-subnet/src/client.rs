// crates/mesh-subnet/src/client.rs
//
// PeerClient: asks a remote calculator node to evaluate an expression.

use std::sync::Arc;
use std::time::Duration;

use mesh_core::{Authorizer, CalculationRequest, CalculationResponse, MeshError, PeerInfo};
use mesh_p2p::Overlay;
use mesh_rpc::{AuthRpcWrapper, Role, Stub};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::servicer::CALCULATE_METHOD;

/// Retry policy for [`PeerClient::call_peer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Total attempts per call, including the first. Values below 1 count as 1.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause between attempts.
    #[serde(default = "default_retry_backoff", with = "duration_ms")]
    pub retry_backoff: Duration,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(500)
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff: default_retry_backoff(),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Text of the failure response for an error that prevented a call.
pub fn network_error_message(err: &MeshError) -> String {
    match err {
        MeshError::Network(cause) => format!("Network error: {}", cause),
        other => format!("Network error: {}", other),
    }
}

/// Calling side of the calculator protocol.
#[derive(Clone)]
pub struct PeerClient {
    overlay: Arc<dyn Overlay>,
    authorizer: Option<Arc<dyn Authorizer>>,
    service_public_key: Option<[u8; 32]>,
    config: ClientConfig,
}

impl std::fmt::Debug for PeerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerClient")
            .field("local", &self.overlay.local_peer())
            .field("authorized", &self.authorizer.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl PeerClient {
    pub fn new(overlay: Arc<dyn Overlay>, authorizer: Option<Arc<dyn Authorizer>>) -> Self {
        Self {
            overlay,
            authorizer,
            service_public_key: None,
            config: ClientConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Only accept responses signed with this key.
    pub fn with_service_key(mut self, public_key: [u8; 32]) -> Self {
        self.service_public_key = Some(public_key);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Ask `peer` to evaluate `expression`.
    ///
    /// Never fails: if the peer cannot be reached or the exchange breaks, the
    /// result is a failed response whose error starts with
    /// `"Network error: "`, stamped with the local peer.
    pub async fn call_peer(&self, peer: &PeerInfo, expression: &str) -> CalculationResponse {
        let local = self.overlay.local_peer();
        let request = CalculationRequest::new(local.clone(), expression);
        info!("Asking peer {} to calculate: {}", peer, expression);

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.try_call(peer, &request).await {
                Ok(response) => {
                    if response.success {
                        info!("Peer response: {} = {}", expression, response.result);
                    } else {
                        error!("Peer error: {}", response.error);
                    }
                    if response.request_id != request.request_id {
                        warn!(
                            "Peer {} answered {} with request id {}",
                            peer, request.request_id, response.request_id
                        );
                    }
                    return response;
                }
                Err(e) if attempt < max_attempts => {
                    warn!(
                        "Attempt {}/{} to reach {} failed: {}",
                        attempt, max_attempts, peer, e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(e) => {
                    error!("Failed to call peer {}: {}", peer, e);
                    return CalculationResponse::failure(
                        local,
                        request.expression,
                        network_error_message(&e),
                        request.request_id,
                    );
                }
            }
        }
    }

    async fn try_call(
        &self,
        peer: &PeerInfo,
        request: &CalculationRequest,
    ) -> Result<CalculationResponse, MeshError> {
        self.overlay.join().await?;

        let mut stub = Stub::new(self.overlay.clone(), peer.clone());
        if let Some(key) = self.service_public_key {
            stub = stub.with_service_key(key);
        }
        AuthRpcWrapper::new(stub, Role::Client, self.authorizer.clone())
            .call_typed(CALCULATE_METHOD, request)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_error_message_keeps_cause() {
        assert_eq!(
            network_error_message(&MeshError::Network("Peer x is unreachable".to_string())),
            "Network error: Peer x is unreachable"
        );
        assert_eq!(
            network_error_message(&MeshError::Auth("Invalid signature".to_string())),
            "Network error: Authorization error: Invalid signature"
        );
    }

    #[test]
    fn client_config_defaults_to_single_attempt() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.max_attempts, 1);

        let config: ClientConfig =
            serde_json::from_str(r#"{"max_attempts": 3, "retry_backoff": 20}"#).unwrap();
        assert_eq!(config.retry_backoff, Duration::from_millis(20));
    }
}
