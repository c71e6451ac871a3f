// crates/mesh-core/src/rpc.rs
//
// JSON-RPC-style envelopes carried inside overlay frames.
//
// A request names a method and carries JSON params; a response carries a
// success flag plus either a result or an error. Both may carry an AuthInfo
// block filled in by an Authorizer.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::MeshError;

/// Signature block attached to a request or response by an [`crate::Authorizer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    /// Hex-encoded ed25519 public key of the signer.
    pub public_key: String,
    /// Hex-encoded random nonce. Responses reuse the request's nonce.
    pub nonce: String,
    /// Signer's wall clock in milliseconds.
    pub timestamp_ms: i64,
    /// Hex-encoded ed25519 signature over the envelope digest.
    pub signature: String,
    /// Public key the client expects the service to sign with, if pinned.
    #[serde(default)]
    pub service_public_key: Option<String>,
}

/// An RPC request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Method to invoke (e.g., "calculator/calculate").
    pub method: String,
    /// JSON-encoded parameters for the method.
    pub params: serde_json::Value,
    /// Authorization block, absent when no authorizer is configured.
    #[serde(default)]
    pub auth: Option<AuthInfo>,
}

impl RpcRequest {
    /// Create an unsigned request.
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            method: method.into(),
            params,
            auth: None,
        }
    }

    /// Digest covered by the request signature.
    ///
    /// SHA-256(method || 0x00 || params_json || 0x00 || nonce || timestamp_ms_le).
    pub fn signable_digest(&self, nonce: &str, timestamp_ms: i64) -> Result<[u8; 32], MeshError> {
        let params = serde_json::to_vec(&self.params)?;
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_bytes());
        hasher.update([0u8]);
        hasher.update(&params);
        hasher.update([0u8]);
        hasher.update(nonce.as_bytes());
        hasher.update(timestamp_ms.to_le_bytes());
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Ok(digest)
    }

    /// Encode for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MeshError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MeshError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// An RPC response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Whether the call succeeded at the RPC level.
    pub success: bool,
    /// The result data (if success).
    pub result: Option<serde_json::Value>,
    /// Error message (if not success).
    pub error: Option<String>,
    /// Authorization block, absent when no authorizer is configured.
    #[serde(default)]
    pub auth: Option<AuthInfo>,
}

impl RpcResponse {
    /// A successful response carrying `result`.
    pub fn ok(result: serde_json::Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            auth: None,
        }
    }

    /// A failed response carrying `error`.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            auth: None,
        }
    }

    /// Digest covered by the response signature, bound to the request nonce.
    pub fn signable_digest(&self, request_nonce: &str, timestamp_ms: i64) -> Result<[u8; 32], MeshError> {
        let result = serde_json::to_vec(&self.result)?;
        let mut hasher = Sha256::new();
        hasher.update([self.success as u8]);
        hasher.update(&result);
        hasher.update([0u8]);
        hasher.update(self.error.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8]);
        hasher.update(request_nonce.as_bytes());
        hasher.update(timestamp_ms.to_le_bytes());
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Ok(digest)
    }

    /// Turn the envelope into the method result, or the remote error.
    pub fn into_result(self) -> Result<serde_json::Value, MeshError> {
        if self.success {
            self.result
                .ok_or_else(|| MeshError::Serialization("Successful response has no result".to_string()))
        } else {
            Err(MeshError::Remote(
                self.error.unwrap_or_else(|| "unknown remote error".to_string()),
            ))
        }
    }

    /// Encode for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MeshError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MeshError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_digest_depends_on_params_and_nonce() {
        let req = RpcRequest::new("calculator/calculate", json!({"expression": "1+1"}));
        let a = req.signable_digest("aa", 1).unwrap();
        let b = req.signable_digest("bb", 1).unwrap();
        assert_ne!(a, b);

        let other = RpcRequest::new("calculator/calculate", json!({"expression": "1+2"}));
        assert_ne!(a, other.signable_digest("aa", 1).unwrap());
    }

    #[test]
    fn failed_response_into_result_is_remote_error() {
        let err = RpcResponse::failure("Unknown method: x").into_result().unwrap_err();
        assert_eq!(err, MeshError::Remote("Unknown method: x".to_string()));
    }

    #[test]
    fn request_decodes_without_auth_field() {
        let req = RpcRequest::from_bytes(br#"{"method":"m","params":null}"#).unwrap();
        assert!(req.auth.is_none());
    }
}
