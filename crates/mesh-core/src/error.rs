// crates/mesh-core/src/error.rs

use thiserror::Error;

/// Workspace-wide error type for the Mesh calculator subnet.
///
/// Every variant carries a plain message so the error can be cloned and
/// handed to several readers (a captured startup failure is read by every
/// waiter on the readiness signal).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MeshError {
    /// Overlay or transport failure (unreachable peer, dial/handshake error,
    /// closed connection, transport-enforced timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// Worker setup failed before the servicer became ready.
    #[error("Startup error: {0}")]
    Startup(String),

    /// A bounded wait elapsed.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Request or response failed authorization checks.
    #[error("Authorization error: {0}")]
    Auth(String),

    /// Cryptographic error (key parsing, signing, verification).
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid state transition or API misuse.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource not found (unknown method, unknown peer).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote side answered with a failed RPC envelope.
    #[error("Remote error: {0}")]
    Remote(String),
}

impl MeshError {
    /// The message carried by the variant, without the category prefix.
    pub fn detail(&self) -> &str {
        match self {
            MeshError::Network(m)
            | MeshError::Startup(m)
            | MeshError::Timeout(m)
            | MeshError::Auth(m)
            | MeshError::Crypto(m)
            | MeshError::Serialization(m)
            | MeshError::InvalidState(m)
            | MeshError::NotFound(m)
            | MeshError::Remote(m) => m,
        }
    }
}

impl From<serde_json::Error> for MeshError {
    fn from(e: serde_json::Error) -> Self {
        MeshError::Serialization(e.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for MeshError {
    fn from(e: ed25519_dalek::SignatureError) -> Self {
        MeshError::Crypto(e.to_string())
    }
}

impl From<hex::FromHexError> for MeshError {
    fn from(e: hex::FromHexError) -> Self {
        MeshError::Crypto(format!("Invalid hex: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category() {
        let err = MeshError::Network("peer unreachable".to_string());
        assert_eq!(err.to_string(), "Network error: peer unreachable");
        assert_eq!(err.detail(), "peer unreachable");
    }

    #[test]
    fn serde_errors_convert_to_serialization() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: MeshError = parse.unwrap_err().into();
        assert!(matches!(err, MeshError::Serialization(_)));
    }
}
