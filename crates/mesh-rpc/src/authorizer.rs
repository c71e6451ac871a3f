// crates/mesh-rpc/src/authorizer.rs
//
// Ed25519Authorizer: signs envelopes with the node's ed25519 key and checks
// signatures, clock skew, nonce reuse and the pinned service key.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use mesh_core::crypto::{public_key_from_hex, random_nonce, verify_signature, Keypair};
use mesh_core::time::now_millis;
use mesh_core::{AuthInfo, Authorizer, MeshError, RpcRequest, RpcResponse};

/// Default tolerated difference between signer and verifier clocks.
pub const DEFAULT_MAX_CLOCK_SKEW_MS: i64 = 60_000;

/// [`Authorizer`] backed by an ed25519 keypair.
pub struct Ed25519Authorizer {
    keypair: Keypair,
    max_clock_skew_ms: i64,
    /// "<public key>:<nonce>" -> timestamp of requests already accepted.
    seen_nonces: Mutex<HashMap<String, i64>>,
}

impl std::fmt::Debug for Ed25519Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Authorizer")
            .field("public_key", &self.keypair.public_key_hex())
            .field("max_clock_skew_ms", &self.max_clock_skew_ms)
            .finish()
    }
}

impl Ed25519Authorizer {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair,
            max_clock_skew_ms: DEFAULT_MAX_CLOCK_SKEW_MS,
            seen_nonces: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_clock_skew_ms(mut self, max_clock_skew_ms: i64) -> Self {
        self.max_clock_skew_ms = max_clock_skew_ms;
        self
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.keypair.public_key_bytes()
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> String {
        hex::encode(self.keypair.sign(digest))
    }

    fn check_skew(&self, timestamp_ms: i64) -> Result<(), MeshError> {
        let skew = (now_millis() - timestamp_ms).abs();
        if skew > self.max_clock_skew_ms {
            return Err(MeshError::Auth(format!(
                "Timestamp is {} ms away from local clock (max {})",
                skew, self.max_clock_skew_ms
            )));
        }
        Ok(())
    }

    /// Record a request nonce, failing if it was already accepted. Entries
    /// older than the skew window are pruned; replays beyond it fail the
    /// skew check instead.
    fn remember_nonce(&self, public_key: &str, nonce: &str, timestamp_ms: i64) -> Result<(), MeshError> {
        let mut seen = self.seen_nonces.lock().unwrap_or_else(|e| e.into_inner());
        let horizon = now_millis() - 2 * self.max_clock_skew_ms;
        seen.retain(|_, ts| *ts >= horizon);

        let key = format!("{}:{}", public_key, nonce);
        if seen.contains_key(&key) {
            return Err(MeshError::Auth("Request nonce was already used".to_string()));
        }
        seen.insert(key, timestamp_ms);
        Ok(())
    }
}

fn verify(auth: &AuthInfo, digest: &[u8; 32]) -> Result<(), MeshError> {
    let public_key = public_key_from_hex(&auth.public_key)?;
    let signature = hex::decode(&auth.signature)?;
    if verify_signature(&public_key, digest, &signature)? {
        Ok(())
    } else {
        Err(MeshError::Auth("Invalid signature".to_string()))
    }
}

#[async_trait]
impl Authorizer for Ed25519Authorizer {
    async fn sign_request(
        &self,
        request: &mut RpcRequest,
        service_public_key: Option<&[u8; 32]>,
    ) -> Result<(), MeshError> {
        let nonce = random_nonce();
        let timestamp_ms = now_millis();
        let digest = request.signable_digest(&nonce, timestamp_ms)?;
        request.auth = Some(AuthInfo {
            public_key: self.keypair.public_key_hex(),
            nonce,
            timestamp_ms,
            signature: self.sign_digest(&digest),
            service_public_key: service_public_key.map(hex::encode),
        });
        Ok(())
    }

    async fn validate_request(&self, request: &RpcRequest) -> Result<(), MeshError> {
        let auth = request
            .auth
            .as_ref()
            .ok_or_else(|| MeshError::Auth("Request is not signed".to_string()))?;

        if let Some(expected) = &auth.service_public_key {
            if *expected != self.keypair.public_key_hex() {
                return Err(MeshError::Auth(
                    "Request is addressed to a different service key".to_string(),
                ));
            }
        }

        self.check_skew(auth.timestamp_ms)?;
        verify(auth, &request.signable_digest(&auth.nonce, auth.timestamp_ms)?)?;
        self.remember_nonce(&auth.public_key, &auth.nonce, auth.timestamp_ms)
    }

    async fn sign_response(
        &self,
        response: &mut RpcResponse,
        request: &RpcRequest,
    ) -> Result<(), MeshError> {
        let nonce = request
            .auth
            .as_ref()
            .map(|a| a.nonce.clone())
            .unwrap_or_default();
        let timestamp_ms = now_millis();
        let digest = response.signable_digest(&nonce, timestamp_ms)?;
        response.auth = Some(AuthInfo {
            public_key: self.keypair.public_key_hex(),
            nonce,
            timestamp_ms,
            signature: self.sign_digest(&digest),
            service_public_key: None,
        });
        Ok(())
    }

    async fn validate_response(
        &self,
        response: &RpcResponse,
        request: &RpcRequest,
    ) -> Result<(), MeshError> {
        let auth = response
            .auth
            .as_ref()
            .ok_or_else(|| MeshError::Auth("Response is not signed".to_string()))?;
        let request_auth = request
            .auth
            .as_ref()
            .ok_or_else(|| MeshError::Auth("Request was sent unsigned".to_string()))?;

        if auth.nonce != request_auth.nonce {
            return Err(MeshError::Auth(
                "Response nonce does not match request".to_string(),
            ));
        }
        if let Some(expected) = &request_auth.service_public_key {
            if *expected != auth.public_key {
                return Err(MeshError::Auth(
                    "Response signed by an unexpected key".to_string(),
                ));
            }
        }

        self.check_skew(auth.timestamp_ms)?;
        verify(auth, &response.signable_digest(&auth.nonce, auth.timestamp_ms)?)
    }
}
