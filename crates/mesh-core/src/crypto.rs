// crates/mesh-core/src/crypto.rs

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::MeshError;

/// An ed25519 keypair for signing and verification.
#[derive(Clone)]
pub struct Keypair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish()
    }
}

impl Keypair {
    /// Generate a new random ed25519 keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Keypair {
            signing_key,
            verifying_key,
        }
    }

    /// Rebuild a keypair from its 32-byte secret.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        let verifying_key = signing_key.verifying_key();
        Keypair {
            signing_key,
            verifying_key,
        }
    }

    /// Rebuild a keypair from a hex-encoded 32-byte secret.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, MeshError> {
        let bytes = hex::decode(secret_hex.trim())?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| MeshError::Crypto("Secret key must be exactly 32 bytes".to_string()))?;
        Ok(Self::from_secret_bytes(&secret))
    }

    /// Get the secret key bytes (32 bytes).
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Hex-encoded secret key, the format [`Keypair::from_secret_hex`] reads.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_bytes())
    }

    /// Get the public key bytes (32 bytes).
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Hex-encoded public key.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// Sign a message and return the signature bytes.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature = self.signing_key.sign(message);
        signature.to_bytes().to_vec()
    }
}

/// Decode a hex-encoded 32-byte public key.
pub fn public_key_from_hex(public_key_hex: &str) -> Result<[u8; 32], MeshError> {
    let bytes = hex::decode(public_key_hex)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| MeshError::Crypto("Public key must be exactly 32 bytes".to_string()))
}

/// Verify an ed25519 signature.
///
/// Returns `true` if the signature is valid for the given message and public key.
pub fn verify_signature(
    public_key_bytes: &[u8; 32],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<bool, MeshError> {
    let verifying_key = VerifyingKey::from_bytes(public_key_bytes)
        .map_err(|e| MeshError::Crypto(format!("Invalid public key: {}", e)))?;

    let signature_array: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| MeshError::Crypto("Signature must be exactly 64 bytes".to_string()))?;

    let signature = ed25519_dalek::Signature::from_bytes(&signature_array);

    match verifying_key.verify(message, &signature) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Random 16-byte nonce, hex-encoded.
pub fn random_nonce() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_sign_verify() {
        let keypair = Keypair::generate();
        let message = b"4 * 3";

        let signature = keypair.sign(message);
        let pubkey = keypair.public_key_bytes();

        assert!(verify_signature(&pubkey, message, &signature).unwrap());
        assert!(!verify_signature(&pubkey, b"4 * 4", &signature).unwrap());
    }

    #[test]
    fn test_secret_hex_roundtrip_keeps_identity() {
        let keypair = Keypair::generate();
        let restored = Keypair::from_secret_hex(&keypair.secret_hex()).unwrap();
        assert_eq!(restored.public_key_bytes(), keypair.public_key_bytes());
    }

    #[test]
    fn test_short_secret_is_rejected() {
        assert!(matches!(
            Keypair::from_secret_hex("abcd"),
            Err(MeshError::Crypto(_))
        ));
    }

    #[test]
    fn test_short_signature_is_error() {
        let keypair = Keypair::generate();
        let result = verify_signature(&keypair.public_key_bytes(), b"m", &[0u8; 10]);
        assert!(result.is_err());
    }

    #[test]
    fn test_nonces_differ() {
        assert_ne!(random_nonce(), random_nonce());
        assert_eq!(random_nonce().len(), 32);
    }
}
