// crates/mesh-daemon/src/identity.rs
//
// Node key loading. One ed25519 secret gives both the libp2p peer ID and
// the key the authorizer signs with.

use mesh_core::crypto::Keypair;

use crate::config::expand_tilde;

/// Load the node key from a hex-encoded secret file.
///
/// Returns a fresh ephemeral key (and logs a warning) when the file is
/// missing or invalid, so the node still runs with a throwaway identity.
pub fn load_node_key(identity_path: &str) -> Keypair {
    let path = expand_tilde(identity_path);
    match std::fs::read_to_string(&path) {
        Ok(hex_str) => match Keypair::from_secret_hex(hex_str.trim()) {
            Ok(keypair) => {
                tracing::info!("Loaded node key {} from {}", keypair.public_key_hex(), path);
                return keypair;
            }
            Err(e) => tracing::warn!("Invalid node key at {}: {}", path, e),
        },
        Err(_) => tracing::debug!("Node key not found at {}", path),
    }

    let keypair = Keypair::generate();
    tracing::warn!(
        "Running with ephemeral node key {}; write a hex secret to {} to keep the peer ID",
        keypair.public_key_hex(),
        path
    );
    keypair
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_hex_secret_from_file() {
        let keypair = Keypair::generate();
        let path = std::env::temp_dir().join(format!("mesh-key-{}.hex", keypair.public_key_hex()));
        std::fs::write(&path, format!("{}\n", keypair.secret_hex())).unwrap();

        let loaded = load_node_key(path.to_str().unwrap());
        assert_eq!(loaded.public_key_bytes(), keypair.public_key_bytes());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file_gives_ephemeral_key() {
        let a = load_node_key("/nonexistent/mesh/identity.key");
        let b = load_node_key("/nonexistent/mesh/identity.key");
        assert_ne!(a.public_key_bytes(), b.public_key_bytes());
    }
}
