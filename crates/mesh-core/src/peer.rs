// crates/mesh-core/src/peer.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a node on the overlay.
///
/// `peer_id` is opaque to everything above the transport. `addrs` carries
/// dialable multiaddrs when they are known; overlays that resolve peers on
/// their own ignore it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Overlay-assigned peer identifier (libp2p `PeerId` in base58 for the
    /// libp2p overlay, any unique string for the in-memory overlay).
    pub peer_id: String,
    /// Known multiaddrs for this peer, without the trailing `/p2p/` component.
    #[serde(default)]
    pub addrs: Vec<String>,
}

impl PeerInfo {
    /// Create a PeerInfo with no known addresses.
    pub fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            addrs: Vec::new(),
        }
    }

    /// Attach known addresses.
    pub fn with_addrs(mut self, addrs: Vec<String>) -> Self {
        self.addrs = addrs;
        self
    }
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.peer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_info_displays_id_only() {
        let peer = PeerInfo::new("QmPeer").with_addrs(vec!["/ip4/127.0.0.1/tcp/1".to_string()]);
        assert_eq!(peer.to_string(), "QmPeer");
    }

    #[test]
    fn addrs_default_when_missing() {
        let peer: PeerInfo = serde_json::from_str(r#"{"peer_id":"abc"}"#).unwrap();
        assert_eq!(peer, PeerInfo::new("abc"));
    }
}
