// crates/mesh-p2p/src/lib.rs
//
// mesh-p2p: overlay networking for the Mesh calculator subnet.
//
// Defines the Overlay abstraction servicers register handlers on, an
// in-memory overlay for tests and single-process setups, and a libp2p
// overlay with Kademlia provider records, mDNS discovery and
// axon/dendrite request/response plumbing.

pub mod axon;
pub mod behaviour;
pub mod dendrite;
pub mod discovery;
pub mod memory;
pub mod node;
pub mod overlay;
pub mod transport;

pub use discovery::{peer_info_from_multiaddr, DiscoveryConfig};
pub use memory::{MemoryNetwork, MemoryOverlay};
pub use node::{P2pConfig, P2pOverlay};
pub use overlay::{deliver, HandlerInbox, InboundCall, Overlay};
pub use transport::{keypair_from_secret, TransportConfig};
