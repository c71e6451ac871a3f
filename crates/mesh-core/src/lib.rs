// crates/mesh-core/src/lib.rs
//
// mesh-core: Core types, errors, envelopes, and crypto primitives for the
// Mesh calculator subnet.
//
// This is the leaf crate that all other crates in the workspace depend on.

pub mod calculation;
pub mod crypto;
pub mod error;
pub mod peer;
pub mod rpc;
pub mod time;
pub mod traits;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use mesh_core::PeerInfo;`

pub use calculation::{CalculationRequest, CalculationResponse};
pub use error::MeshError;
pub use peer::PeerInfo;
pub use rpc::{AuthInfo, RpcRequest, RpcResponse};
pub use time::LogicalTime;
pub use traits::Authorizer;
