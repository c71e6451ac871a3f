// crates/mesh-rpc/src/lib.rs
//
// mesh-rpc: servicer lifecycle for the Mesh calculator subnet.
//
// A Servicer is wrapped by a ManagedWorker that runs it on a dedicated
// thread with a single-threaded runtime, registers its methods on the
// overlay behind an AuthRpcWrapper, and reports startup through a
// ReadinessSignal. Clients reach remote servicers through a Stub wrapped
// in the client role.

pub mod auth;
pub mod authorizer;
pub mod readiness;
pub mod role;
pub mod servicer;
pub mod shutdown;
pub mod state;
pub mod stub;
pub mod worker;

pub use auth::AuthRpcWrapper;
pub use authorizer::Ed25519Authorizer;
pub use readiness::ReadinessSignal;
pub use role::Role;
pub use servicer::{dispatch_handler, CallContext, Servicer};
pub use shutdown::{ShutdownChannel, ShutdownListener};
pub use state::{WorkerState, WorkerStateMachine};
pub use stub::Stub;
pub use worker::ManagedWorker;
