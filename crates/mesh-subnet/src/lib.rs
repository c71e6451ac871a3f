// crates/mesh-subnet/src/lib.rs
//
// mesh-subnet: the calculator subnet protocol.
//
// Server-mode nodes evaluate arithmetic expressions for their peers;
// client-mode nodes only issue requests. Both run the same
// CalculatorProtocol on top of a managed worker from mesh-rpc.

pub mod calculator;
pub mod client;
pub mod discovery;
pub mod protocol;
pub mod servicer;

pub use calculator::{Calculator, Evaluator};
pub use client::{ClientConfig, PeerClient};
pub use discovery::{announce_calculator, calculator_key, find_calculators};
pub use protocol::CalculatorProtocol;
pub use servicer::{CalculatorServicer, CALCULATE_METHOD, CLIENT_MODE_ERROR};
