// crates/mesh-rpc/src/role.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which side of a call an [`crate::AuthRpcWrapper`] protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// The answering side: verifies inbound requests, signs responses.
    Servicer,
    /// The calling side: signs outbound requests, verifies responses.
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Servicer => write!(f, "SERVICER"),
            Role::Client => write!(f, "CLIENT"),
        }
    }
}
