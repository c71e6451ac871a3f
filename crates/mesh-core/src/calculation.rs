// crates/mesh-core/src/calculation.rs
//
// Wire messages of the calculator protocol.

use serde::{Deserialize, Serialize};

use crate::peer::PeerInfo;
use crate::time::{now_millis, LogicalTime};

/// Request a remote node to evaluate an arithmetic expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationRequest {
    /// The node issuing the request.
    pub requester: PeerInfo,
    /// Expression text, evaluated verbatim by the responder.
    pub expression: String,
    /// Caller-chosen correlation ID, echoed unchanged in the response.
    pub request_id: String,
}

impl CalculationRequest {
    /// Build a request stamped with a fresh [`request_id`].
    pub fn new(requester: PeerInfo, expression: impl Into<String>) -> Self {
        Self {
            requester,
            expression: expression.into(),
            request_id: request_id(),
        }
    }
}

/// Derive a request ID from the millisecond wall clock.
///
/// Two calls within the same millisecond produce the same ID.
pub fn request_id() -> String {
    format!("calc_{}", now_millis())
}

/// Result of a calculation request.
///
/// Built only through [`CalculationResponse::success`] and
/// [`CalculationResponse::failure`], which keep `success`, `result` and
/// `error` consistent: a success never carries an error string and a failure
/// always reports `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResponse {
    /// The node that produced this response.
    pub responder: PeerInfo,
    /// Responder's logical time when the response was built.
    pub timestamp: LogicalTime,
    /// Echo of the request expression.
    pub expression: String,
    /// Numeric result, `0.0` on failure.
    pub result: f64,
    /// Whether the expression was evaluated.
    pub success: bool,
    /// Failure reason, empty on success.
    pub error: String,
    /// Echo of the request ID.
    pub request_id: String,
}

impl CalculationResponse {
    /// A successful evaluation.
    pub fn success(
        responder: PeerInfo,
        expression: impl Into<String>,
        result: f64,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            responder,
            timestamp: LogicalTime::now(),
            expression: expression.into(),
            result,
            success: true,
            error: String::new(),
            request_id: request_id.into(),
        }
    }

    /// A failed evaluation or call.
    pub fn failure(
        responder: PeerInfo,
        expression: impl Into<String>,
        error: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            responder,
            timestamp: LogicalTime::now(),
            expression: expression.into(),
            result: 0.0,
            success: false,
            error: error.into(),
            request_id: request_id.into(),
        }
    }

    /// Check the success/result/error invariant.
    pub fn is_consistent(&self) -> bool {
        if self.success {
            self.error.is_empty()
        } else {
            self.result == 0.0
        }
    }
}
