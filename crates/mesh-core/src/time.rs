// crates/mesh-core/src/time.rs
//
// Network time helpers: logical timestamps stamped on responses and the
// millisecond clock used to derive request IDs.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch as seen by the node that stamped it.
///
/// Only the responder's clock is involved, so values from different nodes
/// are comparable only up to their clock skew.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalTime(pub f64);

impl LogicalTime {
    /// Current logical time.
    pub fn now() -> Self {
        LogicalTime(Utc::now().timestamp_micros() as f64 / 1_000_000.0)
    }

    /// Seconds since the Unix epoch.
    pub fn as_secs_f64(&self) -> f64 {
        self.0
    }
}

/// Current wall-clock time in whole milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_time_tracks_wall_clock() {
        let before = now_millis() as f64 / 1000.0;
        let t = LogicalTime::now();
        let after = now_millis() as f64 / 1000.0;
        assert!(t.as_secs_f64() >= before - 0.001);
        assert!(t.as_secs_f64() <= after + 0.001);
    }

    #[test]
    fn logical_time_serializes_as_number() {
        let json = serde_json::to_string(&LogicalTime(12.5)).unwrap();
        assert_eq!(json, "12.5");
    }
}
