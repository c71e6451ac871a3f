// crates/mesh-p2p/src/dendrite.rs
//
// Dendrite: outbound side of the overlay. Tracks requests that were handed
// to the swarm and completes their waiters when a response or failure event
// arrives.

use std::collections::HashMap;
use std::hash::Hash;

use libp2p::request_response::OutboundRequestId;
use mesh_core::MeshError;
use tokio::sync::oneshot;
use tracing::debug;

/// Waiter for one outbound response frame.
pub type ResponseWaiter = oneshot::Sender<Result<Vec<u8>, MeshError>>;

/// Outbound requests awaiting a response, keyed by request ID.
///
/// Owned by the overlay event loop; never shared.
#[derive(Debug)]
pub struct Dendrite<K = OutboundRequestId> {
    pending: HashMap<K, ResponseWaiter>,
}

impl<K> Default for Dendrite<K> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + std::fmt::Debug> Dendrite<K> {
    /// Create an empty Dendrite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the waiter for a request that was just sent.
    pub fn track(&mut self, request_id: K, waiter: ResponseWaiter) {
        self.pending.insert(request_id, waiter);
    }

    /// Complete the waiter for `request_id`. Unknown IDs are ignored (the
    /// caller may have given up already).
    pub fn resolve(&mut self, request_id: K, outcome: Result<Vec<u8>, MeshError>) {
        match self.pending.remove(&request_id) {
            Some(waiter) => {
                let _ = waiter.send(outcome);
            }
            None => debug!("No waiter for outbound request {:?}", request_id),
        }
    }

    /// Fail every pending request, e.g. when the event loop shuts down.
    pub fn fail_all(&mut self, reason: &str) {
        for (_, waiter) in self.pending.drain() {
            let _ = waiter.send(Err(MeshError::Network(reason.to_string())));
        }
    }

    /// Number of requests in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_completes_matching_waiter() {
        let mut dendrite: Dendrite<u64> = Dendrite::new();
        let (tx, rx) = oneshot::channel();
        dendrite.track(7, tx);
        assert_eq!(dendrite.in_flight(), 1);

        dendrite.resolve(7, Ok(b"pong".to_vec()));
        assert_eq!(rx.await.unwrap().unwrap(), b"pong".to_vec());
        assert_eq!(dendrite.in_flight(), 0);
    }

    #[tokio::test]
    async fn fail_all_reports_network_error() {
        let mut dendrite: Dendrite<u64> = Dendrite::new();
        let (tx, rx) = oneshot::channel();
        dendrite.track(1, tx);
        dendrite.fail_all("overlay shutting down");
        assert_eq!(
            rx.await.unwrap().unwrap_err(),
            MeshError::Network("overlay shutting down".to_string())
        );
    }

    #[test]
    fn resolving_unknown_id_is_ignored() {
        let mut dendrite: Dendrite<u64> = Dendrite::new();
        dendrite.resolve(3, Ok(Vec::new()));
        assert_eq!(dendrite.in_flight(), 0);
    }
}
