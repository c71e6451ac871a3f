// crates/mesh-p2p/src/memory.rs
//
// In-process overlay: every node shares one MemoryNetwork and calls are
// routed straight into the target's handler inbox. Frames still go through
// the JSON wire encoding so behaviour matches the libp2p overlay.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use mesh_core::{MeshError, PeerInfo, RpcRequest, RpcResponse};
use tracing::debug;

use crate::overlay::{deliver, HandlerInbox, Overlay};

#[derive(Default)]
struct NetworkState {
    /// peer_id -> (method -> inbox) for every joined node.
    nodes: HashMap<String, HashMap<String, HandlerInbox>>,
    /// provider key -> peer_ids.
    providers: HashMap<String, BTreeSet<String>>,
}

/// A shared in-process network that [`MemoryOverlay`] nodes attach to.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("nodes", &self.lock().nodes.len())
            .finish()
    }
}

impl MemoryNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node on this network with the given peer ID.
    pub fn node(&self, peer_id: impl Into<String>) -> MemoryOverlay {
        MemoryOverlay {
            network: self.clone(),
            local: PeerInfo::new(peer_id),
            joined: AtomicBool::new(false),
            join_failure: None,
        }
    }

    /// Whether a node with this ID is currently attached.
    pub fn is_attached(&self, peer_id: &str) -> bool {
        self.lock().nodes.contains_key(peer_id)
    }

    /// Methods currently registered by a node.
    pub fn registered_methods(&self, peer_id: &str) -> Vec<String> {
        let state = self.lock();
        let mut methods: Vec<String> = state
            .nodes
            .get(peer_id)
            .map(|handlers| handlers.keys().cloned().collect())
            .unwrap_or_default();
        methods.sort();
        methods
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        // The state holds plain maps; a panic elsewhere cannot leave them torn.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One node on a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryOverlay {
    network: MemoryNetwork,
    local: PeerInfo,
    joined: AtomicBool,
    join_failure: Option<String>,
}

impl MemoryOverlay {
    /// Make every `join` fail with the given reason.
    pub fn with_join_failure(mut self, reason: impl Into<String>) -> Self {
        self.join_failure = Some(reason.into());
        self
    }

    /// Detach from the network, dropping all handlers and provider records.
    pub fn leave(&self) {
        let mut state = self.network.lock();
        state.nodes.remove(&self.local.peer_id);
        for peers in state.providers.values_mut() {
            peers.remove(&self.local.peer_id);
        }
        self.joined.store(false, Ordering::SeqCst);
        debug!("Memory overlay node {} left the network", self.local);
    }

    fn ensure_joined(&self) -> Result<(), MeshError> {
        if self.joined.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MeshError::Network(format!(
                "Node {} has not joined the overlay",
                self.local
            )))
        }
    }
}

#[async_trait]
impl Overlay for MemoryOverlay {
    fn local_peer(&self) -> PeerInfo {
        self.local.clone()
    }

    async fn join(&self) -> Result<(), MeshError> {
        if let Some(reason) = &self.join_failure {
            return Err(MeshError::Network(reason.clone()));
        }
        self.network
            .lock()
            .nodes
            .entry(self.local.peer_id.clone())
            .or_default();
        if !self.joined.swap(true, Ordering::SeqCst) {
            debug!("Memory overlay node {} joined", self.local);
        }
        Ok(())
    }

    async fn add_handler(&self, method: &str, inbox: HandlerInbox) -> Result<(), MeshError> {
        self.ensure_joined()?;
        let mut state = self.network.lock();
        let handlers = state.nodes.entry(self.local.peer_id.clone()).or_default();
        if handlers.contains_key(method) {
            return Err(MeshError::InvalidState(format!(
                "Handler for '{}' is already registered",
                method
            )));
        }
        handlers.insert(method.to_string(), inbox);
        Ok(())
    }

    async fn remove_handler(&self, method: &str) -> Result<(), MeshError> {
        let mut state = self.network.lock();
        if let Some(handlers) = state.nodes.get_mut(&self.local.peer_id) {
            handlers.remove(method);
        }
        Ok(())
    }

    async fn call(&self, peer: &PeerInfo, request: RpcRequest) -> Result<RpcResponse, MeshError> {
        self.ensure_joined()?;

        let inbox = {
            let state = self.network.lock();
            let handlers = state
                .nodes
                .get(&peer.peer_id)
                .ok_or_else(|| MeshError::Network(format!("Peer {} is unreachable", peer)))?;
            handlers.get(&request.method).cloned()
        };

        let Some(inbox) = inbox else {
            return Ok(RpcResponse::failure(format!("Unknown method: {}", request.method)));
        };

        // Same framing as the wire so encoding problems surface here too.
        let request = RpcRequest::from_bytes(&request.to_bytes()?)?;
        let response = deliver(&inbox, self.local.clone(), request).await?;
        RpcResponse::from_bytes(&response.to_bytes()?)
    }

    async fn provide(&self, key: &str) -> Result<(), MeshError> {
        self.ensure_joined()?;
        self.network
            .lock()
            .providers
            .entry(key.to_string())
            .or_default()
            .insert(self.local.peer_id.clone());
        Ok(())
    }

    async fn find_providers(&self, key: &str) -> Result<Vec<PeerInfo>, MeshError> {
        self.ensure_joined()?;
        let state = self.network.lock();
        Ok(state
            .providers
            .get(key)
            .map(|peers| peers.iter().map(PeerInfo::new).collect())
            .unwrap_or_default())
    }
}
