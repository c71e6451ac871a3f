// crates/mesh-subnet/src/protocol.rs
//
// CalculatorProtocol: the supervisor a node holds for the calculator
// subnet. It owns the managed worker serving `calculator/calculate` and the
// client used to call other nodes.

use std::sync::Arc;
use std::time::Duration;

use mesh_core::{Authorizer, CalculationResponse, MeshError, PeerInfo};
use mesh_p2p::Overlay;
use mesh_rpc::{ManagedWorker, WorkerState};
use tracing::info;

use crate::client::{ClientConfig, PeerClient};
use crate::discovery::{announce_calculator, find_calculators};
use crate::servicer::CalculatorServicer;

/// One node's membership in a calculator subnet.
///
/// Every node registers the calculate handler; only server-mode nodes
/// construct an evaluator. Any node may call other nodes through
/// [`CalculatorProtocol::call_peer`]. Dropping the protocol shuts its worker
/// down.
pub struct CalculatorProtocol {
    subnet_id: u64,
    client_mode: bool,
    overlay: Arc<dyn Overlay>,
    worker: ManagedWorker<CalculatorServicer>,
    client: PeerClient,
}

impl std::fmt::Debug for CalculatorProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalculatorProtocol")
            .field("subnet_id", &self.subnet_id)
            .field("client_mode", &self.client_mode)
            .field("state", &self.worker.state())
            .finish()
    }
}

impl CalculatorProtocol {
    /// Build the protocol. With `start`, the worker is launched and this call
    /// blocks until it is ready, failing with the captured startup error.
    pub fn new(
        overlay: Arc<dyn Overlay>,
        subnet_id: u64,
        authorizer: Option<Arc<dyn Authorizer>>,
        client: bool,
        start: bool,
    ) -> Result<Self, MeshError> {
        let servicer = CalculatorServicer::new(client);
        let protocol = Self {
            subnet_id,
            client_mode: client,
            overlay: overlay.clone(),
            worker: ManagedWorker::new(overlay.clone(), servicer, authorizer.clone()),
            client: PeerClient::new(overlay, authorizer),
        };
        info!(
            "Calculator protocol for subnet {} created in {} mode",
            subnet_id,
            if client { "client" } else { "server" }
        );

        if start {
            protocol.run_in_background(true, None)?;
        }
        Ok(protocol)
    }

    /// Replace the retry policy used by [`CalculatorProtocol::call_peer`].
    pub fn with_client_config(mut self, config: ClientConfig) -> Self {
        self.client = self.client.with_config(config);
        self
    }

    /// Pin the key remote calculators must sign responses with.
    pub fn with_service_key(mut self, public_key: [u8; 32]) -> Self {
        self.client = self.client.with_service_key(public_key);
        self
    }

    /// Launch the worker; with `await_ready`, block until it is ready.
    ///
    /// Setup failures and an elapsed `timeout` come back as
    /// `MeshError::Startup`. Async callers whose overlay runs on the same
    /// runtime should pass `await_ready = false` and then await
    /// [`CalculatorProtocol::ready`].
    pub fn run_in_background(
        &self,
        await_ready: bool,
        timeout: Option<Duration>,
    ) -> Result<(), MeshError> {
        self.worker.run_in_background(await_ready, timeout)
    }

    /// Await readiness without blocking the runtime.
    pub async fn ready(&self, timeout: Option<Duration>) -> Result<PeerInfo, MeshError> {
        self.worker.ready(timeout).await
    }

    /// Signal the worker to shut down. Never blocks.
    pub fn stop(&self) {
        self.worker.stop();
    }

    /// Block until the worker thread has exited.
    pub fn join(&self) {
        self.worker.join();
    }

    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }

    pub fn subnet_id(&self) -> u64 {
        self.subnet_id
    }

    pub fn is_client(&self) -> bool {
        self.client_mode
    }

    pub fn local_peer(&self) -> PeerInfo {
        self.overlay.local_peer()
    }

    /// Ask `peer` to evaluate `expression`. Never fails; see
    /// [`PeerClient::call_peer`].
    pub async fn call_peer(&self, peer: &PeerInfo, expression: &str) -> CalculationResponse {
        self.client.call_peer(peer, expression).await
    }

    /// Advertise this node as a calculator of its subnet.
    pub async fn announce(&self) -> Result<(), MeshError> {
        announce_calculator(self.overlay.as_ref(), self.subnet_id).await
    }

    /// Other calculators advertised in this subnet.
    pub async fn find_peers(&self) -> Result<Vec<PeerInfo>, MeshError> {
        find_calculators(self.overlay.as_ref(), self.subnet_id).await
    }
}
