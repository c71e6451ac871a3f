// crates/mesh-p2p/src/node.rs
//
// P2pOverlay: the libp2p-backed Overlay.
//
// The Swarm is owned by a single event-loop task. Overlay handles talk to it
// through a command channel; inbound requests are routed through the Axon
// into handler inboxes, outbound requests are tracked by the Dendrite until
// the matching response event arrives.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::identity::Keypair;
use libp2p::kad::{self, QueryId};
use libp2p::request_response::{self, ResponseChannel};
use libp2p::swarm::SwarmEvent;
use libp2p::{identify, mdns, Multiaddr, PeerId, Swarm};
use mesh_core::{MeshError, PeerInfo, RpcRequest, RpcResponse};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::axon::Axon;
use crate::behaviour::{MeshBehaviour, MeshBehaviourEvent};
use crate::dendrite::{Dendrite, ResponseWaiter};
use crate::discovery::{start_discovery, DiscoveryConfig};
use crate::overlay::{HandlerInbox, Overlay};
use crate::transport::{setup_transport, TransportConfig};

/// Full configuration of a libp2p overlay node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct P2pConfig {
    pub transport: TransportConfig,
    pub discovery: DiscoveryConfig,
}

/// Commands sent from overlay handles to the event loop.
enum Command {
    Ping {
        reply: oneshot::Sender<()>,
    },
    Call {
        peer: PeerId,
        addrs: Vec<Multiaddr>,
        frame: Vec<u8>,
        reply: ResponseWaiter,
    },
    Provide {
        key: String,
        reply: oneshot::Sender<Result<(), MeshError>>,
    },
    FindProviders {
        key: String,
        reply: oneshot::Sender<Result<Vec<PeerInfo>, MeshError>>,
    },
    Shutdown,
}

/// Handle to a running libp2p overlay node.
#[derive(Clone)]
pub struct P2pOverlay {
    peer_id: PeerId,
    listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
    commands: mpsc::Sender<Command>,
    axon: Axon,
}

impl std::fmt::Debug for P2pOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("P2pOverlay")
            .field("peer_id", &self.peer_id)
            .field("axon", &self.axon)
            .finish()
    }
}

impl P2pOverlay {
    /// Build the swarm, start discovery, and spawn the event loop on the
    /// current tokio runtime.
    pub fn spawn(config: &P2pConfig, keypair: Keypair) -> Result<(Self, JoinHandle<()>), MeshError> {
        let mut swarm = setup_transport(&config.transport, keypair)?;
        start_discovery(&mut swarm, &config.discovery)?;

        let peer_id = *swarm.local_peer_id();
        let (command_tx, command_rx) = mpsc::channel(64);
        let listen_addrs = Arc::new(RwLock::new(Vec::new()));
        let axon = Axon::new();

        let event_loop = EventLoop::new(swarm, command_rx, axon.clone(), listen_addrs.clone());
        let handle = tokio::spawn(event_loop.run());
        info!("P2P overlay started as {}", peer_id);

        Ok((
            Self {
                peer_id,
                listen_addrs,
                commands: command_tx,
                axon,
            },
            handle,
        ))
    }

    /// Local libp2p peer ID.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Addresses the swarm is currently listening on.
    pub fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.listen_addrs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Ask the event loop to stop. In-flight outbound calls fail.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn send_command(&self, command: Command) -> Result<(), MeshError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| MeshError::Network("Overlay event loop is not running".to_string()))
    }
}

fn closed_loop() -> MeshError {
    MeshError::Network("Overlay event loop stopped before answering".to_string())
}

#[async_trait]
impl Overlay for P2pOverlay {
    fn local_peer(&self) -> PeerInfo {
        PeerInfo::new(self.peer_id.to_base58())
            .with_addrs(self.listen_addrs().iter().map(|a| a.to_string()).collect())
    }

    async fn join(&self) -> Result<(), MeshError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Ping { reply }).await?;
        rx.await.map_err(|_| closed_loop())
    }

    async fn add_handler(&self, method: &str, inbox: HandlerInbox) -> Result<(), MeshError> {
        self.axon.add(method, inbox)
    }

    async fn remove_handler(&self, method: &str) -> Result<(), MeshError> {
        self.axon.remove(method);
        Ok(())
    }

    async fn call(&self, peer: &PeerInfo, request: RpcRequest) -> Result<RpcResponse, MeshError> {
        let target: PeerId = peer
            .peer_id
            .parse()
            .map_err(|e| MeshError::Network(format!("Invalid peer id '{}': {}", peer.peer_id, e)))?;

        // The swarm cannot dial itself; serve local calls straight from the Axon.
        if target == self.peer_id {
            return Ok(self.axon.dispatch(self.local_peer(), request).await);
        }

        let addrs = peer
            .addrs
            .iter()
            .filter_map(|a| match a.parse::<Multiaddr>() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    warn!("Ignoring invalid address '{}' for {}: {}", a, peer, e);
                    None
                }
            })
            .collect();

        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Call {
            peer: target,
            addrs,
            frame: request.to_bytes()?,
            reply,
        })
        .await?;

        let frame = rx.await.map_err(|_| closed_loop())??;
        RpcResponse::from_bytes(&frame)
    }

    async fn provide(&self, key: &str) -> Result<(), MeshError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Provide {
            key: key.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| closed_loop())?
    }

    async fn find_providers(&self, key: &str) -> Result<Vec<PeerInfo>, MeshError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::FindProviders {
            key: key.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| closed_loop())?
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

struct ProviderQuery {
    found: HashSet<PeerId>,
    reply: oneshot::Sender<Result<Vec<PeerInfo>, MeshError>>,
}

struct EventLoop {
    swarm: Swarm<MeshBehaviour>,
    commands: mpsc::Receiver<Command>,
    responses_tx: mpsc::UnboundedSender<(ResponseChannel<Vec<u8>>, Vec<u8>)>,
    responses_rx: mpsc::UnboundedReceiver<(ResponseChannel<Vec<u8>>, Vec<u8>)>,
    axon: Axon,
    dendrite: Dendrite,
    provider_queries: HashMap<QueryId, ProviderQuery>,
    listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
}

impl EventLoop {
    fn new(
        swarm: Swarm<MeshBehaviour>,
        commands: mpsc::Receiver<Command>,
        axon: Axon,
        listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
    ) -> Self {
        let (responses_tx, responses_rx) = mpsc::unbounded_channel();
        Self {
            swarm,
            commands,
            responses_tx,
            responses_rx,
            axon,
            dendrite: Dendrite::new(),
            provider_queries: HashMap::new(),
            listen_addrs,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some((channel, frame)) = self.responses_rx.recv() => {
                    if self
                        .swarm
                        .behaviour_mut()
                        .request_response
                        .send_response(channel, frame)
                        .is_err()
                    {
                        warn!("Could not send response: connection to requester closed");
                    }
                }
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
            }
        }

        self.dendrite.fail_all("Overlay shutting down");
        for (_, query) in self.provider_queries.drain() {
            let _ = query
                .reply
                .send(Err(MeshError::Network("Overlay shutting down".to_string())));
        }
        info!("P2P overlay event loop stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Ping { reply } => {
                let _ = reply.send(());
            }
            Command::Call {
                peer,
                addrs,
                frame,
                reply,
            } => {
                let behaviour = self.swarm.behaviour_mut();
                for addr in addrs {
                    behaviour.kademlia.add_address(&peer, addr);
                }
                let request_id = behaviour.request_response.send_request(&peer, frame);
                debug!("Sent request {:?} to {}", request_id, peer);
                self.dendrite.track(request_id, reply);
            }
            Command::Provide { key, reply } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .kademlia
                    .start_providing(kad::RecordKey::new(&key))
                    .map(|_| ())
                    .map_err(|e| MeshError::Network(format!("Cannot provide '{}': {}", key, e)));
                if result.is_ok() {
                    info!("Providing '{}' on the DHT", key);
                }
                let _ = reply.send(result);
            }
            Command::FindProviders { key, reply } => {
                let query_id = self
                    .swarm
                    .behaviour_mut()
                    .kademlia
                    .get_providers(kad::RecordKey::new(&key));
                self.provider_queries.insert(
                    query_id,
                    ProviderQuery {
                        found: HashSet::new(),
                        reply,
                    },
                );
            }
            // Handled by the loop itself.
            Command::Shutdown => {}
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<MeshBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!("Listening on {}/p2p/{}", address, self.swarm.local_peer_id());
                self.listen_addrs
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(address);
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                debug!("Connected to {}", peer_id);
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                debug!("Outgoing connection to {:?} failed: {}", peer_id, error);
            }
            SwarmEvent::Behaviour(MeshBehaviourEvent::RequestResponse(event)) => {
                self.handle_request_response(event)
            }
            SwarmEvent::Behaviour(MeshBehaviourEvent::Kademlia(event)) => self.handle_kademlia(event),
            SwarmEvent::Behaviour(MeshBehaviourEvent::Mdns(mdns::Event::Discovered(peers))) => {
                for (peer_id, addr) in peers {
                    debug!("mDNS discovered {} at {}", peer_id, addr);
                    self.swarm.behaviour_mut().kademlia.add_address(&peer_id, addr);
                }
            }
            SwarmEvent::Behaviour(MeshBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                for addr in info.listen_addrs {
                    self.swarm.behaviour_mut().kademlia.add_address(&peer_id, addr);
                }
            }
            _ => {}
        }
    }

    fn handle_request_response(&mut self, event: request_response::Event<Vec<u8>, Vec<u8>>) {
        match event {
            request_response::Event::Message { peer, message, .. } => match message {
                request_response::Message::Request {
                    request, channel, ..
                } => {
                    let axon = self.axon.clone();
                    let responses = self.responses_tx.clone();
                    let remote = PeerInfo::new(peer.to_base58());
                    tokio::spawn(async move {
                        let frame = axon.handle_frame(remote, &request).await;
                        let _ = responses.send((channel, frame));
                    });
                }
                request_response::Message::Response {
                    request_id,
                    response,
                } => self.dendrite.resolve(request_id, Ok(response)),
            },
            request_response::Event::OutboundFailure {
                peer,
                request_id,
                error,
                ..
            } => {
                self.dendrite.resolve(
                    request_id,
                    Err(MeshError::Network(format!("Request to {} failed: {}", peer, error))),
                );
            }
            request_response::Event::InboundFailure { peer, error, .. } => {
                warn!("Inbound request from {} failed: {}", peer, error);
            }
            request_response::Event::ResponseSent { .. } => {}
        }
    }

    fn handle_kademlia(&mut self, event: kad::Event) {
        let kad::Event::OutboundQueryProgressed {
            id, result, step, ..
        } = event
        else {
            return;
        };

        match result {
            kad::QueryResult::GetProviders(Ok(kad::GetProvidersOk::FoundProviders {
                providers,
                ..
            })) => {
                if let Some(query) = self.provider_queries.get_mut(&id) {
                    query.found.extend(providers);
                }
                if step.last {
                    self.finish_provider_query(id);
                }
            }
            kad::QueryResult::GetProviders(Ok(
                kad::GetProvidersOk::FinishedWithNoAdditionalRecord { .. },
            )) => self.finish_provider_query(id),
            kad::QueryResult::GetProviders(Err(e)) => {
                debug!("Provider lookup ended early: {}", e);
                self.finish_provider_query(id);
            }
            kad::QueryResult::StartProviding(Err(e)) => {
                warn!("Failed to publish provider record: {}", e);
            }
            _ => {}
        }
    }

    fn finish_provider_query(&mut self, id: QueryId) {
        if let Some(query) = self.provider_queries.remove(&id) {
            let local = *self.swarm.local_peer_id();
            let peers = query
                .found
                .into_iter()
                .filter(|p| *p != local)
                .map(|p| PeerInfo::new(p.to_base58()))
                .collect();
            let _ = query.reply.send(Ok(peers));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::InboundCall;
    use serde_json::json;

    fn local_config() -> P2pConfig {
        P2pConfig {
            transport: TransportConfig {
                listen_addr: "/ip4/127.0.0.1/tcp/0".to_string(),
                enable_quic: false,
                enable_mdns: false,
                request_timeout_secs: 5,
            },
            discovery: DiscoveryConfig::default(),
        }
    }

    #[tokio::test]
    async fn join_succeeds_while_loop_runs() {
        let (overlay, handle) =
            P2pOverlay::spawn(&local_config(), Keypair::generate_ed25519()).unwrap();
        overlay.join().await.unwrap();

        overlay.shutdown().await;
        handle.await.unwrap();
        assert!(overlay.join().await.is_err());
    }

    #[tokio::test]
    async fn call_to_self_is_served_locally() {
        let (overlay, _handle) =
            P2pOverlay::spawn(&local_config(), Keypair::generate_ed25519()).unwrap();
        let (tx, mut rx) = mpsc::channel::<InboundCall>(4);
        overlay.add_handler("echo", tx).await.unwrap();
        tokio::spawn(async move {
            while let Some(call) = rx.recv().await {
                let _ = call.reply.send(RpcResponse::ok(call.request.params));
            }
        });

        let resp = overlay
            .call(&overlay.local_peer(), RpcRequest::new("echo", json!("hi")))
            .await
            .unwrap();
        assert_eq!(resp.result, Some(json!("hi")));
    }

    #[tokio::test]
    async fn invalid_peer_id_is_network_error() {
        let (overlay, _handle) =
            P2pOverlay::spawn(&local_config(), Keypair::generate_ed25519()).unwrap();
        let err = overlay
            .call(&PeerInfo::new("not-a-peer-id"), RpcRequest::new("m", json!(null)))
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::Network(_)));
    }
}
