// crates/mesh-daemon/src/main.rs
//
// Binary entrypoint for the Mesh calculator daemon.
//
// Initializes tracing, parses CLI arguments, loads configuration, starts the
// libp2p overlay and the calculator protocol, then either serves until
// Ctrl-C (server mode) or runs a batch of expressions against a peer
// (client mode).

mod config;
mod identity;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use config::{DaemonConfig, Mode};
use mesh_core::{Authorizer, MeshError, PeerInfo};
use mesh_p2p::{keypair_from_secret, peer_info_from_multiaddr, Overlay, P2pOverlay};
use mesh_rpc::Ed25519Authorizer;
use mesh_subnet::CalculatorProtocol;

/// Expressions sent in client mode when none are given.
const DEFAULT_EXPRESSIONS: [&str; 4] = ["4 * 3", "15 + 27", "100 / 4", "10 / 0"];

/// Mesh calculator subnet daemon: serve or request calculations.
#[derive(Parser, Debug)]
#[command(name = "mesh-daemon", version = "0.1.0", about = "Mesh calculator subnet node daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "~/.mesh/config.toml")]
    config: String,

    /// Run as server or client (overrides the config file).
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Subnet to join (overrides the config file).
    #[arg(long)]
    subnet_id: Option<u64>,

    /// Client mode: full multiaddr of the server to call. Looked up on the
    /// DHT when omitted.
    #[arg(long)]
    peer: Option<String>,

    /// Client mode: expression to send. May be repeated.
    #[arg(long = "expr")]
    expressions: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration from TOML file, falling back to defaults if the file
    // is not found. Logged once tracing is up.
    let config_path = config::expand_tilde(&args.config);
    let loaded = DaemonConfig::load(&config_path);
    let mut daemon_config = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(_) => DaemonConfig::default(),
    };

    // Initialize tracing subscriber for structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&daemon_config.log_level)),
        )
        .init();

    match loaded {
        Ok(_) => tracing::info!("Loaded configuration from {}", config_path),
        Err(e) => tracing::warn!(
            "Could not load config from {}: {}. Using defaults.",
            config_path,
            e
        ),
    }

    // CLI flags override the config file values.
    if let Some(mode) = args.mode {
        daemon_config.mode = mode;
    }
    if let Some(subnet_id) = args.subnet_id {
        daemon_config.subnet_id = subnet_id;
    }

    tracing::info!("Mesh calculator daemon v0.1.0");
    tracing::info!("Mode: {}", daemon_config.mode);
    tracing::info!("Subnet: {}", daemon_config.subnet_id);
    tracing::info!("Listen address: {}", daemon_config.listen_addr);

    let node_key = identity::load_node_key(&daemon_config.identity_path);
    let (p2p, event_loop) = P2pOverlay::spawn(
        &daemon_config.p2p_config(),
        keypair_from_secret(node_key.secret_bytes())?,
    )?;
    tracing::info!("Peer ID: {}", p2p.peer_id());
    let overlay: Arc<dyn Overlay> = Arc::new(p2p.clone());

    let authorizer: Option<Arc<dyn Authorizer>> = if daemon_config.authorize {
        tracing::info!("Authorization enabled");
        Some(Arc::new(Ed25519Authorizer::new(node_key)))
    } else {
        None
    };

    let protocol = CalculatorProtocol::new(
        overlay,
        daemon_config.subnet_id,
        authorizer,
        daemon_config.mode == Mode::Client,
        false,
    )?
    .with_client_config(daemon_config.client.clone());

    // The overlay event loop lives on this runtime; wait without blocking it.
    protocol.run_in_background(false, None)?;
    protocol
        .ready(Some(Duration::from_secs(daemon_config.ready_timeout_secs)))
        .await?;

    let outcome = match daemon_config.mode {
        Mode::Server => run_server(&protocol, &p2p).await,
        Mode::Client => run_client(&protocol, &daemon_config, &args).await,
    };

    protocol.stop();
    tokio::task::block_in_place(|| protocol.join());
    p2p.shutdown().await;
    let _ = event_loop.await;

    tracing::info!("Mesh daemon shut down gracefully");
    outcome
}

/// Announce the calculator and serve until Ctrl-C.
async fn run_server(
    protocol: &CalculatorProtocol,
    p2p: &P2pOverlay,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = protocol.announce().await {
        tracing::warn!("Could not announce calculator on the DHT: {}", e);
    }

    for addr in p2p.listen_addrs() {
        tracing::info!("Reach this server with --peer {}/p2p/{}", addr, p2p.peer_id());
    }
    tracing::info!("Calculator server running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    Ok(())
}

/// Send every expression to the target server and log the answers.
async fn run_client(
    protocol: &CalculatorProtocol,
    config: &DaemonConfig,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let target = match &args.peer {
        Some(addr) => peer_info_from_multiaddr(addr)?,
        None => discover_server(protocol, config).await?,
    };
    tracing::info!("Using calculator {}", target);

    let expressions: Vec<String> = if args.expressions.is_empty() {
        DEFAULT_EXPRESSIONS.iter().map(|e| e.to_string()).collect()
    } else {
        args.expressions.clone()
    };

    let mut failures = 0;
    for expression in &expressions {
        let response = protocol.call_peer(&target, expression).await;
        if response.success {
            tracing::info!("{} = {}", response.expression, response.result);
        } else {
            failures += 1;
            tracing::warn!("{} failed: {}", response.expression, response.error);
        }
    }
    tracing::info!(
        "{} of {} calculations succeeded",
        expressions.len() - failures,
        expressions.len()
    );
    Ok(())
}

/// Give discovery time to populate the routing table, then look up
/// calculator providers for the subnet.
async fn discover_server(
    protocol: &CalculatorProtocol,
    config: &DaemonConfig,
) -> Result<PeerInfo, Box<dyn std::error::Error>> {
    tracing::info!(
        "No --peer given; looking up calculators for subnet {} in {}s",
        config.subnet_id,
        config.discovery_wait_secs
    );
    tokio::time::sleep(Duration::from_secs(config.discovery_wait_secs)).await;

    let peers = protocol.find_peers().await?;
    let target = peers.into_iter().next().ok_or_else(|| {
        MeshError::NotFound(format!("No calculator found for subnet {}", config.subnet_id))
    })?;
    Ok(target)
}
