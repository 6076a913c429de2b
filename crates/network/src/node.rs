//! Network node for veilhop
//!
//! Builds the swarm, starts listening and hands it to the driver task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use libp2p::{identity::Keypair, noise, tcp, yamux, Multiaddr, PeerId, SwarmBuilder};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

use crate::behaviour::VeilhopBehaviour;
use crate::discovery::DiscoveryEvents;
use crate::driver::SwarmDriver;
use crate::transport::NetworkHandle;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Dial error: {0}")]
    Dial(String),

    #[error("Listen error: {0}")]
    Listen(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Swarm build error: {0}")]
    SwarmBuild(String),

    #[error("Failed to open stream to {peer}: {reason}")]
    OpenStream { peer: PeerId, reason: String },

    #[error("Protocol already registered: {0}")]
    AlreadyRegistered(String),
}

/// Network configuration
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Addresses to listen on
    pub listen_addrs: Vec<Multiaddr>,
    /// DHT bootstrap peers
    pub bootstrap_peers: Vec<(PeerId, Multiaddr)>,
    /// Announce and browse on the local network
    pub enable_mdns: bool,
    /// How long an idle connection is kept open
    pub idle_connection_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addrs: vec![
                "/ip4/0.0.0.0/tcp/0".parse().expect("valid hardcoded multiaddr"),
                "/ip4/0.0.0.0/udp/0/quic-v1".parse().expect("valid hardcoded multiaddr"),
            ],
            bootstrap_peers: crate::bootstrap::default_bootstrap_peers(),
            enable_mdns: true,
            idle_connection_timeout: Duration::from_secs(120),
        }
    }
}

/// Build a raw swarm and return it along with the local peer ID.
pub fn build_swarm(
    keypair: Keypair,
    config: &NetworkConfig,
) -> Result<(libp2p::Swarm<VeilhopBehaviour>, PeerId), NetworkError> {
    let local_peer_id = PeerId::from(keypair.public());
    info!("Local peer ID: {}", local_peer_id);

    let enable_mdns = config.enable_mdns;
    let idle_timeout = config.idle_connection_timeout;

    let mut swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            tcp::Config::default().nodelay(true),
            noise::Config::new,
            yamux::Config::default,
        )
        .map_err(|e| NetworkError::Transport(e.to_string()))?
        .with_quic()
        .with_relay_client(noise::Config::new, yamux::Config::default)
        .map_err(|e| NetworkError::Transport(e.to_string()))?
        .with_behaviour(|key, relay_behaviour| {
            VeilhopBehaviour::new(key, relay_behaviour, enable_mdns)
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
        })
        .map_err(|e| NetworkError::SwarmBuild(format!("{:?}", e)))?
        .with_swarm_config(|c| c.with_idle_connection_timeout(idle_timeout))
        .build();

    for addr in &config.listen_addrs {
        swarm
            .listen_on(addr.clone())
            .map_err(|e| NetworkError::Listen(e.to_string()))?;
    }

    for (peer_id, addr) in &config.bootstrap_peers {
        swarm.behaviour_mut().add_address(peer_id, addr.clone());
    }

    Ok((swarm, local_peer_id))
}

/// Build the swarm, spawn its driver and return the handle used by the rest
/// of the node plus the discovery channels fed by the driver.
///
/// Must be called from within a tokio runtime.
pub fn start_network(
    keypair: Keypair,
    config: NetworkConfig,
) -> Result<(NetworkHandle, DiscoveryEvents), NetworkError> {
    let (swarm, local_peer_id) = build_swarm(keypair, &config)?;
    let control = swarm.behaviour().stream.new_control();

    let (command_tx, command_rx) = mpsc::channel(256);
    let (local_tx, local_rx) = mpsc::unbounded_channel();
    let (global_tx, global_rx) = mpsc::unbounded_channel();
    let connections = Arc::new(RwLock::new(HashMap::new()));
    let listen_addrs = Arc::new(RwLock::new(Vec::new()));

    let driver = SwarmDriver::new(
        swarm,
        command_rx,
        local_tx,
        global_tx,
        connections.clone(),
        listen_addrs.clone(),
    );
    tokio::spawn(driver.run());

    let handle = NetworkHandle::new(local_peer_id, command_tx, control, connections, listen_addrs);
    let events = DiscoveryEvents {
        local: local_rx,
        global: global_rx,
    };

    Ok((handle, events))
}
