//! Node service
//!
//! Owns every long-running part of a veilhop node: the probe responder, the
//! relay handler, both discovery loops and (in gateway mode) the control
//! API. Peer-only nodes relay and answer probes but never serve the API.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use veilhop_client::{OrchestratorConfig, TunnelOrchestrator};
use veilhop_keystore::{default_identity_path, load_or_generate_identity};
use veilhop_network::{
    serve_probes, start_network, DiscoveryConfig, DiscoveryEvents, DiscoveryService, Keypair,
    LatencyProber, NetworkConfig, NetworkHandle, Overlay, PeerRegistry,
    DEFAULT_PROBE_TIMEOUT, NEGOTIATION_STREAM_PROTOCOL, PROBE_STREAM_PROTOCOL,
};
use veilhop_relay::{RelayConfig, RelayHandler};
use veilhop_tunnel::{InterfaceController, LinuxController, TunnelConfig, TunnelConfigurator};

use crate::api;
use crate::service::DaemonService;
use crate::Result;

/// Where the overlay identity comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// Load from this file, generating it on first run
    Keyfile(PathBuf),
    /// Fresh identity every run
    Ephemeral,
}

impl Default for IdentitySource {
    fn default() -> Self {
        IdentitySource::Keyfile(default_identity_path())
    }
}

impl IdentitySource {
    pub fn load(&self) -> Result<Keypair> {
        match self {
            IdentitySource::Keyfile(path) => Ok(load_or_generate_identity(path)?),
            IdentitySource::Ephemeral => {
                info!("Using ephemeral identity");
                Ok(Keypair::generate_ed25519())
            }
        }
    }
}

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Relay and answer probes only, without the control API
    pub peer_only: bool,
    pub identity: IdentitySource,
    pub network: NetworkConfig,
    pub discovery: DiscoveryConfig,
    pub probe_timeout: Duration,
    pub relay: RelayConfig,
    pub orchestrator: OrchestratorConfig,
    pub tunnel: TunnelConfig,
    /// Control API bind address (gateway mode)
    pub api_addr: SocketAddr,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            peer_only: false,
            identity: IdentitySource::default(),
            network: NetworkConfig::default(),
            discovery: DiscoveryConfig::default(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            relay: RelayConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            tunnel: TunnelConfig::default(),
            api_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
        }
    }
}

/// A running node
pub struct NodeService<T: Overlay> {
    service: Arc<DaemonService<T>>,
    api_addr: Option<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeService<NetworkHandle> {
    /// Start a node on the libp2p overlay, configuring tunnels with the
    /// system's `ip`/`wg`/`resolvectl`.
    pub fn start(config: NodeConfig) -> Result<Self> {
        let keypair = config.identity.load()?;
        let (handle, events) = start_network(keypair, config.network.clone())?;
        let controller: Arc<dyn InterfaceController> = Arc::new(LinuxController::new());
        Self::start_with(handle, events, controller, &config)
    }
}

impl<T: Overlay> NodeService<T> {
    /// Start every node task on an existing overlay.
    pub fn start_with(
        transport: T,
        events: DiscoveryEvents,
        controller: Arc<dyn InterfaceController>,
        config: &NodeConfig,
    ) -> Result<Self> {
        let registry = PeerRegistry::new();
        let mut tasks = Vec::new();

        let probes = transport.accept(PROBE_STREAM_PROTOCOL)?;
        tasks.push(tokio::spawn(serve_probes(probes)));

        let relay = RelayHandler::with_config(transport.clone(), config.relay.clone());
        let negotiations = transport.accept(NEGOTIATION_STREAM_PROTOCOL)?;
        tasks.push(tokio::spawn(relay.clone().serve(negotiations)));

        let prober = LatencyProber::new(transport.clone(), registry.clone())
            .with_timeout(config.probe_timeout);
        let discovery = DiscoveryService::new(
            transport.clone(),
            registry.clone(),
            prober,
            config.discovery.clone(),
        );
        let (local, global) = discovery.spawn(events);
        tasks.push(local);
        tasks.push(global);

        let configurator = Arc::new(TunnelConfigurator::new(controller, config.tunnel.clone()));
        let orchestrator = Arc::new(TunnelOrchestrator::new(
            transport.clone(),
            registry.clone(),
            configurator,
            config.orchestrator.clone(),
        ));

        info!(
            "Node {} started ({})",
            transport.local_peer_id(),
            if config.peer_only { "peer-only" } else { "gateway" }
        );

        Ok(Self {
            service: Arc::new(DaemonService::new(transport, registry, orchestrator, relay)),
            api_addr: (!config.peer_only).then_some(config.api_addr),
            tasks,
        })
    }

    pub fn service(&self) -> Arc<DaemonService<T>> {
        self.service.clone()
    }

    /// Run until `shutdown` resolves, then stop all node tasks. A gateway
    /// also removes its tunnel interface; peer-only nodes never own one and
    /// leave the host's interfaces alone.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let result = match self.api_addr {
            Some(addr) => api::serve(addr, self.service.clone(), shutdown).await,
            None => {
                shutdown.await;
                Ok(())
            }
        };

        info!("Shutting down");
        if self.api_addr.is_some() {
            let teardown = self.service.disconnect().await;
            debug!("{}", teardown.message);
        }
        for task in &self.tasks {
            task.abort();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use veilhop_core::DiscoveryOrigin;
    use veilhop_network::{DiscoveredPeer, MemoryNetwork, Multiaddr, PeerId};
    use veilhop_tunnel::{InterfaceOp, RecordingController};

    fn addr(host: u8) -> Multiaddr {
        format!("/ip4/10.3.0.{}/udp/4001/quic-v1", host).parse().unwrap()
    }

    fn test_config() -> NodeConfig {
        NodeConfig {
            peer_only: true,
            identity: IdentitySource::Ephemeral,
            probe_timeout: Duration::from_secs(1),
            ..NodeConfig::default()
        }
    }

    fn start(
        network: &MemoryNetwork,
        host: u8,
    ) -> (
        NodeService<veilhop_network::MemoryOverlay>,
        mpsc::UnboundedSender<DiscoveredPeer>,
        PeerId,
    ) {
        start_with_controller(network, host, RecordingController::new(), &test_config())
    }

    fn start_with_controller(
        network: &MemoryNetwork,
        host: u8,
        controller: RecordingController,
        config: &NodeConfig,
    ) -> (
        NodeService<veilhop_network::MemoryOverlay>,
        mpsc::UnboundedSender<DiscoveredPeer>,
        PeerId,
    ) {
        let peer = PeerId::random();
        let overlay = network.join(peer, addr(host));
        let (local_tx, local_rx) = mpsc::unbounded_channel();
        let (_global_tx, global_rx) = mpsc::unbounded_channel();
        let events = DiscoveryEvents {
            local: local_rx,
            global: global_rx,
        };
        let node = NodeService::start_with(overlay, events, Arc::new(controller), config).unwrap();
        (node, local_tx, peer)
    }

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert!(!config.peer_only);
        assert_eq!(config.api_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_ephemeral_identities_differ() {
        let a = IdentitySource::Ephemeral.load().unwrap();
        let b = IdentitySource::Ephemeral.load().unwrap();
        assert_ne!(a.public(), b.public());
    }

    #[tokio::test]
    async fn test_discovered_peer_gets_probed() {
        let network = MemoryNetwork::new();
        let (node_a, found_a, _) = start(&network, 1);
        let (_node_b, _found_b, peer_b) = start(&network, 2);

        found_a
            .send(DiscoveredPeer {
                peer_id: peer_b,
                addrs: vec![addr(2)],
                origin: DiscoveryOrigin::Local,
            })
            .unwrap();

        let service = node_a.service();
        let mut reachable = 0;
        for _ in 0..50 {
            reachable = service.status().await.reachable_peers;
            if reachable == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(reachable, 1);
    }

    #[tokio::test]
    async fn test_peer_only_run_stops_on_shutdown() {
        let network = MemoryNetwork::new();
        let (node, _found, _) = start(&network, 1);
        node.run(async {}).await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_only_shutdown_leaves_interfaces_alone() {
        let network = MemoryNetwork::new();
        let controller = RecordingController::new();
        let (node, _found, _) =
            start_with_controller(&network, 1, controller.clone(), &test_config());

        node.run(async {}).await.unwrap();
        assert!(controller.ops().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_shutdown_removes_tunnel() {
        let network = MemoryNetwork::new();
        let controller = RecordingController::new();
        let config = NodeConfig {
            peer_only: false,
            api_addr: (Ipv4Addr::LOCALHOST, 0).into(),
            ..test_config()
        };
        let (node, _found, _) = start_with_controller(&network, 1, controller.clone(), &config);

        node.run(async {}).await.unwrap();
        assert!(controller
            .ops()
            .iter()
            .any(|op| matches!(op, InterfaceOp::Delete { .. })));
    }
}
