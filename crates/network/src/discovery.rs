//! Peer discovery
//!
//! Two independent loops feed the registry: one reacting to local-network
//! announcements, one periodically querying the DHT. Every newly found peer
//! is connected to and then probed in its own task.

use std::time::Duration;

use libp2p::{Multiaddr, PeerId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use veilhop_core::DiscoveryOrigin;

use crate::peers::PeerRegistry;
use crate::probe::LatencyProber;
use crate::transport::Overlay;

/// A peer reported by mDNS or the DHT
#[derive(Debug, Clone)]
pub struct DiscoveredPeer {
    pub peer_id: PeerId,
    pub addrs: Vec<Multiaddr>,
    pub origin: DiscoveryOrigin,
}

/// Channels the swarm driver publishes discoveries on
#[derive(Debug)]
pub struct DiscoveryEvents {
    pub local: mpsc::UnboundedReceiver<DiscoveredPeer>,
    pub global: mpsc::UnboundedReceiver<DiscoveredPeer>,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Time between global discovery cycles
    pub global_interval: Duration,
    /// Time allowed to establish a connection to a discovered peer
    pub connect_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            global_interval: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Clone)]
pub struct DiscoveryService<T: Overlay> {
    transport: T,
    registry: PeerRegistry,
    prober: LatencyProber<T>,
    config: DiscoveryConfig,
}

impl<T: Overlay> DiscoveryService<T> {
    pub fn new(
        transport: T,
        registry: PeerRegistry,
        prober: LatencyProber<T>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            transport,
            registry,
            prober,
            config,
        }
    }

    /// Start both discovery loops. They run until their channel closes.
    pub fn spawn(self, events: DiscoveryEvents) -> (JoinHandle<()>, JoinHandle<()>) {
        let local = tokio::spawn(self.clone().run_local(events.local));
        let global = tokio::spawn(self.run_global(events.global));
        (local, global)
    }

    async fn run_local(self, mut found: mpsc::UnboundedReceiver<DiscoveredPeer>) {
        info!("Local discovery started");
        while let Some(peer) = found.recv().await {
            self.handle_found(peer);
        }
        debug!("Local discovery channel closed");
    }

    async fn run_global(self, mut found: mpsc::UnboundedReceiver<DiscoveredPeer>) {
        info!(
            "Global discovery started (every {:?})",
            self.config.global_interval
        );
        let mut ticker = tokio::time::interval(self.config.global_interval);
        loop {
            tokio::select! {
                biased;
                _ = ticker.tick() => {
                    if let Err(e) = self.transport.query_global().await {
                        warn!("Global discovery cycle failed: {}", e);
                    }
                }
                peer = found.recv() => match peer {
                    Some(peer) => {
                        self.handle_found(peer);
                    }
                    None => break,
                },
            }
        }
        debug!("Global discovery channel closed");
    }

    /// Record a discovered peer and, if it needs it, connect and probe in a
    /// background task.
    ///
    /// Returns the spawned task, or `None` if the peer was skipped.
    pub fn handle_found(&self, found: DiscoveredPeer) -> Option<JoinHandle<()>> {
        if found.peer_id == self.transport.local_peer_id() {
            return None;
        }

        let is_new = self
            .registry
            .merge(found.peer_id, &found.addrs, found.origin);
        if is_new {
            info!("Discovered {:?} peer {}", found.origin, found.peer_id);
        }

        // DHT results repeat every cycle; only new or unmeasured peers are
        // worth another connection attempt. Local announcements always are.
        let already_measured = self
            .registry
            .get(&found.peer_id)
            .is_some_and(|r| r.latency.is_reachable());
        if !is_new && found.origin == DiscoveryOrigin::Global && already_measured {
            return None;
        }

        let service = self.clone();
        Some(tokio::spawn(async move {
            service.connect_and_probe(found).await;
        }))
    }

    async fn connect_and_probe(&self, found: DiscoveredPeer) {
        let peer = found.peer_id;
        let connect = self.transport.connect(peer, found.addrs);
        match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("Could not connect to discovered peer {}: {}", peer, e);
                return;
            }
            Err(_) => {
                debug!("Connecting to discovered peer {} timed out", peer);
                return;
            }
        }

        if let Some(addr) = self.transport.remote_address(&peer) {
            self.registry.merge(peer, &[addr], found.origin);
        }

        let latency = self.prober.probe(peer).await;
        debug!("Peer {} latency {:?}", peer, latency);
    }
}
