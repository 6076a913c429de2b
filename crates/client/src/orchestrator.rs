//! Connection orchestrator
//!
//! Drives one connect request end to end: select a path, negotiate with the
//! entry peer under a single deadline, then hand the result to the tunnel
//! configurator. Nothing touches the network before a full path exists and
//! nothing touches the OS before negotiation succeeded.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use veilhop_core::{normalize_hop_count, TunnelRequest, TunnelResponse};
use veilhop_crypto::{parse_public_key, TunnelKeypair};
use veilhop_network::{
    read_response, write_request, Overlay, PeerId, PeerRegistry, NEGOTIATION_STREAM_PROTOCOL,
};
use veilhop_tunnel::TunnelConfigurator;

use crate::path::select_path;
use crate::session::{NegotiatedSession, SessionInfo};
use crate::{ClientError, Result};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline for the whole negotiation, entry to exit and back
    pub negotiation_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout: Duration::from_secs(60),
        }
    }
}

pub struct TunnelOrchestrator<T: Overlay> {
    transport: T,
    registry: PeerRegistry,
    configurator: Arc<TunnelConfigurator>,
    config: OrchestratorConfig,
    session: Mutex<Option<NegotiatedSession>>,
}

impl<T: Overlay> TunnelOrchestrator<T> {
    pub fn new(
        transport: T,
        registry: PeerRegistry,
        configurator: Arc<TunnelConfigurator>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            transport,
            registry,
            configurator,
            config,
            session: Mutex::new(None),
        }
    }

    /// Establish a tunnel through `requested_hops` peers (values below 1
    /// mean 1). Replaces the current session on success.
    pub async fn connect(&self, requested_hops: i64) -> Result<SessionInfo> {
        let hops = normalize_hop_count(requested_hops);
        let path = select_path(&self.registry, &self.transport.local_peer_id(), hops)?;
        let entry = path[0];
        info!("Negotiating {}-hop tunnel via entry {}", hops, entry);

        let keypair = TunnelKeypair::generate();
        let request = TunnelRequest::new(
            keypair.public_key_base64(),
            path[1..].iter().map(|p| p.to_string()).collect(),
        );

        let response = tokio::time::timeout(
            self.config.negotiation_timeout,
            self.negotiate(entry, &request),
        )
        .await
        .map_err(|_| ClientError::Timeout(self.config.negotiation_timeout))??;

        parse_public_key(&response.exit_public_key)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        let entry_address = self
            .transport
            .remote_address(&entry)
            .or_else(|| {
                self.registry
                    .get(&entry)
                    .and_then(|record| record.addrs.first().cloned())
            })
            .ok_or(ClientError::NoEntryAddress(entry))?;
        debug!("Entry {} reached at {}", entry, entry_address);

        // The stored session must always describe the interface that is up.
        let mut current = self.session.lock().await;
        let interface = match self
            .configurator
            .configure(&keypair, &response.exit_public_key, &entry_address)
            .await
        {
            Ok(interface) => interface,
            Err(e) => {
                // configure removed any previous interface before failing
                if let Some(previous) = current.take() {
                    warn!("Previous tunnel via {} is gone", previous.entry_peer());
                }
                return Err(e.into());
            }
        };

        let session = NegotiatedSession {
            keypair,
            path,
            entry_address,
            exit_public_key: response.exit_public_key,
            interface,
            established_at: SystemTime::now(),
        };
        let info = session.info();
        *current = Some(session);
        drop(current);

        info!(
            "Tunnel established: entry {} exit {}",
            info.entry_peer, info.exit_peer
        );
        Ok(info)
    }

    async fn negotiate(&self, entry: PeerId, request: &TunnelRequest) -> Result<TunnelResponse> {
        let addrs = self
            .registry
            .get(&entry)
            .map(|record| record.addrs)
            .unwrap_or_default();
        self.transport.connect(entry, addrs).await?;

        let mut stream = self
            .transport
            .open_stream(entry, NEGOTIATION_STREAM_PROTOCOL)
            .await?;
        write_request(&mut stream, request).await?;
        let response = read_response(&mut stream)
            .await
            .map_err(|e| ClientError::Negotiation(e.to_string()))?;
        let _ = stream.close().await;
        Ok(response)
    }

    /// Tear down the active tunnel, if any. Always succeeds; returns whether
    /// an interface was removed.
    pub async fn disconnect(&self) -> bool {
        let mut current = self.session.lock().await;
        let previous = current.take();
        if let Some(session) = &previous {
            info!("Disconnecting tunnel via {}", session.entry_peer());
        }

        let removed = self.configurator.teardown().await;
        drop(current);
        if previous.is_some() && !removed {
            warn!("Session was active but no interface was found");
        }
        removed
    }

    pub async fn session(&self) -> Option<SessionInfo> {
        self.session.lock().await.as_ref().map(NegotiatedSession::info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veilhop_core::{DiscoveryOrigin, Latency};
    use veilhop_network::{MemoryNetwork, MemoryOverlay, Multiaddr};
    use veilhop_relay::RelayHandler;
    use veilhop_tunnel::{FailAt, InterfaceOp, RecordingController, TunnelConfig};

    fn addr(port: u16) -> Multiaddr {
        format!("/ip4/10.0.0.{}/udp/4001/quic-v1", port).parse().unwrap()
    }

    struct Harness {
        network: MemoryNetwork,
        client: MemoryOverlay,
        registry: PeerRegistry,
        controller: RecordingController,
    }

    impl Harness {
        fn new() -> Self {
            let network = MemoryNetwork::new();
            let client = network.join(PeerId::random(), addr(1));
            Self {
                network,
                client,
                registry: PeerRegistry::new(),
                controller: RecordingController::new(),
            }
        }

        /// Add a relaying peer with the given measured latency.
        fn relay(&self, port: u16, latency_ms: u64) -> PeerId {
            let peer = PeerId::random();
            let node = self.network.join(peer, addr(port));
            let incoming = node.accept(NEGOTIATION_STREAM_PROTOCOL).unwrap();
            tokio::spawn(RelayHandler::new(node).serve(incoming));

            self.registry.merge(peer, &[addr(port)], DiscoveryOrigin::Local);
            self.registry
                .record_latency(&peer, Latency::Measured(Duration::from_millis(latency_ms)));
            peer
        }

        fn orchestrator(&self, timeout: Duration) -> TunnelOrchestrator<MemoryOverlay> {
            let configurator = Arc::new(TunnelConfigurator::new(
                Arc::new(self.controller.clone()),
                TunnelConfig::default(),
            ));
            TunnelOrchestrator::new(
                self.client.clone(),
                self.registry.clone(),
                configurator,
                OrchestratorConfig {
                    negotiation_timeout: timeout,
                },
            )
        }
    }

    #[tokio::test]
    async fn test_single_hop() {
        let harness = Harness::new();
        let peer = harness.relay(2, 10);
        let orchestrator = harness.orchestrator(Duration::from_secs(5));

        let info = orchestrator.connect(1).await.unwrap();
        assert_eq!(info.path, vec![peer]);
        assert_eq!(info.entry_peer, info.exit_peer);
        assert_eq!(info.entry_address, addr(2));
        assert!(harness.controller.exists("wg0"));
        assert_eq!(orchestrator.session().await, Some(info));
    }

    #[tokio::test]
    async fn test_non_positive_hops_means_one() {
        let harness = Harness::new();
        harness.relay(2, 10);
        let orchestrator = harness.orchestrator(Duration::from_secs(5));

        assert_eq!(orchestrator.connect(0).await.unwrap().path.len(), 1);
        assert_eq!(orchestrator.connect(-3).await.unwrap().path.len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_peers_has_no_side_effects() {
        let harness = Harness::new();
        let orchestrator = harness.orchestrator(Duration::from_secs(5));

        let err = orchestrator.connect(1).await.unwrap_err();
        assert!(err.is_insufficient_peers());
        assert_eq!(harness.client.streams_opened(), 0);
        assert!(harness.controller.ops().is_empty());
    }

    #[tokio::test]
    async fn test_exit_key_configured_on_interface() {
        let harness = Harness::new();
        harness.relay(2, 5);
        harness.relay(3, 15);
        let orchestrator = harness.orchestrator(Duration::from_secs(5));

        let info = orchestrator.connect(2).await.unwrap();
        let peer_op = harness
            .controller
            .ops()
            .into_iter()
            .find_map(|op| match op {
                InterfaceOp::SetPeer { peer, .. } => Some(peer),
                _ => None,
            })
            .unwrap();
        assert_eq!(peer_op.public_key, info.exit_public_key);
        assert_eq!(peer_op.endpoint, "10.0.0.2:4001".parse().unwrap());
    }

    #[tokio::test]
    async fn test_silent_entry_times_out_without_interface() {
        let harness = Harness::new();
        let silent = PeerId::random();
        let node = harness.network.join(silent, addr(9));
        let _incoming = node.accept(NEGOTIATION_STREAM_PROTOCOL).unwrap();
        harness.registry.merge(silent, &[], DiscoveryOrigin::Local);
        harness
            .registry
            .record_latency(&silent, Latency::Measured(Duration::from_millis(1)));
        let orchestrator = harness.orchestrator(Duration::from_millis(100));

        let err = orchestrator.connect(1).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)));
        assert!(harness.controller.ops().is_empty());
        assert!(orchestrator.session().await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let harness = Harness::new();
        harness.relay(2, 10);
        let orchestrator = harness.orchestrator(Duration::from_secs(5));
        orchestrator.connect(1).await.unwrap();

        assert!(orchestrator.disconnect().await);
        assert!(!orchestrator.disconnect().await);
        assert!(orchestrator.session().await.is_none());
        assert!(!harness.controller.exists("wg0"));
    }

    #[tokio::test]
    async fn test_failed_reconnect_clears_session() {
        let harness = Harness::new();
        harness.relay(2, 10);
        let orchestrator = harness.orchestrator(Duration::from_secs(5));
        orchestrator.connect(1).await.unwrap();

        harness.controller.fail_at(Some(FailAt::SetPeer));
        assert!(orchestrator.connect(1).await.is_err());

        assert!(!harness.controller.exists("wg0"));
        assert!(orchestrator.session().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_connects_and_disconnect_stay_consistent() {
        let harness = Harness::new();
        harness.relay(2, 10);
        harness.relay(3, 20);
        let orchestrator = harness.orchestrator(Duration::from_secs(5));

        for _ in 0..10 {
            let (a, b, _) = tokio::join!(
                orchestrator.connect(1),
                orchestrator.connect(2),
                orchestrator.disconnect()
            );
            a.unwrap();
            b.unwrap();

            let mut up = false;
            for op in harness.controller.ops() {
                match op {
                    InterfaceOp::Create(_) => {
                        assert!(!up, "interface created twice without a delete");
                        up = true;
                    }
                    InterfaceOp::Delete { .. } => up = false,
                    _ => {}
                }
            }

            let session = orchestrator.session().await;
            assert_eq!(session.is_some(), harness.controller.exists("wg0"));

            if let Some(session) = session {
                let last_peer = harness
                    .controller
                    .ops()
                    .into_iter()
                    .rev()
                    .find_map(|op| match op {
                        InterfaceOp::SetPeer { peer, .. } => Some(peer),
                        _ => None,
                    })
                    .unwrap();
                assert_eq!(last_peer.public_key, session.exit_public_key);
            }
        }
    }
}
