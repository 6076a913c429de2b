//! Integration tests for the libp2p-backed overlay
//!
//! Two real nodes on loopback TCP: connect, open a probe stream, and check
//! the connection table the driver maintains.

use std::time::Duration;

use tokio::time::timeout;

use veilhop_core::DiscoveryOrigin;
use veilhop_network::{
    serve_probes, start_network, Keypair, LatencyProber, NetworkConfig, NetworkHandle, Overlay,
    PeerRegistry, PROBE_STREAM_PROTOCOL,
};

fn loopback_config() -> NetworkConfig {
    NetworkConfig {
        listen_addrs: vec!["/ip4/127.0.0.1/tcp/0".parse().unwrap()],
        bootstrap_peers: Vec::new(),
        enable_mdns: false,
        idle_connection_timeout: Duration::from_secs(30),
    }
}

async fn start_node() -> NetworkHandle {
    let (handle, _events) = start_network(Keypair::generate_ed25519(), loopback_config()).unwrap();
    timeout(Duration::from_secs(5), async {
        while handle.listen_addrs().is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("node never started listening");
    handle
}

#[tokio::test]
async fn test_two_nodes_connect() {
    let a = start_node().await;
    let b = start_node().await;

    a.connect(b.local_peer_id(), b.listen_addrs()).await.unwrap();

    assert!(a.remote_address(&b.local_peer_id()).is_some());
    assert_eq!(a.connected_peers(), 1);

    // Already connected: returns immediately.
    a.connect(b.local_peer_id(), Vec::new()).await.unwrap();
}

#[tokio::test]
async fn test_dial_failure_is_reported() {
    let a = start_node().await;
    let missing = Keypair::generate_ed25519().public().to_peer_id();
    // Nothing listens on port 1.
    let addr = "/ip4/127.0.0.1/tcp/1".parse().unwrap();

    let result = timeout(Duration::from_secs(10), a.connect(missing, vec![addr]))
        .await
        .expect("dial result never arrived");
    assert!(result.is_err());
}

#[tokio::test]
async fn test_probe_over_libp2p() {
    let a = start_node().await;
    let b = start_node().await;
    tokio::spawn(serve_probes(b.accept(PROBE_STREAM_PROTOCOL).unwrap()));

    a.connect(b.local_peer_id(), b.listen_addrs()).await.unwrap();

    let registry = PeerRegistry::new();
    registry.merge(b.local_peer_id(), &b.listen_addrs(), DiscoveryOrigin::Local);
    let prober = LatencyProber::new(a.clone(), registry.clone());

    let latency = prober.probe(b.local_peer_id()).await;
    assert!(latency.is_reachable());
}

#[tokio::test]
async fn test_accept_twice_rejected() {
    let a = start_node().await;
    let _incoming = a.accept(PROBE_STREAM_PROTOCOL).unwrap();
    assert!(a.accept(PROBE_STREAM_PROTOCOL).is_err());
}

#[tokio::test]
async fn test_dial_without_address_uses_dht() {
    let a = start_node().await;
    let b = start_node().await;
    let c = start_node().await;

    // Only b knows where c is.
    b.connect(c.local_peer_id(), c.listen_addrs()).await.unwrap();
    a.connect(b.local_peer_id(), b.listen_addrs()).await.unwrap();

    let result = timeout(Duration::from_secs(20), a.connect(c.local_peer_id(), Vec::new()))
        .await
        .expect("lookup never finished");
    assert!(result.is_ok(), "dial via DHT lookup failed: {:?}", result);
    assert!(a.remote_address(&c.local_peer_id()).is_some());
}

#[tokio::test]
async fn test_dial_unknown_peer_without_address_fails() {
    let a = start_node().await;
    let b = start_node().await;
    a.connect(b.local_peer_id(), b.listen_addrs()).await.unwrap();

    let nobody = Keypair::generate_ed25519().public().to_peer_id();
    let result = timeout(Duration::from_secs(20), a.connect(nobody, Vec::new()))
        .await
        .expect("lookup never finished");
    assert!(result.is_err());
}
