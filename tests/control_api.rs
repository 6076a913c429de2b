//! Control API over real HTTP
//!
//! A gateway serves the API on a loopback port and is driven through
//! `ApiClient`, the same client the CLI uses.

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use veilhop_api_client::{ApiClient, ApiClientError};
use veilhop_daemon::serve_listener;
use veilhop_integration_tests::{Cluster, TestNode};

struct Served {
    client: ApiClient,
    base: String,
    _shutdown: oneshot::Sender<()>,
}

async fn serve(gateway: &TestNode) -> Served {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (shutdown, stopped) = oneshot::channel::<()>();

    tokio::spawn(serve_listener(listener, gateway.service.clone(), async {
        let _ = stopped.await;
    }));

    Served {
        client: ApiClient::new(&base).unwrap(),
        base,
        _shutdown: shutdown,
    }
}

#[tokio::test]
async fn test_peers_and_status() {
    let mut cluster = Cluster::new();
    let gateway = cluster.gateway();
    let peer = cluster.peer();
    gateway.discover(&peer);
    assert!(gateway.wait_reachable(1).await);

    let api = serve(&gateway).await;

    let peers = api.client.peers().await.unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].id, peer.peer_id.to_string());
    assert_eq!(peers[0].addrs, vec![peer.address.to_string()]);
    assert!(peers[0].latency_ms < 9999);

    let status = api.client.status().await.unwrap();
    assert_eq!(status.peer_id, gateway.peer_id.to_string());
    assert_eq!(status.listen_addrs, vec![gateway.address.to_string()]);
    assert_eq!(status.known_peers, 1);
    assert_eq!(status.reachable_peers, 1);
    assert!(!status.connected);
}

#[tokio::test]
async fn test_connect_status_disconnect() {
    let mut cluster = Cluster::new();
    let gateway = cluster.gateway();
    let entry = cluster.peer();
    let exit = cluster.peer();
    gateway.set_latency(&entry, 4);
    gateway.set_latency(&exit, 8);

    let api = serve(&gateway).await;

    let result = api.client.connect(2).await.unwrap();
    assert_eq!(result.status, "success");
    assert_eq!(result.entry_peer_id, Some(entry.peer_id.to_string()));
    assert_eq!(
        result.path,
        vec![entry.peer_id.to_string(), exit.peer_id.to_string()]
    );

    let status = api.client.status().await.unwrap();
    assert!(status.connected);
    assert_eq!(status.exit_public_key, result.exit_public_key);
    assert_eq!(status.interface_name.as_deref(), Some("wg0"));

    api.client.disconnect().await.unwrap();
    let again = api.client.disconnect().await.unwrap();
    assert_eq!(again.status, "success");
    assert!(!api.client.status().await.unwrap().connected);
}

#[tokio::test]
async fn test_insufficient_peers_is_service_unavailable() {
    let mut cluster = Cluster::new();
    let gateway = cluster.gateway();
    let api = serve(&gateway).await;

    match api.client.connect(1).await {
        Err(ApiClientError::DaemonError { status, message }) => {
            assert_eq!(status, 503);
            assert!(message.contains("Insufficient peers"));
        }
        other => panic!("expected 503, got {:?}", other),
    }
    assert_eq!(gateway.overlay.streams_opened(), 0);
}

#[tokio::test]
async fn test_malformed_connect_body_means_one_hop() {
    let mut cluster = Cluster::new();
    let gateway = cluster.gateway();
    let first = cluster.peer();
    let second = cluster.peer();
    gateway.set_latency(&first, 4);
    gateway.set_latency(&second, 8);

    let api = serve(&gateway).await;
    let response = reqwest::Client::new()
        .post(format!("{}/api/connect", api.base))
        .body("hops=2")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["path"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let mut cluster = Cluster::new();
    let gateway = cluster.gateway();
    let api = serve(&gateway).await;

    let response = reqwest::Client::new()
        .get(format!("{}/api/status", api.base))
        .header("Origin", "http://dashboard.example")
        .send()
        .await
        .unwrap();

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
