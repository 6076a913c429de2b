//! Control API wire types

use serde::{Deserialize, Serialize};

/// Body of `POST /api/connect`
#[derive(Debug, Clone, Serialize)]
pub struct ConnectRequest {
    pub hops: i64,
}

/// One entry of `GET /api/peers`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerEntry {
    pub id: String,
    #[serde(default)]
    pub addrs: Vec<String>,
    pub latency_ms: u64,
}

impl PeerEntry {
    pub fn is_probed(&self) -> bool {
        self.latency_ms != 0
    }
}

/// Result of `POST /api/connect`, also the error body of a failed connect
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResult {
    pub status: String,
    #[serde(default)]
    pub message: String,
    pub entry_peer_id: Option<String>,
    pub seeker_public_key: Option<String>,
    pub exit_public_key: Option<String>,
    #[serde(default)]
    pub path: Vec<String>,
}

/// Result of `POST /api/disconnect`
#[derive(Debug, Clone, Deserialize)]
pub struct DisconnectResult {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatsResult {
    #[serde(default)]
    pub requests_forwarded: u64,
    #[serde(default)]
    pub requests_terminated: u64,
    #[serde(default)]
    pub requests_aborted: u64,
}

/// Result of `GET /api/status`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResult {
    pub peer_id: String,
    #[serde(default)]
    pub listen_addrs: Vec<String>,
    pub connected: bool,
    #[serde(default)]
    pub path: Vec<String>,
    pub entry_peer_id: Option<String>,
    pub exit_public_key: Option<String>,
    pub interface_name: Option<String>,
    #[serde(default)]
    pub known_peers: usize,
    #[serde(default)]
    pub reachable_peers: usize,
    #[serde(default)]
    pub relay: RelayStatsResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_result_success() {
        let json = r#"{
            "status": "success",
            "message": "Tunnel established through 2 hop(s)",
            "entryPeerId": "12D3KooWA",
            "seekerPublicKey": "c2Vla2Vy",
            "exitPublicKey": "ZXhpdA==",
            "path": ["12D3KooWA", "12D3KooWB"]
        }"#;
        let result: ConnectResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.entry_peer_id.as_deref(), Some("12D3KooWA"));
        assert_eq!(result.path.len(), 2);
    }

    #[test]
    fn test_connect_result_error_body() {
        let json = r#"{"status":"error","message":"Insufficient peers"}"#;
        let result: ConnectResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.status, "error");
        assert!(result.exit_public_key.is_none());
        assert!(result.path.is_empty());
    }

    #[test]
    fn test_peer_entry() {
        let json = r#"[{"id":"12D3KooWA","addrs":["/ip4/10.0.0.2/tcp/4001"],"latencyMs":0}]"#;
        let peers: Vec<PeerEntry> = serde_json::from_str(json).unwrap();
        assert!(!peers[0].is_probed());
    }

    #[test]
    fn test_status_tolerates_missing_counters() {
        let json = r#"{"peerId":"12D3KooWA","connected":false}"#;
        let status: StatusResult = serde_json::from_str(json).unwrap();
        assert!(!status.connected);
        assert_eq!(status.relay.requests_forwarded, 0);
    }

    #[test]
    fn test_connect_request_shape() {
        let body = serde_json::to_value(ConnectRequest { hops: 3 }).unwrap();
        assert_eq!(body, serde_json::json!({"hops": 3}));
    }
}
