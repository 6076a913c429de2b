//! Daemon service implementation
//!
//! The operations exposed by the control API. Every response type here is
//! what goes on the wire, so field names are camelCase.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use veilhop_client::{SessionInfo, TunnelOrchestrator};
use veilhop_network::{Overlay, PeerRecord, PeerRegistry};
use veilhop_relay::{RelayHandler, RelayStats};

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

/// One entry of `GET /api/peers`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub id: String,
    pub addrs: Vec<String>,
    /// 0 while unprobed, 9999 when unreachable
    pub latency_ms: u64,
}

impl From<&PeerRecord> for PeerInfo {
    fn from(record: &PeerRecord) -> Self {
        Self {
            id: record.peer_id.to_string(),
            addrs: record.addrs.iter().map(|a| a.to_string()).collect(),
            latency_ms: record.latency.as_millis(),
        }
    }
}

/// Body of `POST /api/connect`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub hops: Option<i64>,
}

impl ConnectParams {
    /// Parse a request body. Anything unparsable means one hop.
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    pub fn hops(&self) -> i64 {
        self.hops.unwrap_or(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_peer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeker_public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
}

impl ConnectResponse {
    pub fn success(session: &SessionInfo) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            message: format!("Tunnel established through {} hop(s)", session.path.len()),
            entry_peer_id: Some(session.entry_peer.to_string()),
            seeker_public_key: Some(session.seeker_public_key.clone()),
            exit_public_key: Some(session.exit_public_key.clone()),
            path: session.path.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            message: message.into(),
            entry_peer_id: None,
            seeker_public_key: None,
            exit_public_key: None,
            path: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatsResponse {
    pub requests_forwarded: u64,
    pub requests_terminated: u64,
    pub requests_aborted: u64,
}

impl From<RelayStats> for RelayStatsResponse {
    fn from(s: RelayStats) -> Self {
        Self {
            requests_forwarded: s.requests_forwarded,
            requests_terminated: s.requests_terminated,
            requests_aborted: s.requests_aborted,
        }
    }
}

/// Body of `GET /api/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub peer_id: String,
    pub listen_addrs: Vec<String>,
    pub connected: bool,
    pub path: Vec<String>,
    pub entry_peer_id: Option<String>,
    pub exit_public_key: Option<String>,
    pub interface_name: Option<String>,
    pub known_peers: usize,
    pub reachable_peers: usize,
    pub relay: RelayStatsResponse,
}

/// Node operations behind the control API
pub struct DaemonService<T: Overlay> {
    transport: T,
    registry: PeerRegistry,
    orchestrator: Arc<TunnelOrchestrator<T>>,
    relay: RelayHandler<T>,
}

impl<T: Overlay> DaemonService<T> {
    pub fn new(
        transport: T,
        registry: PeerRegistry,
        orchestrator: Arc<TunnelOrchestrator<T>>,
        relay: RelayHandler<T>,
    ) -> Self {
        Self {
            transport,
            registry,
            orchestrator,
            relay,
        }
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn relay_stats(&self) -> RelayStats {
        self.relay.stats()
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.registry.snapshot().iter().map(PeerInfo::from).collect()
    }

    pub async fn connect(&self, params: ConnectParams) -> veilhop_client::Result<ConnectResponse> {
        let hops = params.hops();
        debug!("Connect requested with {} hop(s)", hops);

        match self.orchestrator.connect(hops).await {
            Ok(session) => Ok(ConnectResponse::success(&session)),
            Err(e) => {
                warn!("Connect failed: {}", e);
                Err(e)
            }
        }
    }

    pub async fn disconnect(&self) -> DisconnectResponse {
        let removed = self.orchestrator.disconnect().await;
        let message = if removed {
            info!("Tunnel disconnected");
            "Tunnel interface removed"
        } else {
            "No tunnel was active"
        };
        DisconnectResponse {
            status: STATUS_SUCCESS.to_string(),
            message: message.to_string(),
        }
    }

    pub async fn status(&self) -> StatusResponse {
        let local = self.transport.local_peer_id();
        let session = self.orchestrator.session().await;

        StatusResponse {
            peer_id: local.to_string(),
            listen_addrs: self
                .transport
                .listen_addrs()
                .iter()
                .map(|a| a.to_string())
                .collect(),
            connected: session.is_some(),
            path: session
                .as_ref()
                .map(|s| s.path.iter().map(|p| p.to_string()).collect())
                .unwrap_or_default(),
            entry_peer_id: session.as_ref().map(|s| s.entry_peer.to_string()),
            exit_public_key: session.as_ref().map(|s| s.exit_public_key.clone()),
            interface_name: session.as_ref().map(|s| s.interface_name.clone()),
            known_peers: self.registry.len(),
            reachable_peers: self.registry.reachable(&local).len(),
            relay: self.relay.stats().into(),
        }
    }
}
