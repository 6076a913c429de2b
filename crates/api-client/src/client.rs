//! Control API client implementation

use std::time::Duration;

use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::protocol::{ConnectRequest, ConnectResult, DisconnectResult, PeerEntry, StatusResult};
use crate::{ApiClientError, Result};

/// Longer than the daemon's own negotiation deadline so its answer wins.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Client for one gateway's control API
#[derive(Debug, Clone)]
pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
}

impl ApiClient {
    /// Create a client for the API at `base_url`, e.g. `http://127.0.0.1:8080`.
    ///
    /// No request is made until the first call.
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| ApiClientError::InvalidUrl(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ApiClientError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { base, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| ApiClientError::InvalidUrl(e.to_string()))
    }

    fn map_send_error(&self, e: reqwest::Error) -> ApiClientError {
        if e.is_connect() {
            ApiClientError::DaemonNotRunning(self.base.to_string())
        } else {
            ApiClientError::RequestFailed(e)
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiClientError::InvalidResponse(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        if !response.status().is_success() {
            return Err(ApiClientError::DaemonError {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Self::decode(response).await
    }

    /// Known peers and their latency
    pub async fn peers(&self) -> Result<Vec<PeerEntry>> {
        self.get("/api/peers").await
    }

    /// Node identity and the active session
    pub async fn status(&self) -> Result<StatusResult> {
        self.get("/api/status").await
    }

    /// Establish a tunnel through `hops` peers.
    ///
    /// A refused request comes back as [`ApiClientError::DaemonError`]
    /// carrying the daemon's message; HTTP 503 means too few reachable peers.
    pub async fn connect(&self, hops: i64) -> Result<ConnectResult> {
        let url = self.endpoint("/api/connect")?;
        debug!("POST {} (hops={})", url, hops);
        let response = self
            .http
            .post(url)
            .json(&ConnectRequest { hops })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let result: ConnectResult = Self::decode(response).await?;
        if !status.is_success() {
            return Err(ApiClientError::DaemonError {
                status: status.as_u16(),
                message: result.message,
            });
        }
        Ok(result)
    }

    /// Tear the tunnel down. Succeeds even when none was active.
    pub async fn disconnect(&self) -> Result<DisconnectResult> {
        let url = self.endpoint("/api/disconnect")?;
        debug!("POST {}", url);
        let response = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        if !response.status().is_success() {
            return Err(ApiClientError::DaemonError {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Self::decode(response).await
    }
}
