//! veilhop API Client
//!
//! Typed client for the control API a gateway node serves over HTTP.
//!
//! ## Usage
//!
//! ```ignore
//! use veilhop_api_client::{ApiClient, DEFAULT_API_URL};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ApiClient::new(DEFAULT_API_URL)?;
//!
//!     let result = client.connect(2).await?;
//!     println!("Exit key: {:?}", result.exit_public_key);
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod protocol;

pub use client::ApiClient;
pub use protocol::{ConnectRequest, ConnectResult, DisconnectResult, PeerEntry, RelayStatsResult, StatusResult};

use thiserror::Error;

/// Where a gateway serves the API unless told otherwise
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

#[derive(Error, Debug)]
pub enum ApiClientError {
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("Daemon not running at {0}")]
    DaemonNotRunning(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Daemon error: {message} (HTTP {status})")]
    DaemonError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, ApiClientError>;
