//! veilhop Daemon
//!
//! Runs a veilhop node and, in gateway mode, the HTTP control API used by
//! the CLI and other frontends.
//!
//! ## Components
//!
//! - **NodeService**: wires identity, overlay, discovery, prober, relay and
//!   orchestrator together and owns their tasks
//! - **DaemonService**: the operations behind the control API
//! - **api**: axum router exposing `DaemonService` over HTTP
//!
//! ## Endpoints
//!
//! - `GET /api/peers` - Known peers with latency
//! - `POST /api/connect` - Establish a tunnel with `{ "hops": n }`
//! - `POST /api/disconnect` - Tear the tunnel down
//! - `GET /api/status` - Node identity and active session

pub mod api;
mod node;
mod service;

pub use api::{router, serve, serve_listener};
pub use node::{IdentitySource, NodeConfig, NodeService};
pub use service::{
    ConnectParams, ConnectResponse, DaemonService, DisconnectResponse, PeerInfo, StatusResponse,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Keystore error: {0}")]
    Keystore(#[from] veilhop_keystore::KeystoreError),

    #[error("Network error: {0}")]
    Network(#[from] veilhop_network::NetworkError),

    #[error("Client error: {0}")]
    Client(#[from] veilhop_client::ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
