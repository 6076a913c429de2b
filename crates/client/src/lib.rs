//! veilhop Client
//!
//! Outbound side of tunnel negotiation.
//!
//! ## Overview
//!
//! - Select the lowest-latency path of reachable peers
//! - Negotiate with the entry peer, which relays towards the exit
//! - Configure the local tunnel interface to the exit via the entry
//!
//! ## Example
//!
//! ```ignore
//! use veilhop_client::{OrchestratorConfig, TunnelOrchestrator};
//!
//! let orchestrator = TunnelOrchestrator::new(handle, registry, configurator, OrchestratorConfig::default());
//! let session = orchestrator.connect(2).await?;
//! println!("exit key: {}", session.exit_public_key);
//! orchestrator.disconnect().await;
//! ```

mod orchestrator;
mod path;
mod session;

pub use orchestrator::{OrchestratorConfig, TunnelOrchestrator};
pub use path::select_path;
pub use session::{NegotiatedSession, SessionInfo};

use std::time::Duration;

use thiserror::Error;
use veilhop_network::{NetworkError, PeerId};
use veilhop_tunnel::TunnelError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Insufficient peers: {available} reachable, {requested} required")]
    InsufficientPeers { available: usize, requested: usize },

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Negotiation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No transport address known for entry peer {0}")]
    NoEntryAddress(PeerId),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether the request failed before any negotiation for lack of peers
    pub fn is_insufficient_peers(&self) -> bool {
        matches!(self, ClientError::InsufficientPeers { .. })
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
