//! veilhop Core
//!
//! Types shared by every veilhop crate: the negotiation wire messages,
//! peer latency values, and the protocol identifiers spoken on the overlay.

mod message;
mod types;

pub use message::{TunnelRequest, TunnelResponse};
pub use types::{
    normalize_hop_count, DiscoveryOrigin, Latency, LOCAL_DISCOVERY_TAG, GLOBAL_DISCOVERY_TAG,
    NEGOTIATION_PROTOCOL, PROBE_PROTOCOL, UNREACHABLE_LATENCY_MS,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VeilhopError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VeilhopError>;
