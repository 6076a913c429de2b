//! veilhop Tunnel
//!
//! Materialises a negotiated session as a local WireGuard interface.
//!
//! ## Components
//!
//! - `InterfaceController`: host network configuration, replaceable per
//!   platform (`LinuxController`) or in tests (`RecordingController`)
//! - `TunnelConfigurator`: serialised configure/teardown of the one
//!   interface a node may have

mod configurator;
mod controller;
mod endpoint;
mod recording;

pub use configurator::{ActiveInterface, TunnelConfig, TunnelConfigurator};
pub use controller::{InterfaceController, LinuxController, PeerConfig};
pub use endpoint::endpoint_from_multiaddr;
pub use recording::{FailAt, InterfaceOp, RecordingController};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("No usable endpoint in {0}")]
    InvalidEndpoint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TunnelError>;
