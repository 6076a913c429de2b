//! veilhop Relay
//!
//! Relay logic for tunnel negotiation:
//! - Forward a request to the next hop with one hop removed
//! - Answer as the exit once no hops remain
//! - Abort silently on malformed input or downstream failure

mod handler;

pub use handler::{RelayConfig, RelayError, RelayHandler, RelayOutcome, RelayStats, Result};
