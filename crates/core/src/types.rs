use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Namespace advertised to peers found on the local network segment
pub const LOCAL_DISCOVERY_TAG: &str = "veilhop-local";

/// Rendezvous namespace peers advertise under in the global DHT
pub const GLOBAL_DISCOVERY_TAG: &str = "veilhop-global";

/// Stream protocol for tunnel negotiation
pub const NEGOTIATION_PROTOCOL: &str = "/veilhop/tunnel/1.0.0";

/// Stream protocol for latency probes
pub const PROBE_PROTOCOL: &str = "/veilhop/ping/1.0.0";

/// Milliseconds reported for a peer whose last probe failed
pub const UNREACHABLE_LATENCY_MS: u64 = 9999;

/// Where a peer was first learned from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryOrigin {
    /// Broadcast discovery on the local network segment
    Local,
    /// Provider lookup in the global DHT
    Global,
}

/// Last known round-trip latency to a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Latency {
    /// Discovered but never probed
    #[default]
    Unknown,
    /// Round trip of the most recent successful probe
    Measured(Duration),
    /// Most recent probe failed
    Unreachable,
}

impl Latency {
    /// Latency of a probe that completed in `elapsed`.
    ///
    /// Round trips at or beyond the sentinel collapse to `Unreachable` so a
    /// pathological measurement can never outrank the sentinel.
    pub fn from_elapsed(elapsed: Duration) -> Self {
        if elapsed.as_millis() >= UNREACHABLE_LATENCY_MS as u128 {
            Self::Unreachable
        } else {
            Self::Measured(elapsed)
        }
    }

    /// The measured round trip, if the peer is eligible for path selection
    pub fn measured(&self) -> Option<Duration> {
        match self {
            Self::Measured(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Measured(_))
    }

    /// Integer milliseconds as reported by the control API
    pub fn as_millis(&self) -> u64 {
        match self {
            Self::Unknown => 0,
            Self::Measured(d) => d.as_millis() as u64,
            Self::Unreachable => UNREACHABLE_LATENCY_MS,
        }
    }
}

/// Coerce a requested hop count into a usable path length (at least one peer)
pub fn normalize_hop_count(requested: i64) -> usize {
    if requested <= 0 {
        1
    } else {
        usize::try_from(requested).unwrap_or(usize::MAX)
    }
}
