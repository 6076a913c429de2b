//! Path selection
//!
//! Picks the `k` lowest-latency reachable peers. All or nothing: fewer
//! candidates than requested hops is an error, never a shorter path.

use veilhop_network::{PeerId, PeerRegistry};

use crate::{ClientError, Result};

/// Select a path of exactly `hops` peers from the registry, lowest latency
/// first, excluding `local`. Ties are broken by peer id.
pub fn select_path(registry: &PeerRegistry, local: &PeerId, hops: usize) -> Result<Vec<PeerId>> {
    let mut candidates = registry.reachable(local);
    if candidates.len() < hops {
        return Err(ClientError::InsufficientPeers {
            available: candidates.len(),
            requested: hops,
        });
    }

    candidates.sort_by(|(a_id, a_rtt), (b_id, b_rtt)| {
        a_rtt
            .cmp(b_rtt)
            .then_with(|| a_id.to_bytes().cmp(&b_id.to_bytes()))
    });

    Ok(candidates.into_iter().take(hops).map(|(id, _)| id).collect())
}
