//! Peer registry
//!
//! Thread-safe table of every peer discovered so far, with the latest latency
//! measurement for each. Readers always get snapshots, never live references.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use libp2p::{Multiaddr, PeerId};
use parking_lot::RwLock;
use veilhop_core::{DiscoveryOrigin, Latency};

/// What we know about one remote peer
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    /// Known addresses, deduplicated, in discovery order
    pub addrs: Vec<Multiaddr>,
    pub latency: Latency,
    /// How the peer was first found
    pub origin: DiscoveryOrigin,
    pub last_probed: Option<Instant>,
}

#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: Arc<RwLock<HashMap<PeerId, PeerRecord>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a peer or add addresses to an existing one.
    ///
    /// Returns `true` if the peer was not known before.
    pub fn merge(&self, peer_id: PeerId, addrs: &[Multiaddr], origin: DiscoveryOrigin) -> bool {
        let mut peers = self.peers.write();
        match peers.get_mut(&peer_id) {
            Some(record) => {
                for addr in addrs {
                    if !record.addrs.contains(addr) {
                        record.addrs.push(addr.clone());
                    }
                }
                false
            }
            None => {
                let mut unique = Vec::with_capacity(addrs.len());
                for addr in addrs {
                    if !unique.contains(addr) {
                        unique.push(addr.clone());
                    }
                }
                peers.insert(
                    peer_id,
                    PeerRecord {
                        peer_id,
                        addrs: unique,
                        latency: Latency::Unknown,
                        origin,
                        last_probed: None,
                    },
                );
                true
            }
        }
    }

    /// Store a probe result. Unknown peers are ignored.
    pub fn record_latency(&self, peer_id: &PeerId, latency: Latency) -> bool {
        match self.peers.write().get_mut(peer_id) {
            Some(record) => {
                record.latency = latency;
                record.last_probed = Some(Instant::now());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<PeerRecord> {
        self.peers.read().get(peer_id).cloned()
    }

    /// Copy of every record, ordered by peer id.
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        let mut records: Vec<PeerRecord> = self.peers.read().values().cloned().collect();
        records.sort_by_key(|r| r.peer_id.to_string());
        records
    }

    /// Peers with a measured latency, excluding `local`, in no particular
    /// order.
    pub fn reachable(&self, local: &PeerId) -> Vec<(PeerId, Duration)> {
        self.peers
            .read()
            .values()
            .filter(|r| &r.peer_id != local)
            .filter_map(|r| r.latency.measured().map(|rtt| (r.peer_id, rtt)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}
