//! Bootstrap node configuration
//!
//! Entry points into the public DHT used for global discovery.

use libp2p::{multiaddr::Protocol, Multiaddr, PeerId};

/// Default bootstrap nodes
///
/// Format: /ip4/<IP>/<transport>/<PORT>/p2p/<PEER_ID>
pub const DEFAULT_BOOTSTRAP_NODES: &[&str] = &[
    "/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ",
    "/ip4/104.131.131.82/udp/4001/quic-v1/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ",
];

/// Parse bootstrap nodes from the default list
pub fn default_bootstrap_peers() -> Vec<(PeerId, Multiaddr)> {
    let peers = parse_bootstrap_nodes(DEFAULT_BOOTSTRAP_NODES);
    if peers.is_empty() {
        tracing::warn!("No bootstrap nodes configured, global discovery disabled");
    }
    peers
}

/// Parse bootstrap nodes from a list of multiaddr strings, skipping
/// anything without a `/p2p/` component.
pub fn parse_bootstrap_nodes<S: AsRef<str>>(addrs: &[S]) -> Vec<(PeerId, Multiaddr)> {
    addrs
        .iter()
        .filter_map(|addr_str| {
            let parsed = parse_bootstrap_addr(addr_str.as_ref());
            if parsed.is_none() {
                tracing::warn!("Ignoring invalid bootstrap address: {}", addr_str.as_ref());
            }
            parsed
        })
        .collect()
}

/// Parse a single bootstrap address into the peer id and the dialable
/// address without its `/p2p/` suffix.
pub fn parse_bootstrap_addr(addr_str: &str) -> Option<(PeerId, Multiaddr)> {
    let addr: Multiaddr = addr_str.parse().ok()?;

    let peer_id = addr.iter().find_map(|proto| match proto {
        Protocol::P2p(peer_id) => Some(peer_id),
        _ => None,
    })?;

    let dial_addr: Multiaddr = addr
        .iter()
        .filter(|proto| !matches!(proto, Protocol::P2p(_)))
        .collect();

    Some((peer_id, dial_addr))
}
