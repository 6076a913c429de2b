//! veilhop Network
//!
//! libp2p integration for the veilhop overlay.
//!
//! ## Features
//!
//! - Local discovery via mDNS
//! - Global discovery via Kademlia provider records
//! - NAT traversal (relay, DCUtR)
//! - Secure transport (Noise over TCP, QUIC)
//! - Raw streams for tunnel negotiation and latency probes
//! - Peer registry with per-peer latency

mod behaviour;
mod bootstrap;
mod discovery;
mod driver;
mod memory;
mod node;
mod peers;
mod probe;
mod protocol;
mod transport;

pub use behaviour::{
    global_discovery_key, identify_protocol_version, VeilhopBehaviour, VeilhopBehaviourEvent,
    KADEMLIA_PROTOCOL,
};
pub use bootstrap::{
    default_bootstrap_peers, parse_bootstrap_addr, parse_bootstrap_nodes, DEFAULT_BOOTSTRAP_NODES,
};
pub use discovery::{DiscoveredPeer, DiscoveryConfig, DiscoveryEvents, DiscoveryService};
pub use memory::{MemoryIncoming, MemoryNetwork, MemoryOverlay, MemoryStream};
pub use node::{build_swarm, start_network, NetworkConfig, NetworkError};
pub use peers::{PeerRecord, PeerRegistry};
pub use probe::{answer_probe, serve_probes, LatencyProber, DEFAULT_PROBE_TIMEOUT};
pub use protocol::{
    read_frame, read_request, read_response, write_frame, write_request, write_response,
    MAX_MESSAGE_SIZE, NEGOTIATION_STREAM_PROTOCOL, PROBE_MARKER, PROBE_STREAM_PROTOCOL,
};
pub use transport::{NetworkHandle, Overlay};

// Re-export commonly used libp2p types
pub use libp2p::{identity::Keypair, Multiaddr, PeerId, StreamProtocol};
