//! Network behaviour for veilhop
//!
//! Combines Kademlia DHT, Identify, mDNS, relay/DCUtR for NAT traversal and
//! raw streams for the negotiation and probe protocols.

use libp2p::{
    dcutr, identify, kad, mdns, relay,
    swarm::{behaviour::toggle::Toggle, NetworkBehaviour},
    Multiaddr, PeerId, StreamProtocol,
};
use std::time::Duration;
use veilhop_core::{GLOBAL_DISCOVERY_TAG, LOCAL_DISCOVERY_TAG};

use crate::node::NetworkError;

/// Kademlia protocol name
///
/// The public libp2p DHT is used for global discovery, so the stock protocol
/// name is kept.
pub const KADEMLIA_PROTOCOL: StreamProtocol = StreamProtocol::new("/ipfs/kad/1.0.0");

/// DHT key every veilhop node provides and queries for global discovery
pub fn global_discovery_key() -> kad::RecordKey {
    kad::RecordKey::new(&GLOBAL_DISCOVERY_TAG)
}

/// Identify protocol version advertised to other peers
pub fn identify_protocol_version() -> String {
    format!("/{}/1.0.0", LOCAL_DISCOVERY_TAG)
}

/// Combined network behaviour for veilhop nodes
#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "VeilhopBehaviourEvent")]
pub struct VeilhopBehaviour {
    /// Kademlia DHT for global discovery
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    /// Identify protocol for peer info exchange
    pub identify: identify::Behaviour,
    /// mDNS for local network discovery, disabled with `enable_mdns = false`
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    /// Relay client for NAT traversal
    pub relay_client: relay::client::Behaviour,
    /// DCUtR for direct connection upgrade
    pub dcutr: dcutr::Behaviour,
    /// Raw streams for negotiation and probing
    pub stream: libp2p_stream::Behaviour,
}

/// Events emitted by veilhop behaviour
#[derive(Debug)]
pub enum VeilhopBehaviourEvent {
    Kademlia(kad::Event),
    Identify(identify::Event),
    Mdns(mdns::Event),
    RelayClient(relay::client::Event),
    Dcutr(dcutr::Event),
    Stream,
}

impl From<kad::Event> for VeilhopBehaviourEvent {
    fn from(e: kad::Event) -> Self {
        VeilhopBehaviourEvent::Kademlia(e)
    }
}

impl From<identify::Event> for VeilhopBehaviourEvent {
    fn from(e: identify::Event) -> Self {
        VeilhopBehaviourEvent::Identify(e)
    }
}

impl From<mdns::Event> for VeilhopBehaviourEvent {
    fn from(e: mdns::Event) -> Self {
        VeilhopBehaviourEvent::Mdns(e)
    }
}

impl From<relay::client::Event> for VeilhopBehaviourEvent {
    fn from(e: relay::client::Event) -> Self {
        VeilhopBehaviourEvent::RelayClient(e)
    }
}

impl From<dcutr::Event> for VeilhopBehaviourEvent {
    fn from(e: dcutr::Event) -> Self {
        VeilhopBehaviourEvent::Dcutr(e)
    }
}

impl From<()> for VeilhopBehaviourEvent {
    fn from(_: ()) -> Self {
        VeilhopBehaviourEvent::Stream
    }
}

impl VeilhopBehaviour {
    /// Create a new veilhop behaviour around the relay client handed out by
    /// the swarm builder.
    pub fn new(
        keypair: &libp2p::identity::Keypair,
        relay_client: relay::client::Behaviour,
        enable_mdns: bool,
    ) -> Result<Self, NetworkError> {
        let local_peer_id = PeerId::from(keypair.public());

        let mut kad_config = kad::Config::new(KADEMLIA_PROTOCOL);
        kad_config.set_query_timeout(Duration::from_secs(60));
        let store = kad::store::MemoryStore::new(local_peer_id);
        let mut kademlia = kad::Behaviour::with_config(local_peer_id, store, kad_config);
        // Server mode so that provider records for the global tag can be
        // stored on us as well.
        kademlia.set_mode(Some(kad::Mode::Server));

        let identify_config =
            identify::Config::new(identify_protocol_version(), keypair.public())
                .with_agent_version(format!("veilhop/{}", env!("CARGO_PKG_VERSION")));
        let identify = identify::Behaviour::new(identify_config);

        let mdns = if enable_mdns {
            let behaviour = mdns::tokio::Behaviour::new(mdns::Config::default(), local_peer_id)
                .map_err(|e| NetworkError::Transport(format!("mDNS: {}", e)))?;
            Some(behaviour)
        } else {
            None
        };

        Ok(Self {
            kademlia,
            identify,
            mdns: Toggle::from(mdns),
            relay_client,
            dcutr: dcutr::Behaviour::new(local_peer_id),
            stream: libp2p_stream::Behaviour::new(),
        })
    }

    /// Add a known peer address to Kademlia
    pub fn add_address(&mut self, peer_id: &PeerId, addr: Multiaddr) {
        self.kademlia.add_address(peer_id, addr);
    }

    /// Announce ourselves under the global discovery key
    pub fn start_providing(&mut self) -> Result<kad::QueryId, kad::store::Error> {
        self.kademlia.start_providing(global_discovery_key())
    }

    /// Look up every provider of the global discovery key
    pub fn get_providers(&mut self) -> kad::QueryId {
        self.kademlia.get_providers(global_discovery_key())
    }

    /// Ask the DHT for addresses of a peer we have none for
    pub fn find_peer(&mut self, peer_id: PeerId) -> kad::QueryId {
        self.kademlia.get_closest_peers(peer_id)
    }

    /// Bootstrap the Kademlia DHT
    pub fn bootstrap(&mut self) -> Result<kad::QueryId, kad::NoKnownPeers> {
        self.kademlia.bootstrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libp2p::identity::Keypair;

    #[test]
    fn test_global_key_uses_tag() {
        assert_eq!(global_discovery_key().as_ref(), GLOBAL_DISCOVERY_TAG.as_bytes());
    }

    #[test]
    fn test_identify_version_carries_local_tag() {
        assert_eq!(identify_protocol_version(), "/veilhop-local/1.0.0");
    }

    #[tokio::test]
    async fn test_behaviour_without_mdns() {
        let keypair = Keypair::generate_ed25519();
        let peer_id = PeerId::from(keypair.public());
        let (_transport, relay_client) = relay::client::new(peer_id);

        let behaviour = VeilhopBehaviour::new(&keypair, relay_client, false).unwrap();
        assert!(!behaviour.mdns.is_enabled());
    }

    #[tokio::test]
    async fn test_bootstrap_needs_known_peers() {
        let keypair = Keypair::generate_ed25519();
        let peer_id = PeerId::from(keypair.public());
        let (_transport, relay_client) = relay::client::new(peer_id);
        let mut behaviour = VeilhopBehaviour::new(&keypair, relay_client, false).unwrap();

        assert!(behaviour.bootstrap().is_err());

        let other = PeerId::random();
        let addr: Multiaddr = "/ip4/127.0.0.1/tcp/9000".parse().unwrap();
        behaviour.add_address(&other, addr);
        assert!(behaviour.bootstrap().is_ok());
    }
}
