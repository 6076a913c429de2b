//! Overlay abstraction
//!
//! `Overlay` is the narrow surface the relay, prober, discovery and client
//! need from the peer-to-peer network. `NetworkHandle` implements it on top of
//! the libp2p swarm; `MemoryOverlay` implements it in-process.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{AsyncRead, AsyncWrite, Stream};
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};

use crate::driver::SwarmCommand;
use crate::node::NetworkError;

/// Peer-to-peer overlay operations used by the rest of the node.
#[async_trait]
pub trait Overlay: Clone + Send + Sync + 'static {
    /// Bidirectional byte stream to a remote peer
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    /// Inbound streams for one protocol
    type Incoming: Stream<Item = (PeerId, Self::Stream)> + Unpin + Send + 'static;

    fn local_peer_id(&self) -> PeerId;

    /// Ensure a live connection to `peer`, dialing `addrs` if needed. With
    /// no address known at all the peer is looked up in the DHT first.
    async fn connect(&self, peer: PeerId, addrs: Vec<Multiaddr>) -> Result<(), NetworkError>;

    /// Open a new stream speaking `protocol` to `peer`.
    async fn open_stream(
        &self,
        peer: PeerId,
        protocol: StreamProtocol,
    ) -> Result<Self::Stream, NetworkError>;

    /// Register as the handler for inbound `protocol` streams. Only one
    /// registration per protocol is allowed.
    fn accept(&self, protocol: StreamProtocol) -> Result<Self::Incoming, NetworkError>;

    /// Remote address of the current connection to `peer`, if any.
    fn remote_address(&self, peer: &PeerId) -> Option<Multiaddr>;

    /// Addresses this node is reachable on.
    fn listen_addrs(&self) -> Vec<Multiaddr>;

    /// Kick off one global discovery cycle. Results arrive on the global
    /// discovery channel.
    async fn query_global(&self) -> Result<(), NetworkError>;
}

/// Cloneable handle onto the running swarm driver
#[derive(Clone)]
pub struct NetworkHandle {
    local_peer_id: PeerId,
    commands: mpsc::Sender<SwarmCommand>,
    control: libp2p_stream::Control,
    connections: Arc<RwLock<HashMap<PeerId, Multiaddr>>>,
    listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
}

impl NetworkHandle {
    pub(crate) fn new(
        local_peer_id: PeerId,
        commands: mpsc::Sender<SwarmCommand>,
        control: libp2p_stream::Control,
        connections: Arc<RwLock<HashMap<PeerId, Multiaddr>>>,
        listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
    ) -> Self {
        Self {
            local_peer_id,
            commands,
            control,
            connections,
            listen_addrs,
        }
    }

    /// Number of peers with at least one open connection
    pub fn connected_peers(&self) -> usize {
        self.connections.read().len()
    }
}

#[async_trait]
impl Overlay for NetworkHandle {
    type Stream = libp2p::Stream;
    type Incoming = libp2p_stream::IncomingStreams;

    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    async fn connect(&self, peer: PeerId, addrs: Vec<Multiaddr>) -> Result<(), NetworkError> {
        if self.connections.read().contains_key(&peer) {
            return Ok(());
        }

        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SwarmCommand::Dial { peer, addrs, reply })
            .await
            .map_err(|_| NetworkError::ChannelClosed)?;

        rx.await
            .map_err(|_| NetworkError::ChannelClosed)?
            .map_err(NetworkError::Dial)
    }

    async fn open_stream(
        &self,
        peer: PeerId,
        protocol: StreamProtocol,
    ) -> Result<Self::Stream, NetworkError> {
        let mut control = self.control.clone();
        control
            .open_stream(peer, protocol)
            .await
            .map_err(|e| NetworkError::OpenStream {
                peer,
                reason: e.to_string(),
            })
    }

    fn accept(&self, protocol: StreamProtocol) -> Result<Self::Incoming, NetworkError> {
        let mut control = self.control.clone();
        control
            .accept(protocol.clone())
            .map_err(|_| NetworkError::AlreadyRegistered(protocol.to_string()))
    }

    fn remote_address(&self, peer: &PeerId) -> Option<Multiaddr> {
        self.connections.read().get(peer).cloned()
    }

    fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.listen_addrs.read().clone()
    }

    async fn query_global(&self) -> Result<(), NetworkError> {
        self.commands
            .send(SwarmCommand::QueryGlobal)
            .await
            .map_err(|_| NetworkError::ChannelClosed)
    }
}
