//! In-process overlay
//!
//! Lets several nodes share one process without sockets. Streams are tokio
//! duplex pipes adapted to the futures-io traits libp2p streams implement, so
//! code written against `Overlay` runs unchanged on either backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc;
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use parking_lot::Mutex;
use tokio::io::DuplexStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use crate::node::NetworkError;
use crate::protocol::MAX_MESSAGE_SIZE;
use crate::transport::Overlay;

pub type MemoryStream = Compat<DuplexStream>;
pub type MemoryIncoming = mpsc::UnboundedReceiver<(PeerId, MemoryStream)>;

struct MemoryNode {
    address: Multiaddr,
    reachable: bool,
    inboxes: HashMap<StreamProtocol, mpsc::UnboundedSender<(PeerId, MemoryStream)>>,
}

/// Shared switchboard every `MemoryOverlay` is attached to
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    nodes: Arc<Mutex<HashMap<PeerId, MemoryNode>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node reachable at `address`.
    pub fn join(&self, peer_id: PeerId, address: Multiaddr) -> MemoryOverlay {
        self.nodes.lock().insert(
            peer_id,
            MemoryNode {
                address,
                reachable: true,
                inboxes: HashMap::new(),
            },
        );
        MemoryOverlay {
            local_peer_id: peer_id,
            network: self.clone(),
            streams_opened: Arc::new(AtomicUsize::new(0)),
            global_queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make a node refuse (or accept again) connections and streams.
    pub fn set_reachable(&self, peer_id: &PeerId, reachable: bool) {
        if let Some(node) = self.nodes.lock().get_mut(peer_id) {
            node.reachable = reachable;
        }
    }
}

/// One node's view of a `MemoryNetwork`
#[derive(Clone)]
pub struct MemoryOverlay {
    local_peer_id: PeerId,
    network: MemoryNetwork,
    streams_opened: Arc<AtomicUsize>,
    global_queries: Arc<AtomicUsize>,
}

impl MemoryOverlay {
    /// Streams this node has opened so far
    pub fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }

    /// Global discovery cycles requested so far
    pub fn global_queries(&self) -> usize {
        self.global_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Overlay for MemoryOverlay {
    type Stream = MemoryStream;
    type Incoming = MemoryIncoming;

    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    async fn connect(&self, peer: PeerId, _addrs: Vec<Multiaddr>) -> Result<(), NetworkError> {
        match self.network.nodes.lock().get(&peer) {
            Some(node) if node.reachable => Ok(()),
            _ => Err(NetworkError::Dial(format!("{} unreachable", peer))),
        }
    }

    async fn open_stream(
        &self,
        peer: PeerId,
        protocol: StreamProtocol,
    ) -> Result<Self::Stream, NetworkError> {
        self.streams_opened.fetch_add(1, Ordering::SeqCst);

        let inbox = {
            let nodes = self.network.nodes.lock();
            let node = nodes
                .get(&peer)
                .filter(|node| node.reachable)
                .ok_or_else(|| NetworkError::OpenStream {
                    peer,
                    reason: "peer unreachable".to_string(),
                })?;
            node.inboxes
                .get(&protocol)
                .cloned()
                .ok_or_else(|| NetworkError::OpenStream {
                    peer,
                    reason: format!("protocol {} not supported", protocol),
                })?
        };

        let (local, remote) = tokio::io::duplex(MAX_MESSAGE_SIZE);
        inbox
            .unbounded_send((self.local_peer_id, remote.compat()))
            .map_err(|_| NetworkError::OpenStream {
                peer,
                reason: "listener gone".to_string(),
            })?;

        Ok(local.compat())
    }

    fn accept(&self, protocol: StreamProtocol) -> Result<Self::Incoming, NetworkError> {
        let mut nodes = self.network.nodes.lock();
        let node = nodes
            .get_mut(&self.local_peer_id)
            .ok_or(NetworkError::ChannelClosed)?;

        if node
            .inboxes
            .get(&protocol)
            .is_some_and(|tx| !tx.is_closed())
        {
            return Err(NetworkError::AlreadyRegistered(protocol.to_string()));
        }

        let (tx, rx) = mpsc::unbounded();
        node.inboxes.insert(protocol, tx);
        Ok(rx)
    }

    fn remote_address(&self, peer: &PeerId) -> Option<Multiaddr> {
        self.network
            .nodes
            .lock()
            .get(peer)
            .map(|node| node.address.clone())
    }

    fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.remote_address(&self.local_peer_id).into_iter().collect()
    }

    async fn query_global(&self) -> Result<(), NetworkError> {
        self.global_queries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{AsyncReadExt, AsyncWriteExt, StreamExt};

    fn addr(port: u16) -> Multiaddr {
        format!("/ip4/127.0.0.1/udp/{}/quic-v1", port).parse().unwrap()
    }

    #[tokio::test]
    async fn test_stream_round_trip() {
        let network = MemoryNetwork::new();
        let a = network.join(PeerId::random(), addr(1));
        let b_id = PeerId::random();
        let b = network.join(b_id, addr(2));
        let protocol = StreamProtocol::new("/test/1.0.0");

        let mut incoming = b.accept(protocol.clone()).unwrap();
        let mut outbound = a.open_stream(b_id, protocol).await.unwrap();
        outbound.write_all(b"hi").await.unwrap();

        let (from, mut inbound) = incoming.next().await.unwrap();
        assert_eq!(from, a.local_peer_id());
        let mut buf = [0u8; 2];
        inbound.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
        assert_eq!(a.streams_opened(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        let network = MemoryNetwork::new();
        let a = network.join(PeerId::random(), addr(1));
        let b_id = PeerId::random();
        let _b = network.join(b_id, addr(2));

        network.set_reachable(&b_id, false);
        assert!(a.connect(b_id, Vec::new()).await.is_err());
        assert!(a.connect(PeerId::random(), Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_unsupported_protocol() {
        let network = MemoryNetwork::new();
        let a = network.join(PeerId::random(), addr(1));
        let b_id = PeerId::random();
        let _b = network.join(b_id, addr(2));

        let result = a.open_stream(b_id, StreamProtocol::new("/none/1.0.0")).await;
        assert!(matches!(result, Err(NetworkError::OpenStream { .. })));
    }

    #[test]
    fn test_double_accept_rejected() {
        let network = MemoryNetwork::new();
        let a = network.join(PeerId::random(), addr(1));
        let protocol = StreamProtocol::new("/test/1.0.0");

        let _incoming = a.accept(protocol.clone()).unwrap();
        assert!(matches!(
            a.accept(protocol),
            Err(NetworkError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_remote_address() {
        let network = MemoryNetwork::new();
        let a = network.join(PeerId::random(), addr(1));
        let b_id = PeerId::random();
        let _b = network.join(b_id, addr(2));

        assert_eq!(a.remote_address(&b_id), Some(addr(2)));
        assert_eq!(a.remote_address(&PeerId::random()), None);
    }
}
