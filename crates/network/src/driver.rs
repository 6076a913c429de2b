//! Swarm driver
//!
//! Single task that owns the swarm. Everything else talks to it through
//! `SwarmCommand`s and the shared connection table.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use libp2p::{
    identify, kad, mdns,
    swarm::{
        dial_opts::{DialOpts, PeerCondition},
        DialError, SwarmEvent,
    },
    Multiaddr, PeerId, Swarm,
};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use veilhop_core::DiscoveryOrigin;

use crate::behaviour::{VeilhopBehaviour, VeilhopBehaviourEvent};
use crate::discovery::DiscoveredPeer;

pub(crate) type DialReply = oneshot::Sender<Result<(), String>>;

/// Requests handled by the driver task
#[derive(Debug)]
pub(crate) enum SwarmCommand {
    /// Dial a peer; the reply fires once a connection exists or the dial failed
    Dial {
        peer: PeerId,
        addrs: Vec<Multiaddr>,
        reply: DialReply,
    },
    /// Run one global discovery cycle: bootstrap, provide, query providers
    QueryGlobal,
}

pub(crate) struct SwarmDriver {
    swarm: Swarm<VeilhopBehaviour>,
    commands: mpsc::Receiver<SwarmCommand>,
    local_tx: mpsc::UnboundedSender<DiscoveredPeer>,
    global_tx: mpsc::UnboundedSender<DiscoveredPeer>,
    connections: Arc<RwLock<HashMap<PeerId, Multiaddr>>>,
    listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
    pending_dials: HashMap<PeerId, Vec<DialReply>>,
    /// DHT lookups started for dials that had no address to try
    lookups: HashMap<kad::QueryId, PeerId>,
}

impl SwarmDriver {
    pub(crate) fn new(
        swarm: Swarm<VeilhopBehaviour>,
        commands: mpsc::Receiver<SwarmCommand>,
        local_tx: mpsc::UnboundedSender<DiscoveredPeer>,
        global_tx: mpsc::UnboundedSender<DiscoveredPeer>,
        connections: Arc<RwLock<HashMap<PeerId, Multiaddr>>>,
        listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
    ) -> Self {
        Self {
            swarm,
            commands,
            local_tx,
            global_tx,
            connections,
            listen_addrs,
            pending_dials: HashMap::new(),
            lookups: HashMap::new(),
        }
    }

    /// Run until every `NetworkHandle` has been dropped.
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All network handles dropped, stopping swarm driver");
                        break;
                    }
                },
                event = self.swarm.select_next_some() => self.handle_event(event),
            }
        }
    }

    fn handle_command(&mut self, command: SwarmCommand) {
        match command {
            SwarmCommand::Dial { peer, addrs, reply } => self.dial(peer, addrs, reply),
            SwarmCommand::QueryGlobal => self.query_global(),
        }
    }

    fn dial(&mut self, peer: PeerId, addrs: Vec<Multiaddr>, reply: DialReply) {
        if self.swarm.is_connected(&peer) {
            let _ = reply.send(Ok(()));
            return;
        }

        match self.start_dial(peer, addrs) {
            Ok(()) => self.pending_dials.entry(peer).or_default().push(reply),
            Err(DialError::NoAddresses) => {
                debug!("No address known for {}, looking it up in the DHT", peer);
                let query = self.swarm.behaviour_mut().find_peer(peer);
                self.lookups.insert(query, peer);
                self.pending_dials.entry(peer).or_default().push(reply);
            }
            Err(e) => {
                let _ = reply.send(Err(e.to_string()));
            }
        }
    }

    fn start_dial(&mut self, peer: PeerId, addrs: Vec<Multiaddr>) -> Result<(), DialError> {
        let opts = if addrs.is_empty() {
            DialOpts::peer_id(peer)
                .condition(PeerCondition::DisconnectedAndNotDialing)
                .build()
        } else {
            DialOpts::peer_id(peer)
                .condition(PeerCondition::DisconnectedAndNotDialing)
                .addresses(addrs)
                .extend_addresses_through_behaviour()
                .build()
        };

        match self.swarm.dial(opts) {
            // A dial to this peer is already in flight; piggyback on it.
            Err(DialError::DialPeerConditionFalse(_)) => Ok(()),
            other => other,
        }
    }

    /// Finish a dial that was waiting on a DHT lookup.
    fn finish_lookup(&mut self, peer: PeerId, found: Vec<kad::PeerInfo>) {
        let addrs: Vec<Multiaddr> = found
            .into_iter()
            .filter(|info| info.peer_id == peer)
            .flat_map(|info| info.addrs)
            .collect();

        if self.swarm.is_connected(&peer) {
            self.resolve_dial(&peer, Ok(()));
            return;
        }
        if addrs.is_empty() {
            debug!("DHT lookup found no address for {}", peer);
            self.resolve_dial(&peer, Err(format!("no address found for {}", peer)));
            return;
        }

        for addr in &addrs {
            self.swarm.behaviour_mut().add_address(&peer, addr.clone());
        }
        if let Err(e) = self.start_dial(peer, addrs) {
            self.resolve_dial(&peer, Err(e.to_string()));
        }
    }

    fn query_global(&mut self) {
        let behaviour = self.swarm.behaviour_mut();
        if let Err(e) = behaviour.bootstrap() {
            debug!("DHT bootstrap skipped: {:?}", e);
        }
        if let Err(e) = behaviour.start_providing() {
            warn!("Failed to announce under global discovery key: {}", e);
        }
        behaviour.get_providers();
    }

    fn resolve_dial(&mut self, peer: &PeerId, result: Result<(), String>) {
        if let Some(replies) = self.pending_dials.remove(peer) {
            for reply in replies {
                let _ = reply.send(result.clone());
            }
        }
    }

    fn handle_event(&mut self, event: SwarmEvent<VeilhopBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!("Listening on {}", address);
                self.listen_addrs.write().push(address);
            }
            SwarmEvent::ExpiredListenAddr { address, .. } => {
                self.listen_addrs.write().retain(|a| a != &address);
            }
            SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                debug!("Connected to peer: {}", peer_id);
                let remote = endpoint.get_remote_address().clone();
                if endpoint.is_dialer() {
                    self.swarm.behaviour_mut().add_address(&peer_id, remote.clone());
                }
                self.connections.write().insert(peer_id, remote);
                self.resolve_dial(&peer_id, Ok(()));
            }
            SwarmEvent::ConnectionClosed { peer_id, num_established, .. } => {
                if num_established == 0 {
                    debug!("Fully disconnected from peer: {}", peer_id);
                    self.connections.write().remove(&peer_id);
                }
            }
            SwarmEvent::OutgoingConnectionError { peer_id: Some(peer_id), error, .. } => {
                if !self.swarm.is_connected(&peer_id) {
                    debug!("Dial to {} failed: {}", peer_id, error);
                    self.resolve_dial(&peer_id, Err(error.to_string()));
                }
            }
            SwarmEvent::Behaviour(VeilhopBehaviourEvent::Mdns(mdns::Event::Discovered(list))) => {
                let mut grouped: HashMap<PeerId, Vec<Multiaddr>> = HashMap::new();
                for (peer_id, addr) in list {
                    grouped.entry(peer_id).or_default().push(addr);
                }
                for (peer_id, addrs) in grouped {
                    debug!("mDNS discovered {} ({} addrs)", peer_id, addrs.len());
                    for addr in &addrs {
                        self.swarm.behaviour_mut().add_address(&peer_id, addr.clone());
                    }
                    let _ = self.local_tx.send(DiscoveredPeer {
                        peer_id,
                        addrs,
                        origin: DiscoveryOrigin::Local,
                    });
                }
            }
            SwarmEvent::Behaviour(VeilhopBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                for addr in info.listen_addrs {
                    self.swarm.behaviour_mut().add_address(&peer_id, addr);
                }
            }
            SwarmEvent::Behaviour(VeilhopBehaviourEvent::Kademlia(
                kad::Event::OutboundQueryProgressed { id, result, .. },
            )) => self.handle_query_result(id, result),
            _ => {}
        }
    }

    fn handle_query_result(&mut self, id: kad::QueryId, result: kad::QueryResult) {
        let local_peer_id = *self.swarm.local_peer_id();
        match result {
            kad::QueryResult::GetProviders(Ok(kad::GetProvidersOk::FoundProviders {
                providers,
                ..
            })) => {
                for peer_id in providers {
                    if peer_id == local_peer_id {
                        continue;
                    }
                    debug!("DHT provider found: {}", peer_id);
                    let _ = self.global_tx.send(DiscoveredPeer {
                        peer_id,
                        addrs: Vec::new(),
                        origin: DiscoveryOrigin::Global,
                    });
                }
            }
            kad::QueryResult::GetClosestPeers(result) => {
                let Some(peer) = self.lookups.remove(&id) else {
                    return;
                };
                let found = match result {
                    Ok(ok) => ok.peers,
                    Err(kad::GetClosestPeersError::Timeout { peers, .. }) => peers,
                };
                self.finish_lookup(peer, found);
            }
            kad::QueryResult::GetProviders(Err(e)) => {
                debug!("Provider lookup failed: {:?}", e);
            }
            kad::QueryResult::StartProviding(Err(e)) => {
                warn!("Provider announcement failed: {:?}", e);
            }
            kad::QueryResult::Bootstrap(Err(e)) => {
                debug!("DHT bootstrap failed: {:?}", e);
            }
            _ => {}
        }
    }
}
