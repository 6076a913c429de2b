//! Negotiated tunnel session

use std::time::SystemTime;

use veilhop_crypto::TunnelKeypair;
use veilhop_network::{Multiaddr, PeerId};
use veilhop_tunnel::ActiveInterface;

/// Client-side state of the one active tunnel
#[derive(Debug)]
pub struct NegotiatedSession {
    pub keypair: TunnelKeypair,
    /// Entry peer first, exit peer last
    pub path: Vec<PeerId>,
    /// Transport address the entry peer was reached on
    pub entry_address: Multiaddr,
    pub exit_public_key: String,
    pub interface: ActiveInterface,
    pub established_at: SystemTime,
}

impl NegotiatedSession {
    pub fn entry_peer(&self) -> PeerId {
        self.path[0]
    }

    pub fn exit_peer(&self) -> PeerId {
        self.path[self.path.len() - 1]
    }

    /// Summary without key material
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            entry_peer: self.entry_peer(),
            exit_peer: self.exit_peer(),
            path: self.path.clone(),
            entry_address: self.entry_address.clone(),
            seeker_public_key: self.keypair.public_key_base64(),
            exit_public_key: self.exit_public_key.clone(),
            interface_name: self.interface.name.clone(),
            dns_configured: self.interface.dns_configured,
            established_at: self.established_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub entry_peer: PeerId,
    pub exit_peer: PeerId,
    pub path: Vec<PeerId>,
    pub entry_address: Multiaddr,
    pub seeker_public_key: String,
    pub exit_public_key: String,
    pub interface_name: String,
    pub dns_configured: bool,
    pub established_at: SystemTime,
}
