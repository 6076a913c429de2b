//! Tunnel negotiation messages
//!
//! A `TunnelRequest` travels from the client to the entry peer and is
//! re-derived (never mutated) at every relay hop. The `TunnelResponse` is
//! created once, by the node that receives an empty hop list, and is passed
//! back unchanged.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Request to build a tunnel through the remaining hops
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelRequest {
    /// Requester's ephemeral tunnel public key (base64)
    pub requester_public_key: String,
    /// Peer ids still to traverse, nearest first
    #[serde(default)]
    pub hops: Vec<String>,
}

impl TunnelRequest {
    pub fn new(requester_public_key: impl Into<String>, hops: Vec<String>) -> Self {
        Self {
            requester_public_key: requester_public_key.into(),
            hops,
        }
    }

    /// True when the receiving node is the exit
    pub fn is_terminal(&self) -> bool {
        self.hops.is_empty()
    }

    /// Split off the next hop.
    ///
    /// Returns the next peer id and the request to send it, which carries the
    /// same public key and one fewer hop. `None` for a terminal request.
    pub fn next_hop(&self) -> Option<(&str, TunnelRequest)> {
        let (next, rest) = self.hops.split_first()?;
        let forwarded = TunnelRequest {
            requester_public_key: self.requester_public_key.clone(),
            hops: rest.to_vec(),
        };
        Some((next.as_str(), forwarded))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Exit node's answer, relayed back verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelResponse {
    /// Exit node's ephemeral tunnel public key (base64)
    pub exit_public_key: String,
}

impl TunnelResponse {
    pub fn new(exit_public_key: impl Into<String>) -> Self {
        Self {
            exit_public_key: exit_public_key.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}
