//! In-memory interface controller
//!
//! Records every call instead of touching the host. Used by tests and for
//! running several nodes on one machine without root.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::controller::{InterfaceController, PeerConfig};
use crate::{Result, TunnelError};

/// One call made on a `RecordingController`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceOp {
    Create(String),
    SetPeer { name: String, peer: PeerConfig },
    Up(String),
    SetDns { name: String, servers: Vec<IpAddr> },
    Delete { name: String, existed: bool },
}

/// Which step a `RecordingController` should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Create,
    SetPeer,
    Up,
    SetDns,
}

#[derive(Default)]
struct State {
    interfaces: HashSet<String>,
    ops: Vec<InterfaceOp>,
    fail_at: Option<FailAt>,
}

#[derive(Clone, Default)]
pub struct RecordingController {
    state: Arc<Mutex<State>>,
}

impl RecordingController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the given step fail from now on.
    pub fn fail_at(&self, step: Option<FailAt>) {
        self.state.lock().fail_at = step;
    }

    pub fn ops(&self) -> Vec<InterfaceOp> {
        self.state.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.lock().ops.clear();
    }

    pub fn exists(&self, name: &str) -> bool {
        self.state.lock().interfaces.contains(name)
    }

    fn check(&self, step: FailAt) -> Result<()> {
        if self.state.lock().fail_at == Some(step) {
            return Err(TunnelError::Command {
                command: format!("{:?}", step),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl InterfaceController for RecordingController {
    async fn create(&self, name: &str) -> Result<()> {
        self.check(FailAt::Create)?;
        let mut state = self.state.lock();
        state.interfaces.insert(name.to_string());
        state.ops.push(InterfaceOp::Create(name.to_string()));
        Ok(())
    }

    async fn set_peer(&self, name: &str, _private_key: &str, peer: &PeerConfig) -> Result<()> {
        self.check(FailAt::SetPeer)?;
        self.state.lock().ops.push(InterfaceOp::SetPeer {
            name: name.to_string(),
            peer: peer.clone(),
        });
        Ok(())
    }

    async fn up(&self, name: &str) -> Result<()> {
        self.check(FailAt::Up)?;
        self.state.lock().ops.push(InterfaceOp::Up(name.to_string()));
        Ok(())
    }

    async fn set_dns(&self, name: &str, servers: &[IpAddr]) -> Result<()> {
        self.check(FailAt::SetDns)?;
        self.state.lock().ops.push(InterfaceOp::SetDns {
            name: name.to_string(),
            servers: servers.to_vec(),
        });
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock();
        let existed = state.interfaces.remove(name);
        state.ops.push(InterfaceOp::Delete {
            name: name.to_string(),
            existed,
        });
        Ok(existed)
    }
}
