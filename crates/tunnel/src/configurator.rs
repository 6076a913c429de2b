//! Tunnel configurator
//!
//! Turns a negotiated session into the local tunnel interface and removes it
//! again on disconnect. Configure and teardown are serialised behind one
//! async mutex so concurrent API calls never interleave OS commands.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use libp2p::Multiaddr;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use veilhop_crypto::TunnelKeypair;

use crate::controller::{InterfaceController, PeerConfig};
use crate::endpoint::endpoint_from_multiaddr;
use crate::Result;

/// Tunnel interface configuration
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub interface_name: String,
    pub dns_servers: Vec<IpAddr>,
    pub allowed_ips: Vec<String>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            interface_name: "wg0".to_string(),
            dns_servers: vec![
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
                IpAddr::V4(Ipv4Addr::new(1, 0, 0, 1)),
            ],
            allowed_ips: vec!["0.0.0.0/0".to_string(), "::/0".to_string()],
        }
    }
}

/// The interface currently up on this node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveInterface {
    pub name: String,
    pub endpoint: SocketAddr,
    pub exit_public_key: String,
    pub dns_configured: bool,
}

pub struct TunnelConfigurator {
    controller: Arc<dyn InterfaceController>,
    config: TunnelConfig,
    active: Mutex<Option<ActiveInterface>>,
}

impl TunnelConfigurator {
    pub fn new(controller: Arc<dyn InterfaceController>, config: TunnelConfig) -> Self {
        Self {
            controller,
            config,
            active: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    pub async fn active(&self) -> Option<ActiveInterface> {
        self.active.lock().await.clone()
    }

    /// Replace any existing interface with one tunnelling to the exit peer
    /// through the entry peer at `entry_address`.
    ///
    /// A failure after the interface was created removes it again. DNS
    /// failures are logged and reported through
    /// `ActiveInterface::dns_configured` only.
    pub async fn configure(
        &self,
        keypair: &TunnelKeypair,
        exit_public_key: &str,
        entry_address: &Multiaddr,
    ) -> Result<ActiveInterface> {
        let mut active = self.active.lock().await;
        let name = self.config.interface_name.as_str();

        match self.controller.delete(name).await {
            Ok(true) => debug!("Removed stale interface {}", name),
            Ok(false) => {}
            Err(e) => debug!("Ignoring failure removing {}: {}", name, e),
        }
        *active = None;

        self.controller.create(name).await?;

        let interface = match self
            .bring_up(name, keypair, exit_public_key, entry_address)
            .await
        {
            Ok(interface) => interface,
            Err(e) => {
                warn!("Configuring {} failed, removing it: {}", name, e);
                if let Err(cleanup) = self.controller.delete(name).await {
                    warn!("Failed to remove {} after error: {}", name, cleanup);
                }
                return Err(e);
            }
        };

        info!(
            "Tunnel interface {} up, endpoint {}",
            interface.name, interface.endpoint
        );
        *active = Some(interface.clone());
        Ok(interface)
    }

    async fn bring_up(
        &self,
        name: &str,
        keypair: &TunnelKeypair,
        exit_public_key: &str,
        entry_address: &Multiaddr,
    ) -> Result<ActiveInterface> {
        let endpoint = endpoint_from_multiaddr(entry_address)?;
        let peer = PeerConfig {
            public_key: exit_public_key.to_string(),
            endpoint,
            allowed_ips: self.config.allowed_ips.clone(),
        };

        let private_key = keypair.private_key_base64();
        self.controller.set_peer(name, &private_key, &peer).await?;
        self.controller.up(name).await?;

        let dns_configured = match self.controller.set_dns(name, &self.config.dns_servers).await {
            Ok(()) => true,
            Err(e) => {
                warn!("DNS configuration for {} failed: {}", name, e);
                false
            }
        };

        Ok(ActiveInterface {
            name: name.to_string(),
            endpoint,
            exit_public_key: exit_public_key.to_string(),
            dns_configured,
        })
    }

    /// Remove the interface if present. Never fails; returns whether an
    /// interface was removed.
    pub async fn teardown(&self) -> bool {
        let mut active = self.active.lock().await;
        let name = self.config.interface_name.as_str();
        *active = None;

        match self.controller.delete(name).await {
            Ok(existed) => {
                if existed {
                    info!("Tunnel interface {} removed", name);
                }
                existed
            }
            Err(e) => {
                warn!("Removing {} failed: {}", name, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{FailAt, InterfaceOp, RecordingController};

    fn entry() -> Multiaddr {
        "/ip4/198.51.100.4/udp/4001/quic-v1".parse().unwrap()
    }

    fn configurator(controller: &RecordingController) -> TunnelConfigurator {
        TunnelConfigurator::new(Arc::new(controller.clone()), TunnelConfig::default())
    }

    #[tokio::test]
    async fn test_configure_sequence() {
        let controller = RecordingController::new();
        let tunnel = configurator(&controller);
        let keypair = TunnelKeypair::generate();
        let exit_key = TunnelKeypair::generate().public_key_base64();

        let active = tunnel.configure(&keypair, &exit_key, &entry()).await.unwrap();
        assert_eq!(active.endpoint, "198.51.100.4:4001".parse().unwrap());
        assert!(active.dns_configured);

        let ops = controller.ops();
        assert_eq!(
            ops[0],
            InterfaceOp::Delete {
                name: "wg0".to_string(),
                existed: false
            }
        );
        assert_eq!(ops[1], InterfaceOp::Create("wg0".to_string()));
        match &ops[2] {
            InterfaceOp::SetPeer { peer, .. } => {
                assert_eq!(peer.public_key, exit_key);
                assert_eq!(peer.allowed_ips, vec!["0.0.0.0/0", "::/0"]);
            }
            other => panic!("unexpected op: {:?}", other),
        }
        assert_eq!(ops[3], InterfaceOp::Up("wg0".to_string()));
        assert!(matches!(ops[4], InterfaceOp::SetDns { .. }));
        assert!(controller.exists("wg0"));
        assert_eq!(tunnel.active().await, Some(active));
    }

    #[tokio::test]
    async fn test_reconfigure_replaces_interface() {
        let controller = RecordingController::new();
        let tunnel = configurator(&controller);
        let keypair = TunnelKeypair::generate();
        let exit_key = TunnelKeypair::generate().public_key_base64();

        tunnel.configure(&keypair, &exit_key, &entry()).await.unwrap();
        controller.clear_ops();
        tunnel.configure(&keypair, &exit_key, &entry()).await.unwrap();

        assert_eq!(
            controller.ops()[0],
            InterfaceOp::Delete {
                name: "wg0".to_string(),
                existed: true
            }
        );
    }

    #[tokio::test]
    async fn test_failure_after_create_removes_interface() {
        let controller = RecordingController::new();
        controller.fail_at(Some(FailAt::Up));
        let tunnel = configurator(&controller);
        let keypair = TunnelKeypair::generate();

        let result = tunnel.configure(&keypair, "a2V5", &entry()).await;
        assert!(result.is_err());
        assert!(!controller.exists("wg0"));
        assert!(tunnel.active().await.is_none());
    }

    #[tokio::test]
    async fn test_bad_endpoint_removes_interface() {
        let controller = RecordingController::new();
        let tunnel = configurator(&controller);
        let keypair = TunnelKeypair::generate();
        let relayed: Multiaddr = "/dns4/relay.example/tcp/4001".parse().unwrap();

        assert!(tunnel.configure(&keypair, "a2V5", &relayed).await.is_err());
        assert!(!controller.exists("wg0"));
    }

    #[tokio::test]
    async fn test_dns_failure_is_not_fatal() {
        let controller = RecordingController::new();
        controller.fail_at(Some(FailAt::SetDns));
        let tunnel = configurator(&controller);
        let keypair = TunnelKeypair::generate();

        let active = tunnel.configure(&keypair, "a2V5", &entry()).await.unwrap();
        assert!(!active.dns_configured);
        assert!(controller.exists("wg0"));
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let controller = RecordingController::new();
        let tunnel = configurator(&controller);
        let keypair = TunnelKeypair::generate();
        tunnel.configure(&keypair, "a2V5", &entry()).await.unwrap();

        assert!(tunnel.teardown().await);
        assert!(!tunnel.teardown().await);
        assert!(tunnel.active().await.is_none());
    }
}
