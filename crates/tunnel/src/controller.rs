//! OS interface controller
//!
//! `InterfaceController` is the boundary between the configurator and the
//! host's network configuration. `LinuxController` drives it through the
//! `ip`, `wg` and `resolvectl` tools.

use std::net::{IpAddr, SocketAddr};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::{Result, TunnelError};

/// The single peer entry configured on the tunnel interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    /// Remote public key (base64)
    pub public_key: String,
    pub endpoint: SocketAddr,
    /// CIDR ranges routed through the tunnel
    pub allowed_ips: Vec<String>,
}

/// Host network configuration for one tunnel interface
#[async_trait]
pub trait InterfaceController: Send + Sync + 'static {
    /// Create a new, down interface.
    async fn create(&self, name: &str) -> Result<()>;

    /// Install the local private key and the one remote peer.
    async fn set_peer(&self, name: &str, private_key: &str, peer: &PeerConfig) -> Result<()>;

    /// Bring the interface administratively up.
    async fn up(&self, name: &str) -> Result<()>;

    /// Route DNS resolution through the interface.
    async fn set_dns(&self, name: &str, servers: &[IpAddr]) -> Result<()>;

    /// Delete the interface. Returns `false` if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool>;
}

/// Controller for Linux hosts with the WireGuard kernel module
#[derive(Debug, Clone, Default)]
pub struct LinuxController;

impl LinuxController {
    pub fn new() -> Self {
        Self
    }

    async fn run(program: &str, args: &[&str], stdin: Option<&[u8]>) -> Result<Output> {
        debug!("Running {} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TunnelError::Spawn {
                program: program.to_string(),
                source: e,
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input).await?;
            pipe.shutdown().await?;
        }

        Ok(child.wait_with_output().await?)
    }

    async fn run_checked(program: &str, args: &[&str], stdin: Option<&[u8]>) -> Result<()> {
        let output = Self::run(program, args, stdin).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(TunnelError::Command {
                command: format!("{} {}", program, args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl InterfaceController for LinuxController {
    async fn create(&self, name: &str) -> Result<()> {
        Self::run_checked("ip", &["link", "add", "dev", name, "type", "wireguard"], None).await
    }

    async fn set_peer(&self, name: &str, private_key: &str, peer: &PeerConfig) -> Result<()> {
        let endpoint = peer.endpoint.to_string();
        let allowed_ips = peer.allowed_ips.join(",");
        // The private key goes through stdin so it never shows up in argv.
        Self::run_checked(
            "wg",
            &[
                "set",
                name,
                "private-key",
                "/dev/stdin",
                "peer",
                &peer.public_key,
                "allowed-ips",
                &allowed_ips,
                "endpoint",
                &endpoint,
            ],
            Some(private_key.as_bytes()),
        )
        .await
    }

    async fn up(&self, name: &str) -> Result<()> {
        Self::run_checked("ip", &["link", "set", "up", "dev", name], None).await
    }

    async fn set_dns(&self, name: &str, servers: &[IpAddr]) -> Result<()> {
        let servers: Vec<String> = servers.iter().map(|s| s.to_string()).collect();
        let mut args = vec!["dns", name];
        args.extend(servers.iter().map(String::as_str));
        Self::run_checked("resolvectl", &args, None).await?;
        Self::run_checked("resolvectl", &["domain", name, "~."], None).await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let output = Self::run("ip", &["link", "delete", "dev", name], None).await?;
        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("Cannot find device") || stderr.contains("does not exist") {
            Ok(false)
        } else {
            Err(TunnelError::Command {
                command: format!("ip link delete dev {}", name),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let result = LinuxController::run("veilhop-no-such-binary", &[], None).await;
        assert!(matches!(result, Err(TunnelError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdin_is_forwarded() {
        let output = LinuxController::run("cat", &[], Some(b"secret".as_slice())).await.unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, b"secret");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_command_carries_stderr() {
        let result =
            LinuxController::run_checked("sh", &["-c", "echo boom >&2; exit 3"], None).await;
        match result {
            Err(TunnelError::Command { stderr, .. }) => assert_eq!(stderr, "boom"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
