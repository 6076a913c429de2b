//! Relay negotiation handler
//!
//! Handles one inbound negotiation stream. A request with remaining hops is
//! forwarded to the next hop with the head of the list removed and the
//! downstream response is passed back unchanged; a request with no hops left
//! makes this node the exit, which answers with a fresh tunnel public key.
//!
//! Any failure aborts the stream without a reply. The upstream peer sees the
//! stream close and its own deadline decides what happens next.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures::{AsyncRead, AsyncWrite, AsyncWriteExt, StreamExt};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};
use veilhop_core::{TunnelRequest, TunnelResponse};
use veilhop_crypto::TunnelKeypair;
use veilhop_network::{
    read_request, read_response, write_request, write_response, NetworkError, Overlay, PeerId,
    NEGOTIATION_STREAM_PROTOCOL,
};

#[derive(Error, Debug)]
pub enum RelayError {
    /// The inbound stream did not carry a valid request
    #[error("Malformed request: {0}")]
    Decode(io::Error),

    /// Hop list entry is not a peer id
    #[error("Invalid next hop: {0}")]
    InvalidHop(String),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Next hop {0} did not answer in time")]
    HopTimeout(PeerId),

    #[error("Stream error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upper bound on dialing, writing to and reading from the next hop
    pub hop_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            hop_timeout: Duration::from_secs(30),
        }
    }
}

/// What the handler did with a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Passed on to `next_hop`, which received `hops_remaining` further hops
    Forwarded {
        next_hop: PeerId,
        hops_remaining: usize,
    },
    /// Answered as the exit
    Terminated { exit_public_key: String },
}

/// Relay statistics
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    pub requests_forwarded: u64,
    pub requests_terminated: u64,
    pub requests_aborted: u64,
}

/// Relay handler for negotiation streams
#[derive(Clone)]
pub struct RelayHandler<T: Overlay> {
    transport: T,
    config: RelayConfig,
    stats: Arc<RwLock<RelayStats>>,
}

impl<T: Overlay> RelayHandler<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, RelayConfig::default())
    }

    pub fn with_config(transport: T, config: RelayConfig) -> Self {
        Self {
            transport,
            config,
            stats: Arc::new(RwLock::new(RelayStats::default())),
        }
    }

    pub fn stats(&self) -> RelayStats {
        self.stats.read().clone()
    }

    /// Handle every inbound negotiation stream, each in its own task, until
    /// the listener is dropped.
    pub async fn serve(self, mut incoming: T::Incoming) {
        info!("Relay handler listening for negotiation streams");
        while let Some((peer, stream)) = incoming.next().await {
            let handler = self.clone();
            tokio::spawn(async move {
                if let Err(e) = handler.handle_stream(peer, stream).await {
                    debug!("Negotiation from {} aborted: {}", peer, e);
                }
            });
        }
    }

    /// Process one inbound negotiation stream from `from`.
    pub async fn handle_stream(&self, from: PeerId, mut stream: T::Stream) -> Result<RelayOutcome> {
        let result = self.process(from, &mut stream).await;
        match &result {
            Ok(_) => {
                let _ = stream.close().await;
            }
            Err(_) => {
                self.stats.write().requests_aborted += 1;
            }
        }
        result
    }

    async fn process(&self, from: PeerId, stream: &mut T::Stream) -> Result<RelayOutcome> {
        let request = read_request(stream).await.map_err(RelayError::Decode)?;

        match request.next_hop() {
            Some((next, forwarded)) => {
                let next_hop: PeerId = next
                    .parse()
                    .map_err(|_| RelayError::InvalidHop(next.to_string()))?;
                debug!(
                    "Forwarding request from {} to {} ({} hops after it)",
                    from,
                    next_hop,
                    forwarded.hops.len()
                );
                let hops_remaining = forwarded.hops.len();
                self.forward(stream, next_hop, forwarded).await?;
                self.stats.write().requests_forwarded += 1;
                Ok(RelayOutcome::Forwarded {
                    next_hop,
                    hops_remaining,
                })
            }
            None => {
                let exit_public_key = self.terminate(stream, &request).await?;
                info!("Terminated tunnel request from {}", from);
                self.stats.write().requests_terminated += 1;
                Ok(RelayOutcome::Terminated { exit_public_key })
            }
        }
    }

    async fn forward<S>(&self, upstream: &mut S, next_hop: PeerId, request: TunnelRequest) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let downstream = tokio::time::timeout(self.config.hop_timeout, async {
            self.transport.connect(next_hop, Vec::new()).await?;
            let mut next = self
                .transport
                .open_stream(next_hop, NEGOTIATION_STREAM_PROTOCOL)
                .await?;
            write_request(&mut next, &request).await?;
            let response = read_response(&mut next).await?;
            let _ = next.close().await;
            Ok::<_, RelayError>(response)
        })
        .await;

        let response = match downstream {
            Ok(result) => result?,
            Err(_) => {
                warn!("Next hop {} timed out after {:?}", next_hop, self.config.hop_timeout);
                return Err(RelayError::HopTimeout(next_hop));
            }
        };

        write_response(upstream, &response).await?;
        Ok(())
    }

    async fn terminate<S>(&self, upstream: &mut S, request: &TunnelRequest) -> Result<String>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // The exit side of the interface is not configured here, so the
        // keypair only lives long enough to hand out its public half.
        let keypair = TunnelKeypair::generate();
        let exit_public_key = keypair.public_key_base64();
        debug!(
            "Acting as exit for requester key {}",
            request.requester_public_key
        );

        write_response(upstream, &TunnelResponse::new(exit_public_key.clone())).await?;
        Ok(exit_public_key)
    }
}
