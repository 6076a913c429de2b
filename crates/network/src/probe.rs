//! Latency prober
//!
//! Measures round-trip time to a peer by sending one marker byte over the
//! probe protocol and timing the echo.

use std::io;
use std::time::{Duration, Instant};

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, Stream, StreamExt};
use libp2p::PeerId;
use tracing::{debug, trace};
use veilhop_core::Latency;

use crate::peers::PeerRegistry;
use crate::protocol::{PROBE_MARKER, PROBE_STREAM_PROTOCOL};
use crate::transport::Overlay;

/// Default time allowed for one probe round trip
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct LatencyProber<T: Overlay> {
    transport: T,
    registry: PeerRegistry,
    timeout: Duration,
}

impl<T: Overlay> LatencyProber<T> {
    pub fn new(transport: T, registry: PeerRegistry) -> Self {
        Self {
            transport,
            registry,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probe `peer` and record the result in the registry.
    ///
    /// Never fails: any error, including a timeout, is recorded as
    /// `Latency::Unreachable`.
    pub async fn probe(&self, peer: PeerId) -> Latency {
        let latency = match tokio::time::timeout(self.timeout, self.round_trip(peer)).await {
            Ok(Ok(elapsed)) => Latency::from_elapsed(elapsed),
            Ok(Err(e)) => {
                debug!("Probe to {} failed: {}", peer, e);
                Latency::Unreachable
            }
            Err(_) => {
                debug!("Probe to {} timed out after {:?}", peer, self.timeout);
                Latency::Unreachable
            }
        };

        trace!("Probe {} -> {:?}", peer, latency);
        self.registry.record_latency(&peer, latency);
        latency
    }

    async fn round_trip(&self, peer: PeerId) -> io::Result<Duration> {
        let start = Instant::now();
        let mut stream = self
            .transport
            .open_stream(peer, PROBE_STREAM_PROTOCOL)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::ConnectionRefused, e.to_string()))?;

        stream.write_all(&[PROBE_MARKER]).await?;
        stream.flush().await?;

        let mut echo = [0u8; 1];
        stream.read_exact(&mut echo).await?;
        let elapsed = start.elapsed();
        let _ = stream.close().await;

        if echo[0] != PROBE_MARKER {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unexpected probe echo: {:#04x}", echo[0]),
            ));
        }
        Ok(elapsed)
    }
}

/// Answer a single probe by echoing the marker byte back.
pub async fn answer_probe<S>(mut stream: S) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut marker = [0u8; 1];
    stream.read_exact(&mut marker).await?;
    stream.write_all(&marker).await?;
    stream.flush().await?;
    stream.close().await
}

/// Answer every inbound probe stream until the listener is dropped.
pub async fn serve_probes<I, S>(mut incoming: I)
where
    I: Stream<Item = (PeerId, S)> + Unpin,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    while let Some((peer, stream)) = incoming.next().await {
        tokio::spawn(async move {
            if let Err(e) = answer_probe(stream).await {
                trace!("Probe from {} ended: {}", peer, e);
            }
        });
    }
}
