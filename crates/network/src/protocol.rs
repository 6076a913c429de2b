//! Stream protocols for veilhop
//!
//! Negotiation messages travel as `[u32 BE length][JSON body]` frames over a
//! raw libp2p stream. The probe protocol is a single marker byte echoed back.

use std::io;

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::StreamProtocol;
use veilhop_core::{TunnelRequest, TunnelResponse, NEGOTIATION_PROTOCOL, PROBE_PROTOCOL};

/// Protocol identifier for tunnel negotiation
pub const NEGOTIATION_STREAM_PROTOCOL: StreamProtocol = StreamProtocol::new(NEGOTIATION_PROTOCOL);

/// Protocol identifier for latency probes
pub const PROBE_STREAM_PROTOCOL: StreamProtocol = StreamProtocol::new(PROBE_PROTOCOL);

/// Maximum negotiation frame size (64KB)
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Byte sent by the prober and echoed by the responder
pub const PROBE_MARKER: u8 = b'p';

/// Write one length-prefixed frame and flush it.
pub async fn write_frame<T>(io: &mut T, payload: &[u8]) -> io::Result<()>
where
    T: AsyncWrite + Unpin,
{
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Message too large: {} > {}", payload.len(), MAX_MESSAGE_SIZE),
        ));
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);

    io.write_all(&buf).await?;
    io.flush().await
}

/// Read one length-prefixed frame.
pub async fn read_frame<T>(io: &mut T) -> io::Result<Vec<u8>>
where
    T: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    io.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message too large: {} > {}", len, MAX_MESSAGE_SIZE),
        ));
    }

    let mut data = vec![0u8; len];
    io.read_exact(&mut data).await?;
    Ok(data)
}

pub async fn write_request<T>(io: &mut T, request: &TunnelRequest) -> io::Result<()>
where
    T: AsyncWrite + Unpin,
{
    let data = request.to_bytes().map_err(invalid_data)?;
    write_frame(io, &data).await
}

pub async fn read_request<T>(io: &mut T) -> io::Result<TunnelRequest>
where
    T: AsyncRead + Unpin,
{
    let data = read_frame(io).await?;
    TunnelRequest::from_bytes(&data).map_err(invalid_data)
}

pub async fn write_response<T>(io: &mut T, response: &TunnelResponse) -> io::Result<()>
where
    T: AsyncWrite + Unpin,
{
    let data = response.to_bytes().map_err(invalid_data)?;
    write_frame(io, &data).await
}

pub async fn read_response<T>(io: &mut T) -> io::Result<TunnelResponse>
where
    T: AsyncRead + Unpin,
{
    let data = read_frame(io).await?;
    TunnelResponse::from_bytes(&data).map_err(invalid_data)
}

fn invalid_data(e: veilhop_core::VeilhopError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}
