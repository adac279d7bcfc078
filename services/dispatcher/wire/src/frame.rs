//! Length-prefixed framing.
//!
//! Every managed stream except the CoAP ingress side channel carries frames of
//! the form `[length: u16 BE][length bytes]`. Reads pull exactly one frame and
//! never buffer past its end, so the same stream can be handed from the
//! handshake to a long-lived reader without losing bytes.

use crate::WireError;
use bytes::{BufMut, Bytes, BytesMut};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Size of the length prefix
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Largest payload a single frame can carry
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Prefix `payload` with its big-endian length
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, WireError> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(WireError::Size(payload.len()));
    }

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u16(payload.len() as u16);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Read exactly one frame and return its payload
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Bytes, WireError> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    read_exact_or_closed(reader, &mut prefix).await?;
    let len = u16::from_be_bytes(prefix) as usize;

    let mut payload = vec![0u8; len];
    read_exact_or_closed(reader, &mut payload).await?;
    trace!("rcvd frame ({} bytes): {:02x?}", len, payload);

    Ok(Bytes::from(payload))
}

/// Write one frame carrying `payload`
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), WireError> {
    let frame = encode_frame(payload)?;
    write_encoded(writer, &frame).await
}

/// Write an already length-prefixed frame in one piece
pub async fn write_encoded<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &[u8],
) -> Result<(), WireError> {
    writer.write_all(frame).await.map_err(map_io)?;
    writer.flush().await.map_err(map_io)?;
    Ok(())
}

async fn read_exact_or_closed<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<(), WireError> {
    if buf.is_empty() {
        return Ok(());
    }
    reader.read_exact(buf).await.map_err(map_io)?;
    Ok(())
}

fn map_io(e: std::io::Error) -> WireError {
    match e.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe => WireError::Closed,
        _ => WireError::Io(e),
    }
}
