//! TCP transport for dispatcher connections.
//!
//! Every registered connection is split in two: a writer task drains a
//! channel of encoded frames, and, for roles the loop reads from, a reader
//! task forwards what it reads as [`ConnectionEvent`]s. The event loop only
//! ever touches channels, so a slow peer stalls its own tasks and nothing
//! else.

use crate::error::CommunicationError;
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, trace, warn};
use wsn_wire::{
    encode_frame, read_frame, write_encoded, Binding, NodeId, OutgoingPacket, WireError,
    COAP_MAX_PAYLOAD,
};

/// Identifier of an accepted connection, unique for the process lifetime
pub type ConnId = u64;

/// Something that happened on a connection, reported to the event loop
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Handshake completed on a freshly accepted stream
    Accepted {
        /// The stream, positioned right after the handshake
        stream: TcpStream,
        /// Remote address
        peer: SocketAddr,
        /// Role and node id announced by the peer
        binding: Binding,
    },
    /// Handshake failed; the stream has been dropped
    HandshakeFailed {
        /// Remote address
        peer: SocketAddr,
        /// What went wrong
        error: WireError,
    },
    /// A whole frame arrived on a data or stimulus connection
    Frame {
        /// Connection it arrived on
        conn: ConnId,
        /// Frame payload
        payload: Bytes,
    },
    /// A CoAP request arrived on the side channel
    CoapRequest {
        /// Connection it arrived on
        conn: ConnId,
        /// Target node
        node_id: NodeId,
        /// Raw CoAP message
        message: Bytes,
    },
    /// The connection failed or the peer went away
    Closed {
        /// Failed connection
        conn: ConnId,
        /// Failure
        error: CommunicationError,
    },
}

/// The loop's reference to a live connection
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnId,
    peer: Option<SocketAddr>,
    outbound: mpsc::UnboundedSender<Bytes>,
    reader: Option<AbortHandle>,
}

impl ConnectionHandle {
    /// Wrap the sending side of a writer task
    pub fn new(id: ConnId, peer: Option<SocketAddr>, outbound: mpsc::UnboundedSender<Bytes>) -> Self {
        Self {
            id,
            peer,
            outbound,
            reader: None,
        }
    }

    /// Handle backed by an in-memory channel instead of a socket; the
    /// receiver yields the encoded frames
    pub fn pair(id: ConnId) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(id, None, tx), rx)
    }

    /// Attach the reader task so shutdown can stop it
    pub fn with_reader(mut self, reader: AbortHandle) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Connection id
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Remote address, if socket-backed
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Queue one frame carrying `payload`
    pub fn send_payload(&self, payload: &[u8]) -> Result<(), CommunicationError> {
        let frame = encode_frame(payload)?;
        self.outbound
            .send(frame)
            .map_err(|_| CommunicationError::ConnectionGone(self.id))
    }

    /// Queue an outgoing packet; returns the encoded packet length
    pub fn send(&self, packet: &OutgoingPacket) -> Result<usize, CommunicationError> {
        let payload = packet.encode();
        self.send_payload(&payload)?;
        Ok(payload.len())
    }

    /// Stop reading and let the writer flush, then close its half
    pub fn shutdown(self) {
        debug!("Shutting down connection {}", self.id);
        if let Some(reader) = self.reader {
            reader.abort();
        }
    }
}

/// Create a TCP listener bound to the given address
pub async fn listen_tcp(addr: SocketAddr) -> tokio::io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Connect to a TCP address
pub async fn connect_tcp(addr: SocketAddr) -> tokio::io::Result<TcpStream> {
    TcpStream::connect(addr).await
}

/// Drain `frames` into `writer` until the channel closes or a write fails
pub fn spawn_writer<W>(
    conn: ConnId,
    mut writer: W,
    mut frames: mpsc::UnboundedReceiver<Bytes>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            trace!("conn {} sending {} bytes", conn, frame.len());
            if let Err(e) = write_encoded(&mut writer, &frame).await {
                warn!("Write failed on connection {}: {}", conn, e);
                let _ = events.send(ConnectionEvent::Closed {
                    conn,
                    error: e.into(),
                });
                return;
            }
        }
        // Errors on shutdown are irrelevant, the connection is going away
        let _ = writer.shutdown().await;
        debug!("Writer for connection {} finished", conn);
    })
}

/// Forward length-prefixed frames from `reader` until it fails
pub fn spawn_frame_reader<R>(
    conn: ConnId,
    mut reader: R,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(payload) => {
                    if events.send(ConnectionEvent::Frame { conn, payload }).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = events.send(ConnectionEvent::Closed {
                        conn,
                        error: e.into(),
                    });
                    return;
                }
            }
        }
    })
}

/// Forward CoAP requests from the unframed side channel until it fails
pub fn spawn_coap_reader<R>(
    conn: ConnId,
    mut reader: R,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match read_coap_request(&mut reader).await {
                Ok((node_id, message)) => {
                    let event = ConnectionEvent::CoapRequest {
                        conn,
                        node_id,
                        message,
                    };
                    if events.send(event).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = events.send(ConnectionEvent::Closed {
                        conn,
                        error: e.into(),
                    });
                    return;
                }
            }
        }
    })
}

/// Read one CoAP request: a bare big-endian node id, then whatever the peer
/// sent next, up to [`COAP_MAX_PAYLOAD`] bytes. A zero-length read at either
/// step means the peer closed.
pub async fn read_coap_request<R>(reader: &mut R) -> Result<(NodeId, Bytes), WireError>
where
    R: AsyncRead + Unpin,
{
    let mut id = [0u8; 2];
    let n = reader.read(&mut id).await?;
    if n == 0 {
        return Err(WireError::Closed);
    }
    if n == 1 {
        reader
            .read_exact(&mut id[1..])
            .await
            .map_err(|_| WireError::Closed)?;
    }
    let node_id = u16::from_be_bytes(id);

    let mut message = vec![0u8; COAP_MAX_PAYLOAD];
    let n = reader.read(&mut message).await?;
    if n == 0 {
        return Err(WireError::Closed);
    }
    message.truncate(n);
    trace!("coap request for {:#06x}: {:02x?}", node_id, message);

    Ok((node_id, Bytes::from(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::{IpAddr, Ipv4Addr};
    use wsn_wire::write_frame;

    #[tokio::test]
    async fn test_tcp_listen_connect() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = listen_tcp(addr).await.unwrap();
        let bound_addr = listener.local_addr().unwrap();

        let stream = connect_tcp(bound_addr).await.unwrap();
        assert!(stream.peer_addr().is_ok());
    }

    #[tokio::test]
    async fn test_handle_queues_encoded_frames() {
        let (handle, mut rx) = ConnectionHandle::pair(3);
        let len = handle.send(&OutgoingPacket::Ack(0x0102)).unwrap();
        assert_eq!(len, 3);
        let frame = rx.recv().await.unwrap();
        assert_eq!(&frame[..], &[0x00, 0x03, 1, 0x01, 0x02]);

        drop(rx);
        assert!(matches!(
            handle.send(&OutgoingPacket::Nack(1)),
            Err(CommunicationError::ConnectionGone(3))
        ));
    }

    #[tokio::test]
    async fn test_writer_writes_frames_in_order() {
        let (client, server) = tokio::io::duplex(256);
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (handle, frames) = ConnectionHandle::pair(1);
        let writer = spawn_writer(1, server, frames, events_tx);

        handle.send(&OutgoingPacket::Ack(2)).unwrap();
        handle
            .send(&OutgoingPacket::Data(Bytes::from_static(b"xy")))
            .unwrap();
        drop(handle);
        writer.await.unwrap();

        let mut client = client;
        let first = read_frame(&mut client).await.unwrap();
        let second = read_frame(&mut client).await.unwrap();
        assert_eq!(&first[..], &[1, 0, 2]);
        assert_eq!(&second[..], &[0, b'x', b'y']);
        assert!(read_frame(&mut client).await.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_frame_reader_reports_close() {
        let mut stream = Vec::new();
        write_frame(&mut stream, &[0x00, 0x01, 0xaa]).await.unwrap();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        spawn_frame_reader(9, Cursor::new(stream), events_tx);

        match events_rx.recv().await.unwrap() {
            ConnectionEvent::Frame { conn, payload } => {
                assert_eq!(conn, 9);
                assert_eq!(&payload[..], &[0x00, 0x01, 0xaa]);
            }
            other => panic!("unexpected event {:?}", other),
        }
        match events_rx.recv().await.unwrap() {
            ConnectionEvent::Closed { conn, error } => {
                assert_eq!(conn, 9);
                assert!(error.is_closed());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_coap_request_and_close() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        client.write_all(&[0x00, 0x07]).await.unwrap();
        client.write_all(&[0x51, 0x02, 0x00, 0x00]).await.unwrap();
        let (node, message) = read_coap_request(&mut server).await.unwrap();
        assert_eq!(node, 7);
        assert_eq!(&message[..], &[0x51, 0x02, 0x00, 0x00]);

        // Node id only, then close: no request comes out
        client.write_all(&[0x00, 0x07]).await.unwrap();
        drop(client);
        assert!(read_coap_request(&mut server).await.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_coap_message_is_capped() {
        let (mut client, mut server) = tokio::io::duplex(8192);
        client.write_all(&[0x00, 0x01]).await.unwrap();
        client.write_all(&vec![0xab; 3000]).await.unwrap();

        let (_, message) = read_coap_request(&mut server).await.unwrap();
        assert!(message.len() <= COAP_MAX_PAYLOAD);
        assert!(!message.is_empty());
    }
}
