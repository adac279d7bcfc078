//! Node side of the dispatcher protocol.
//!
//! Used by tests and by external drivers standing in for simulated nodes or
//! injection sources.

use crate::handshake::send_handshake;
use crate::transport::connect_tcp;
use bytes::{BufMut, Bytes, BytesMut};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;
use wsn_wire::{
    read_frame, write_frame, Binding, IncomingData, NodeId, OutgoingPacket, StimulusRequest,
    WireError, COAP_MAX_PAYLOAD,
};

/// One registered connection to a dispatcher
#[derive(Debug)]
pub struct NodeClient {
    stream: TcpStream,
    binding: Binding,
}

impl NodeClient {
    /// Connect and announce `binding`
    pub async fn connect(addr: SocketAddr, binding: Binding) -> Result<Self, WireError> {
        let mut stream = connect_tcp(addr).await?;
        stream.set_nodelay(true)?;
        send_handshake(&mut stream, binding).await?;
        debug!("Connected to {} as {}", addr, binding);
        Ok(Self { stream, binding })
    }

    /// Role and node id announced at connect time
    pub fn binding(&self) -> Binding {
        self.binding
    }

    /// Send application data to `target` (or [`wsn_wire::BROADCAST_ADDRESS`])
    pub async fn send_data(&mut self, target: NodeId, payload: &[u8]) -> Result<(), WireError> {
        let frame = IncomingData::new(target, Bytes::copy_from_slice(payload)).encode();
        write_frame(&mut self.stream, &frame).await
    }

    /// Wait for the next packet from the dispatcher
    pub async fn recv_packet(&mut self) -> Result<OutgoingPacket, WireError> {
        OutgoingPacket::decode(read_frame(&mut self.stream).await?)
    }

    /// Inject a stimulus
    pub async fn send_stimulus(&mut self, request: &StimulusRequest) -> Result<(), WireError> {
        write_frame(&mut self.stream, &request.encode()).await
    }

    /// Inject a CoAP message; sent unframed, node id first
    pub async fn send_coap_request(
        &mut self,
        node_id: NodeId,
        message: &[u8],
    ) -> Result<(), WireError> {
        if message.is_empty() || message.len() > COAP_MAX_PAYLOAD {
            return Err(WireError::Size(message.len()));
        }
        let mut buf = BytesMut::with_capacity(2 + message.len());
        buf.put_u16(node_id);
        buf.put_slice(message);
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Underlying stream, for writing raw bytes
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Give up the client and keep the stream
    pub fn into_inner(self) -> TcpStream {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::accept_handshake;
    use crate::transport::listen_tcp;

    #[tokio::test]
    async fn test_client_speaks_the_protocol() {
        let listener = listen_tcp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let binding = accept_handshake(&mut stream).await.unwrap();
            let frame = read_frame(&mut stream).await.unwrap();
            write_frame(&mut stream, &OutgoingPacket::Ack(4).encode())
                .await
                .unwrap();
            (binding, IncomingData::decode(frame).unwrap())
        });

        let mut client = NodeClient::connect(addr, Binding::InboundDataOutboundAck(9))
            .await
            .unwrap();
        client.send_data(4, b"ping").await.unwrap();
        assert_eq!(client.recv_packet().await.unwrap(), OutgoingPacket::Ack(4));

        let (binding, data) = server.await.unwrap();
        assert_eq!(binding, client.binding());
        assert_eq!(data, IncomingData::new(4, Bytes::from_static(b"ping")));
    }

    #[tokio::test]
    async fn test_coap_request_size_is_checked() {
        let listener = listen_tcp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        // The kernel completes the connection without an accept call
        let mut client = NodeClient::connect(addr, Binding::CoapRequestSource)
            .await
            .unwrap();
        let oversized = vec![0u8; COAP_MAX_PAYLOAD + 1];
        assert!(matches!(
            client.send_coap_request(1, &oversized).await,
            Err(WireError::Size(_))
        ));
    }
}
