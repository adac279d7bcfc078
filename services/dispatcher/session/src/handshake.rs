//! Registration handshake.
//!
//! Runs once on every accepted stream: one frame with the role byte and,
//! for data roles, one frame with the node id.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;
use wsn_wire::{decode_node_id, decode_role, read_frame, write_frame, Binding, WireError};

/// Read the handshake from a freshly accepted stream
pub async fn accept_handshake<S>(stream: &mut S) -> Result<Binding, WireError>
where
    S: AsyncRead + Unpin,
{
    let role = decode_role(&read_frame(stream).await?)?;
    let node_id = if role.is_bound() {
        Some(decode_node_id(&read_frame(stream).await?)?)
    } else {
        None
    };

    let binding = Binding::new(role, node_id)?;
    debug!("Handshake complete: {}", binding);
    Ok(binding)
}

/// Send the client side of the handshake
pub async fn send_handshake<S>(stream: &mut S, binding: Binding) -> Result<(), WireError>
where
    S: AsyncWrite + Unpin,
{
    for payload in binding.handshake_payloads() {
        write_frame(stream, &payload).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_handshake_roundtrip() {
        for binding in [
            Binding::OutboundData(0x0102),
            Binding::InboundDataOutboundAck(5),
            Binding::StimulusSource,
            Binding::CoapRequestSource,
        ] {
            let mut buffer = Vec::new();
            send_handshake(&mut buffer, binding).await.unwrap();

            let mut cursor = Cursor::new(buffer);
            assert_eq!(accept_handshake(&mut cursor).await.unwrap(), binding);
        }
    }

    #[tokio::test]
    async fn test_source_roles_do_not_consume_a_node_id() {
        // Stimulus role followed by an unrelated frame that must stay unread
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &[2]).await.unwrap();
        write_frame(&mut buffer, &[0x00, 0x01, 0x10, 0x05]).await.unwrap();

        let mut cursor = Cursor::new(buffer);
        assert_eq!(
            accept_handshake(&mut cursor).await.unwrap(),
            Binding::StimulusSource
        );
        let next = read_frame(&mut cursor).await.unwrap();
        assert_eq!(next.len(), 4);
    }

    #[tokio::test]
    async fn test_aborted_handshake() {
        // Data role, then the peer disappears before sending its id
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &[0]).await.unwrap();
        let mut cursor = Cursor::new(buffer);
        assert!(accept_handshake(&mut cursor).await.unwrap_err().is_closed());

        let mut buffer = Vec::new();
        write_frame(&mut buffer, &[9]).await.unwrap();
        let mut cursor = Cursor::new(buffer);
        assert!(matches!(
            accept_handshake(&mut cursor).await,
            Err(WireError::Role(9))
        ));
    }
}
