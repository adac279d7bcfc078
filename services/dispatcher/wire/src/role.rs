//! Handshake roles.
//!
//! The first frame on a freshly accepted stream is a single role byte. Data
//! roles follow it with a second frame holding the node id; source roles stay
//! anonymous.

use crate::{NodeId, WireError};
use bytes::Bytes;
use std::fmt;

/// Role announced by a connection during the handshake
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketRole {
    /// Dispatcher pushes frames to the node over this connection
    OutboundData = 0,
    /// Node sends data and receives Ack/Nack over this connection
    InboundDataOutboundAck = 1,
    /// External stimulus injector
    StimulusSource = 2,
    /// External CoAP request injector
    CoapRequestSource = 3,
}

impl SocketRole {
    /// Whether the handshake carries a node id for this role
    pub fn is_bound(self) -> bool {
        matches!(
            self,
            SocketRole::OutboundData | SocketRole::InboundDataOutboundAck
        )
    }
}

impl TryFrom<u8> for SocketRole {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SocketRole::OutboundData),
            1 => Ok(SocketRole::InboundDataOutboundAck),
            2 => Ok(SocketRole::StimulusSource),
            3 => Ok(SocketRole::CoapRequestSource),
            other => Err(WireError::Role(other)),
        }
    }
}

impl fmt::Display for SocketRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketRole::OutboundData => write!(f, "outbound-data"),
            SocketRole::InboundDataOutboundAck => write!(f, "inbound-data/outbound-ack"),
            SocketRole::StimulusSource => write!(f, "stimulus-source"),
            SocketRole::CoapRequestSource => write!(f, "coap-source"),
        }
    }
}

/// Outcome of a completed handshake: a role, bound to a node id where the
/// role requires one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    /// Outbound data connection of a node
    OutboundData(NodeId),
    /// Inbound data / outbound ack connection of a node
    InboundDataOutboundAck(NodeId),
    /// Anonymous stimulus source
    StimulusSource,
    /// Anonymous CoAP request source
    CoapRequestSource,
}

impl Binding {
    /// Build a binding from a role and the node id read for it
    pub fn new(role: SocketRole, node_id: Option<NodeId>) -> Result<Self, WireError> {
        match (role, node_id) {
            (SocketRole::OutboundData, Some(id)) => Ok(Binding::OutboundData(id)),
            (SocketRole::InboundDataOutboundAck, Some(id)) => {
                Ok(Binding::InboundDataOutboundAck(id))
            }
            (SocketRole::StimulusSource, _) => Ok(Binding::StimulusSource),
            (SocketRole::CoapRequestSource, _) => Ok(Binding::CoapRequestSource),
            (_, None) => Err(WireError::Truncated { need: 2, got: 0 }),
        }
    }

    /// Role of this binding
    pub fn role(&self) -> SocketRole {
        match self {
            Binding::OutboundData(_) => SocketRole::OutboundData,
            Binding::InboundDataOutboundAck(_) => SocketRole::InboundDataOutboundAck,
            Binding::StimulusSource => SocketRole::StimulusSource,
            Binding::CoapRequestSource => SocketRole::CoapRequestSource,
        }
    }

    /// Node id, for data roles
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Binding::OutboundData(id) | Binding::InboundDataOutboundAck(id) => Some(*id),
            Binding::StimulusSource | Binding::CoapRequestSource => None,
        }
    }

    /// Frame payloads a client sends to establish this binding
    pub fn handshake_payloads(&self) -> Vec<Bytes> {
        let mut payloads = vec![Bytes::copy_from_slice(&[self.role() as u8])];
        if let Some(id) = self.node_id() {
            payloads.push(Bytes::copy_from_slice(&id.to_be_bytes()));
        }
        payloads
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node_id() {
            Some(id) => write!(f, "{} for node {:#06x}", self.role(), id),
            None => write!(f, "{}", self.role()),
        }
    }
}

/// Decode the first handshake frame
pub fn decode_role(payload: &[u8]) -> Result<SocketRole, WireError> {
    match payload {
        [role] => SocketRole::try_from(*role),
        _ => Err(WireError::Length {
            expected: 1,
            got: payload.len(),
        }),
    }
}

/// Decode the node id frame sent by data roles
pub fn decode_node_id(payload: &[u8]) -> Result<NodeId, WireError> {
    match payload {
        [hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(WireError::Length {
            expected: 2,
            got: payload.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_codes() {
        assert_eq!(decode_role(&[0]).unwrap(), SocketRole::OutboundData);
        assert_eq!(decode_role(&[1]).unwrap(), SocketRole::InboundDataOutboundAck);
        assert_eq!(decode_role(&[2]).unwrap(), SocketRole::StimulusSource);
        assert_eq!(decode_role(&[3]).unwrap(), SocketRole::CoapRequestSource);
        assert!(matches!(decode_role(&[4]), Err(WireError::Role(4))));
        assert!(matches!(decode_role(&[]), Err(WireError::Length { .. })));
        assert!(matches!(decode_role(&[0, 1]), Err(WireError::Length { .. })));
    }

    #[test]
    fn test_only_data_roles_are_bound() {
        assert!(SocketRole::OutboundData.is_bound());
        assert!(SocketRole::InboundDataOutboundAck.is_bound());
        assert!(!SocketRole::StimulusSource.is_bound());
        assert!(!SocketRole::CoapRequestSource.is_bound());
    }

    #[test]
    fn test_handshake_payloads() {
        let payloads = Binding::InboundDataOutboundAck(0x0102).handshake_payloads();
        assert_eq!(payloads.len(), 2);
        assert_eq!(&payloads[0][..], &[1]);
        assert_eq!(&payloads[1][..], &[0x01, 0x02]);

        let payloads = Binding::StimulusSource.handshake_payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(&payloads[0][..], &[2]);
    }

    #[test]
    fn test_binding_requires_node_id_for_data_roles() {
        assert!(Binding::new(SocketRole::OutboundData, None).is_err());
        assert_eq!(
            Binding::new(SocketRole::CoapRequestSource, None).unwrap(),
            Binding::CoapRequestSource
        );
        assert_eq!(decode_node_id(&[0xff, 0xfe]).unwrap(), 0xfffe);
        assert!(decode_node_id(&[0x01]).is_err());
    }
}
