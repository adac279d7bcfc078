//! Frame payload sub-formats.
//!
//! ```text
//! node -> dispatcher   [target: u16][application payload]
//! dispatcher -> node   [kind: u8][kind-specific body]
//!                        0 Data      payload verbatim
//!                        1 Ack       [node_id: u16]
//!                        2 Nack      [node_id: u16]
//!                        3 Stimulus  [sensor: u8][value: u8]
//!                        4 Coap      raw CoAP message
//! stimulus source      [node_id: u16][sensor: u8][value: u8]
//! ```

use crate::{NodeId, WireError, BROADCAST_ADDRESS};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Outgoing packet kind codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Relayed application data
    Data = 0,
    /// Unicast delivery succeeded
    Ack = 1,
    /// Unicast delivery failed
    Nack = 2,
    /// Injected sensor stimulus
    Stimulus = 3,
    /// Injected CoAP message
    Coap = 4,
}

impl TryFrom<u8> for PacketKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PacketKind::Data),
            1 => Ok(PacketKind::Ack),
            2 => Ok(PacketKind::Nack),
            3 => Ok(PacketKind::Stimulus),
            4 => Ok(PacketKind::Coap),
            other => Err(WireError::Kind(other)),
        }
    }
}

/// Packet sent by the dispatcher to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingPacket {
    /// Application payload relayed from another node
    Data(Bytes),
    /// Acknowledges a unicast towards the given node
    Ack(NodeId),
    /// Reports a failed unicast towards the given node
    Nack(NodeId),
    /// Sensor stimulus
    Stimulus {
        /// Category in the high nibble, channel in the low nibble
        sensor: u8,
        /// Stimulus value
        value: u8,
    },
    /// Opaque CoAP message
    Coap(Bytes),
}

impl OutgoingPacket {
    /// Kind code of this packet
    pub fn kind(&self) -> PacketKind {
        match self {
            OutgoingPacket::Data(_) => PacketKind::Data,
            OutgoingPacket::Ack(_) => PacketKind::Ack,
            OutgoingPacket::Nack(_) => PacketKind::Nack,
            OutgoingPacket::Stimulus { .. } => PacketKind::Stimulus,
            OutgoingPacket::Coap(_) => PacketKind::Coap,
        }
    }

    /// Length of the encoded packet (kind byte included)
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            OutgoingPacket::Data(p) | OutgoingPacket::Coap(p) => p.len(),
            OutgoingPacket::Ack(_) | OutgoingPacket::Nack(_) => 2,
            OutgoingPacket::Stimulus { .. } => 2,
        }
    }

    /// Encode as a frame payload
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.kind() as u8);
        match self {
            OutgoingPacket::Data(p) | OutgoingPacket::Coap(p) => buf.put_slice(p),
            OutgoingPacket::Ack(id) | OutgoingPacket::Nack(id) => buf.put_u16(*id),
            OutgoingPacket::Stimulus { sensor, value } => {
                buf.put_u8(*sensor);
                buf.put_u8(*value);
            }
        }
        buf.freeze()
    }

    /// Decode a frame payload received from the dispatcher
    pub fn decode(payload: Bytes) -> Result<Self, WireError> {
        let Some(&code) = payload.first() else {
            return Err(WireError::Truncated { need: 1, got: 0 });
        };
        let body = payload.slice(1..);

        match PacketKind::try_from(code)? {
            PacketKind::Data => Ok(OutgoingPacket::Data(body)),
            PacketKind::Coap => Ok(OutgoingPacket::Coap(body)),
            PacketKind::Ack => Ok(OutgoingPacket::Ack(exact_u16(&body)?)),
            PacketKind::Nack => Ok(OutgoingPacket::Nack(exact_u16(&body)?)),
            PacketKind::Stimulus => match &body[..] {
                [sensor, value] => Ok(OutgoingPacket::Stimulus {
                    sensor: *sensor,
                    value: *value,
                }),
                _ => Err(WireError::Length {
                    expected: 2,
                    got: body.len(),
                }),
            },
        }
    }
}

fn exact_u16(body: &[u8]) -> Result<u16, WireError> {
    match body {
        [hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(WireError::Length {
            expected: 2,
            got: body.len(),
        }),
    }
}

/// Data frame sent by a node on its inbound data connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingData {
    /// Destination node, or [`BROADCAST_ADDRESS`]
    pub target: NodeId,
    /// Application payload
    pub payload: Bytes,
}

impl IncomingData {
    /// Create a new incoming data frame
    pub fn new(target: NodeId, payload: Bytes) -> Self {
        Self { target, payload }
    }

    /// Whether this frame is addressed to every node in range
    pub fn is_broadcast(&self) -> bool {
        self.target == BROADCAST_ADDRESS
    }

    /// Decode `[target: u16][payload]`
    pub fn decode(frame: Bytes) -> Result<Self, WireError> {
        if frame.len() < 2 {
            return Err(WireError::Truncated {
                need: 2,
                got: frame.len(),
            });
        }
        let target = u16::from_be_bytes([frame[0], frame[1]]);
        Ok(Self {
            target,
            payload: frame.slice(2..),
        })
    }

    /// Encode as a frame payload
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.payload.len());
        buf.put_u16(self.target);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// Stimulus injected by an external source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StimulusRequest {
    /// Target node
    pub node_id: NodeId,
    /// Category in the high nibble, channel in the low nibble
    pub sensor: u8,
    /// Stimulus value
    pub value: u8,
}

impl StimulusRequest {
    /// Size of an encoded stimulus request
    pub const SIZE: usize = 4;

    /// Decode `[node_id: u16][sensor: u8][value: u8]`
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        match frame {
            [hi, lo, sensor, value] => Ok(Self {
                node_id: u16::from_be_bytes([*hi, *lo]),
                sensor: *sensor,
                value: *value,
            }),
            _ => Err(WireError::Length {
                expected: Self::SIZE,
                got: frame.len(),
            }),
        }
    }

    /// Encode as a frame payload
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u16(self.node_id);
        buf.put_u8(self.sensor);
        buf.put_u8(self.value);
        buf.freeze()
    }

    /// Sensor category from the high nibble
    pub fn category(&self) -> SensorCategory {
        SensorCategory::from_sensor(self.sensor)
    }

    /// Sensor channel from the low nibble
    pub fn channel(&self) -> u8 {
        self.sensor & 0x0f
    }

    /// Packet forwarded to the target node
    pub fn to_packet(&self) -> OutgoingPacket {
        OutgoingPacket::Stimulus {
            sensor: self.sensor,
            value: self.value,
        }
    }
}

/// Sensor category encoded in the high nibble of a sensor byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorCategory {
    /// Passive infrared
    Pir,
    /// Spirit sensor
    Spirit,
    /// Seismic sensor
    Seismic,
    /// Nibble with no known category
    Unknown(u8),
}

impl SensorCategory {
    /// Decode the category of a sensor byte
    pub fn from_sensor(sensor: u8) -> Self {
        match sensor >> 4 {
            0 => SensorCategory::Pir,
            1 => SensorCategory::Spirit,
            2 => SensorCategory::Seismic,
            other => SensorCategory::Unknown(other),
        }
    }
}

impl fmt::Display for SensorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorCategory::Pir => write!(f, "PIR"),
            SensorCategory::Spirit => write!(f, "SPIRIT"),
            SensorCategory::Seismic => write!(f, "SEISMIC"),
            SensorCategory::Unknown(_) => write!(f, "UNKNOWN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outgoing_layouts() {
        let data = OutgoingPacket::Data(Bytes::from_static(b"hi")).encode();
        assert_eq!(&data[..], &[0, b'h', b'i']);

        let ack = OutgoingPacket::Ack(0x0203).encode();
        assert_eq!(&ack[..], &[1, 0x02, 0x03]);

        let nack = OutgoingPacket::Nack(7).encode();
        assert_eq!(&nack[..], &[2, 0x00, 0x07]);

        let stim = OutgoingPacket::Stimulus {
            sensor: 0x21,
            value: 9,
        }
        .encode();
        assert_eq!(&stim[..], &[3, 0x21, 9]);

        let coap = OutgoingPacket::Coap(Bytes::from_static(&[0x51, 0x02])).encode();
        assert_eq!(&coap[..], &[4, 0x51, 0x02]);
    }

    #[test]
    fn test_decode_outgoing() {
        let ack = OutgoingPacket::decode(Bytes::from_static(&[1, 0x00, 0x05])).unwrap();
        assert_eq!(ack, OutgoingPacket::Ack(5));

        let data = OutgoingPacket::decode(Bytes::from_static(&[0])).unwrap();
        assert_eq!(data, OutgoingPacket::Data(Bytes::new()));

        assert!(matches!(
            OutgoingPacket::decode(Bytes::from_static(&[9, 1])),
            Err(WireError::Kind(9))
        ));
        assert!(OutgoingPacket::decode(Bytes::new()).is_err());
        assert!(OutgoingPacket::decode(Bytes::from_static(&[2, 0x00])).is_err());
    }

    #[test]
    fn test_incoming_data() {
        let frame = Bytes::from_static(&[0xff, 0xff, 1, 2, 3]);
        let data = IncomingData::decode(frame).unwrap();
        assert!(data.is_broadcast());
        assert_eq!(&data.payload[..], &[1, 2, 3]);

        let data = IncomingData::decode(Bytes::from_static(&[0x00, 0x02])).unwrap();
        assert_eq!(data.target, 2);
        assert!(data.payload.is_empty());
        assert!(!data.is_broadcast());

        assert!(IncomingData::decode(Bytes::from_static(&[0x01])).is_err());
    }

    #[test]
    fn test_stimulus_request() {
        let req = StimulusRequest::decode(&[0x00, 0x0a, 0x13, 0x40]).unwrap();
        assert_eq!(req.node_id, 10);
        assert_eq!(req.category(), SensorCategory::Spirit);
        assert_eq!(req.channel(), 3);
        assert_eq!(req.value, 0x40);
        assert_eq!(&req.to_packet().encode()[..], &[3, 0x13, 0x40]);

        assert!(StimulusRequest::decode(&[0x00, 0x0a, 0x13]).is_err());
        assert!(StimulusRequest::decode(&[0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_sensor_category_names() {
        assert_eq!(SensorCategory::from_sensor(0x05).to_string(), "PIR");
        assert_eq!(SensorCategory::from_sensor(0x1f).to_string(), "SPIRIT");
        assert_eq!(SensorCategory::from_sensor(0x20).to_string(), "SEISMIC");
        assert_eq!(SensorCategory::from_sensor(0x70), SensorCategory::Unknown(7));
    }
}
