//! Wire protocol framing, handshake roles and packet kinds for the dispatcher.
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u16 length (BE)      | length of bytes that follow|
//! +----------------------+----------------------------+
//! | payload              | role / node id / packet    |
//! +----------------------+----------------------------+
//! ```
//!
//! The CoAP ingress side channel is the one exception: it sends a bare
//! `[node_id: u16]` followed by at most [`COAP_MAX_PAYLOAD`] bytes of CoAP
//! message, without a length prefix.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod packet;
pub mod role;

pub use error::WireError;
pub use frame::{
    encode_frame, read_frame, write_encoded, write_frame, LENGTH_PREFIX_SIZE, MAX_FRAME_PAYLOAD,
};
pub use packet::{IncomingData, OutgoingPacket, PacketKind, SensorCategory, StimulusRequest};
pub use role::{decode_node_id, decode_role, Binding, SocketRole};

/// Node identifier in the simulated network
pub type NodeId = u16;

/// Reserved id meaning "every node in range"
pub const BROADCAST_ADDRESS: NodeId = 0xFFFF;

/// Largest CoAP message read from the ingress side channel in one request
pub const COAP_MAX_PAYLOAD: usize = 1024;
