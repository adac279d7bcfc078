//! Session error types.

use crate::transport::ConnId;
use thiserror::Error;
use wsn_routing::DropReason;
use wsn_wire::{NodeId, WireError};

/// Failure local to one managed connection
#[derive(Error, Debug)]
pub enum CommunicationError {
    /// Framing, decoding or I/O failure on the stream
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Unicast destination could not be resolved
    #[error("cannot deliver to node {node}: {reason}")]
    Resolution {
        /// Requested destination
        node: NodeId,
        /// Why it could not be resolved
        reason: DropReason,
    },

    /// Writer task of the connection has already stopped
    #[error("connection {0} is gone")]
    ConnectionGone(ConnId),
}

impl CommunicationError {
    /// Resolution failure reason, if this is one
    pub fn resolution(&self) -> Option<DropReason> {
        match self {
            CommunicationError::Resolution { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Whether the peer closed the connection
    pub fn is_closed(&self) -> bool {
        matches!(self, CommunicationError::Wire(e) if e.is_closed())
    }
}

/// Reverse lookup found no node owning a connection
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no node owns connection {0}")]
pub struct LookupError(pub ConnId);
