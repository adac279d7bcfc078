//! Routing decision logic

use crate::reachability::Reachability;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;
use wsn_wire::{NodeId, BROADCAST_ADDRESS};

/// Routing decision result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Deliver to a single node and report the outcome to the sender
    Unicast(NodeId),
    /// Deliver independently to each listed node, never acknowledged
    Broadcast(Vec<NodeId>),
    /// Unicast that cannot be delivered
    Drop {
        /// Requested destination
        target: NodeId,
        /// Why it was dropped
        reason: DropReason,
    },
}

/// Reason a unicast cannot be resolved
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    /// Sender or target is not in the topology
    #[error("unknown node")]
    UnknownNode,
    /// Target is outside the sender's emission range
    #[error("out of range")]
    OutOfRange,
    /// Target has no outbound data connection
    #[error("not connected")]
    NotConnected,
}

/// Check the geometric part of a unicast from `sender` to `target`
pub fn check_unicast<R>(reach: &R, sender: NodeId, target: NodeId) -> Result<(), DropReason>
where
    R: Reachability + ?Sized,
{
    if !reach.knows(sender) || !reach.knows(target) {
        return Err(DropReason::UnknownNode);
    }
    if !reach.reachable(sender, target) {
        return Err(DropReason::OutOfRange);
    }
    Ok(())
}

/// Broadcast fan-out: every candidate in range of `sender`, sender excluded,
/// in ascending id order
pub fn broadcast_targets<R, I>(reach: &R, sender: NodeId, candidates: I) -> Vec<NodeId>
where
    R: Reachability + ?Sized,
    I: IntoIterator<Item = NodeId>,
{
    let mut targets: Vec<NodeId> = candidates
        .into_iter()
        .filter(|&id| id != sender)
        .filter(|&id| {
            let hit = reach.reachable(sender, id);
            trace!("broadcast from {} to {}: {}", sender, id, hit);
            hit
        })
        .collect();
    targets.sort_unstable();
    targets.dedup();
    targets
}

/// Decide how a data frame from `sender` addressed to `target` is delivered.
///
/// `candidates` are the nodes currently able to receive data; they are only
/// consulted for broadcasts.
pub fn decide<R, I>(reach: &R, sender: NodeId, target: NodeId, candidates: I) -> RoutingDecision
where
    R: Reachability + ?Sized,
    I: IntoIterator<Item = NodeId>,
{
    if target == BROADCAST_ADDRESS {
        return RoutingDecision::Broadcast(broadcast_targets(reach, sender, candidates));
    }
    match check_unicast(reach, sender, target) {
        Ok(()) => RoutingDecision::Unicast(target),
        Err(reason) => RoutingDecision::Drop { target, reason },
    }
}
