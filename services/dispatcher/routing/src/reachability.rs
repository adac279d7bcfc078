//! Geometric reachability model

use wsn_topology::TopologyTable;
use wsn_wire::NodeId;

/// Decides whether a transmission from one node reaches another
pub trait Reachability {
    /// Whether the node is known to the model
    fn knows(&self, node_id: NodeId) -> bool;

    /// Whether `target` hears a transmission from `sender`.
    ///
    /// Unknown ids are never reachable. The relation is not symmetric: only
    /// the sender's range is taken into account.
    fn reachable(&self, sender: NodeId, target: NodeId) -> bool;
}

impl Reachability for TopologyTable {
    fn knows(&self, node_id: NodeId) -> bool {
        self.contains(node_id)
    }

    fn reachable(&self, sender: NodeId, target: NodeId) -> bool {
        match (self.get(sender), self.get(target)) {
            (Some(s), Some(t)) => s.covers(t),
            _ => false,
        }
    }
}
