//! Topology table.

use crate::TopologyError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use wsn_wire::{NodeId, BROADCAST_ADDRESS};

/// Position of a node on the deployment plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate
    pub x: i32,
    /// Vertical coordinate
    pub y: i32,
}

impl Position {
    /// Create a new position
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to `other`
    pub fn distance_squared(&self, other: &Position) -> i128 {
        let dx = self.x as i128 - other.x as i128;
        let dy = self.y as i128 - other.y as i128;
        dx * dx + dy * dy
    }
}

/// Static radio characteristics of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Node ID
    pub node_id: NodeId,
    /// Position, same units as `range`
    pub position: Position,
    /// Emission range
    pub range: u32,
}

impl NodeEntry {
    /// Create a new entry
    pub fn new(node_id: NodeId, x: i32, y: i32, range: u32) -> Self {
        Self {
            node_id,
            position: Position::new(x, y),
            range,
        }
    }

    /// Whether a transmission from this node reaches `other`.
    ///
    /// Only this node's range counts, and a node sitting exactly on the
    /// range boundary is out of reach.
    pub fn covers(&self, other: &NodeEntry) -> bool {
        let range = self.range as i128;
        self.position.distance_squared(&other.position) < range * range
    }
}

/// Immutable node id -> entry table
#[derive(Debug, Clone, Default)]
pub struct TopologyTable {
    nodes: HashMap<NodeId, NodeEntry>,
}

impl TopologyTable {
    /// Build a table, rejecting duplicate and reserved ids
    pub fn new<I>(entries: I) -> Result<Self, TopologyError>
    where
        I: IntoIterator<Item = NodeEntry>,
    {
        let mut nodes = HashMap::new();
        for entry in entries {
            if entry.node_id == BROADCAST_ADDRESS {
                return Err(TopologyError::ReservedId(entry.node_id));
            }
            if nodes.insert(entry.node_id, entry).is_some() {
                return Err(TopologyError::DuplicateNode(entry.node_id));
            }
        }
        Ok(Self { nodes })
    }

    /// Look up a node
    pub fn get(&self, node_id: NodeId) -> Option<&NodeEntry> {
        self.nodes.get(&node_id)
    }

    /// Whether the node is part of the deployment
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the table has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in ascending order
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_squared_no_overflow() {
        let a = Position::new(i32::MIN, i32::MIN);
        let b = Position::new(i32::MAX, i32::MAX);
        let side = (i32::MAX as i128) - (i32::MIN as i128);
        assert_eq!(a.distance_squared(&b), 2 * side * side);
    }

    #[test]
    fn test_covers_is_strict() {
        let a = NodeEntry::new(1, 0, 0, 5);
        let on_boundary = NodeEntry::new(2, 3, 4, 5);
        let inside = NodeEntry::new(3, 3, 3, 5);
        assert!(!a.covers(&on_boundary));
        assert!(a.covers(&inside));
    }

    #[test]
    fn test_rejects_duplicates_and_broadcast() {
        let dup = TopologyTable::new(vec![NodeEntry::new(1, 0, 0, 1), NodeEntry::new(1, 5, 5, 1)]);
        assert!(matches!(dup, Err(TopologyError::DuplicateNode(1))));

        let reserved = TopologyTable::new(vec![NodeEntry::new(BROADCAST_ADDRESS, 0, 0, 1)]);
        assert!(matches!(reserved, Err(TopologyError::ReservedId(_))));
    }

    #[test]
    fn test_lookup() {
        let table =
            TopologyTable::new(vec![NodeEntry::new(7, 1, 2, 3), NodeEntry::new(2, 0, 0, 9)]).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.node_ids(), vec![2, 7]);
        assert_eq!(table.get(7).map(|e| e.range), Some(3));
        assert!(!table.contains(8));
    }
}
