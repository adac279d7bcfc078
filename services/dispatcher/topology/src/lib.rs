//! Static node placement for the dispatcher.
//!
//! This crate holds the topology table: every node's position and radio
//! range, loaded once from a declarative node list and shared read-only
//! for the lifetime of the process.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod loader;
pub mod table;

pub use loader::{NodeListFormat, TopologyError};
pub use table::{NodeEntry, Position, TopologyTable};
