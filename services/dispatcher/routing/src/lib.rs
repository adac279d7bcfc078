//! Reachability and delivery planning for the dispatcher.
//!
//! This crate decides who a frame goes to: the geometric reachability model
//! over the topology table, and the unicast/broadcast planning built on it.
//! It knows nothing about live connections; the session layer combines its
//! decisions with the connection registry.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod reachability;
pub mod router;

pub use reachability::Reachability;
pub use router::{broadcast_targets, check_unicast, decide, DropReason, RoutingDecision};
