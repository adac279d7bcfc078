//! Connection registry.
//!
//! Owned by the event loop; the only place connections are bound to or
//! released from node ids.

use crate::error::LookupError;
use crate::transport::{ConnId, ConnectionHandle};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};
use wsn_wire::{Binding, NodeId};

/// Live connections by role
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Connections the dispatcher pushes frames to, by node
    outbound_data: HashMap<NodeId, ConnectionHandle>,
    /// Connections nodes send data on and receive Ack/Nack on, by node
    inbound_ack: HashMap<NodeId, ConnectionHandle>,
    /// Anonymous stimulus sources
    stimulus_sources: HashMap<ConnId, ConnectionHandle>,
    /// Anonymous CoAP request sources
    coap_sources: HashMap<ConnId, ConnectionHandle>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handle` under `binding`.
    ///
    /// Returns the connection previously occupying the same (role, node id)
    /// slot, left for the caller to dispose of.
    pub fn register(
        &mut self,
        binding: Binding,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        info!("Registering connection {} as {}", handle.id(), binding);
        match binding {
            Binding::OutboundData(id) => self.outbound_data.insert(id, handle),
            Binding::InboundDataOutboundAck(id) => self.inbound_ack.insert(id, handle),
            Binding::StimulusSource => self.stimulus_sources.insert(handle.id(), handle),
            Binding::CoapRequestSource => self.coap_sources.insert(handle.id(), handle),
        }
    }

    /// Release both data connections of `node_id`, shutting each down.
    ///
    /// Returns how many connections were removed; zero is not an error.
    pub fn unregister(&mut self, node_id: NodeId) -> usize {
        let mut removed = 0;
        for handle in [
            self.outbound_data.remove(&node_id),
            self.inbound_ack.remove(&node_id),
        ]
        .into_iter()
        .flatten()
        {
            handle.shutdown();
            removed += 1;
        }
        if removed > 0 {
            info!("Unregistered node {:#06x} ({} connections)", node_id, removed);
        }
        removed
    }

    /// Drop an anonymous source connection
    pub fn remove_source(&mut self, conn: ConnId) -> Option<Binding> {
        if let Some(handle) = self.stimulus_sources.remove(&conn) {
            handle.shutdown();
            debug!("Removed stimulus source {}", conn);
            return Some(Binding::StimulusSource);
        }
        if let Some(handle) = self.coap_sources.remove(&conn) {
            handle.shutdown();
            debug!("Removed CoAP source {}", conn);
            return Some(Binding::CoapRequestSource);
        }
        None
    }

    /// Node id owning an inbound data / outbound ack connection
    pub fn reverse_lookup(&self, conn: ConnId) -> Result<NodeId, LookupError> {
        self.inbound_ack
            .iter()
            .find(|(_, handle)| handle.id() == conn)
            .map(|(id, _)| *id)
            .ok_or(LookupError(conn))
    }

    /// Where a connection is registered, if anywhere
    pub fn locate(&self, conn: ConnId) -> Option<Binding> {
        if self.stimulus_sources.contains_key(&conn) {
            return Some(Binding::StimulusSource);
        }
        if self.coap_sources.contains_key(&conn) {
            return Some(Binding::CoapRequestSource);
        }
        if let Ok(id) = self.reverse_lookup(conn) {
            return Some(Binding::InboundDataOutboundAck(id));
        }
        self.outbound_data
            .iter()
            .find(|(_, handle)| handle.id() == conn)
            .map(|(id, _)| Binding::OutboundData(*id))
    }

    /// Nodes currently able to receive data: the broadcast candidates
    pub fn all_outbound_data_ids(&self) -> BTreeSet<NodeId> {
        self.outbound_data.keys().copied().collect()
    }

    /// Nodes with an inbound data / outbound ack connection
    pub fn inbound_ack_ids(&self) -> BTreeSet<NodeId> {
        self.inbound_ack.keys().copied().collect()
    }

    /// Outbound data connection of a node
    pub fn outbound_data(&self, node_id: NodeId) -> Option<&ConnectionHandle> {
        self.outbound_data.get(&node_id)
    }

    /// Inbound data / outbound ack connection of a node
    pub fn inbound_ack(&self, node_id: NodeId) -> Option<&ConnectionHandle> {
        self.inbound_ack.get(&node_id)
    }

    /// Whether `conn` is a registered stimulus source
    pub fn is_stimulus_source(&self, conn: ConnId) -> bool {
        self.stimulus_sources.contains_key(&conn)
    }

    /// Whether `conn` is a registered CoAP source
    pub fn is_coap_source(&self, conn: ConnId) -> bool {
        self.coap_sources.contains_key(&conn)
    }

    /// Number of stimulus sources
    pub fn stimulus_source_count(&self) -> usize {
        self.stimulus_sources.len()
    }

    /// Number of CoAP sources
    pub fn coap_source_count(&self) -> usize {
        self.coap_sources.len()
    }

    /// Total number of registered connections
    pub fn len(&self) -> usize {
        self.outbound_data.len()
            + self.inbound_ack.len()
            + self.stimulus_sources.len()
            + self.coap_sources.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shut down every connection
    pub fn clear(&mut self) {
        let handles = self
            .outbound_data
            .drain()
            .map(|(_, h)| h)
            .chain(self.inbound_ack.drain().map(|(_, h)| h))
            .chain(self.stimulus_sources.drain().map(|(_, h)| h))
            .chain(self.coap_sources.drain().map(|(_, h)| h));
        for handle in handles {
            handle.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_roles_are_independent() {
        let mut registry = ConnectionRegistry::new();
        let (out, _out_rx) = ConnectionHandle::pair(1);
        let (ack, _ack_rx) = ConnectionHandle::pair(2);

        assert!(registry.register(Binding::OutboundData(10), out).is_none());
        assert_eq!(registry.all_outbound_data_ids().into_iter().collect::<Vec<_>>(), vec![10]);
        assert!(registry.inbound_ack(10).is_none());

        assert!(registry
            .register(Binding::InboundDataOutboundAck(10), ack)
            .is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_registration_returns_previous() {
        let mut registry = ConnectionRegistry::new();
        let (first, _rx1) = ConnectionHandle::pair(1);
        let (second, _rx2) = ConnectionHandle::pair(2);

        registry.register(Binding::OutboundData(4), first);
        let displaced = registry.register(Binding::OutboundData(4), second).unwrap();
        assert_eq!(displaced.id(), 1);
        assert_eq!(registry.outbound_data(4).unwrap().id(), 2);
    }

    #[test]
    fn test_reverse_lookup_only_searches_ack_role() {
        let mut registry = ConnectionRegistry::new();
        let (out, _rx1) = ConnectionHandle::pair(1);
        let (ack, _rx2) = ConnectionHandle::pair(2);
        registry.register(Binding::OutboundData(3), out);
        registry.register(Binding::InboundDataOutboundAck(3), ack);

        assert_eq!(registry.reverse_lookup(2), Ok(3));
        assert_eq!(registry.reverse_lookup(1), Err(LookupError(1)));
        assert_eq!(registry.locate(1), Some(Binding::OutboundData(3)));
        assert_eq!(registry.locate(99), None);
    }

    #[tokio::test]
    async fn test_unregister_removes_both_roles_and_closes() {
        let mut registry = ConnectionRegistry::new();
        let (out, mut out_rx) = ConnectionHandle::pair(1);
        let (ack, mut ack_rx) = ConnectionHandle::pair(2);
        registry.register(Binding::OutboundData(8), out);
        registry.register(Binding::InboundDataOutboundAck(8), ack);

        assert_eq!(registry.unregister(8), 2);
        assert!(registry.is_empty());
        // Handles were dropped, so the writer side sees the channel close
        assert!(out_rx.recv().await.is_none());
        assert!(ack_rx.recv().await.is_none());

        assert_eq!(registry.unregister(8), 0);
    }

    #[test]
    fn test_sources_are_anonymous() {
        let mut registry = ConnectionRegistry::new();
        let (stim, _rx1) = ConnectionHandle::pair(5);
        let (coap, _rx2) = ConnectionHandle::pair(6);
        registry.register(Binding::StimulusSource, stim);
        registry.register(Binding::CoapRequestSource, coap);

        assert!(registry.is_stimulus_source(5));
        assert!(registry.is_coap_source(6));
        assert!(registry.reverse_lookup(5).is_err());

        assert_eq!(registry.remove_source(6), Some(Binding::CoapRequestSource));
        assert_eq!(registry.coap_source_count(), 0);
        assert_eq!(registry.remove_source(6), None);
        assert_eq!(registry.stimulus_source_count(), 1);
    }
}
