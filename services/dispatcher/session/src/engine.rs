//! Routing engine.
//!
//! Turns frames read by the event loop into deliveries: node data is routed
//! through the reachability model and acknowledged, stimuli and CoAP
//! requests are injected straight into the target node's outbound data
//! connection.

use crate::error::CommunicationError;
use crate::registry::ConnectionRegistry;
use crate::stimulus::StimulusRecorder;
use crate::trace::{TraceKind, TrafficTrace};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wsn_routing::{decide, DropReason, RoutingDecision};
use wsn_topology::TopologyTable;
use wsn_wire::{IncomingData, NodeId, OutgoingPacket, SensorCategory, StimulusRequest};

/// Running totals kept by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCounters {
    /// Data frames received from nodes
    pub data_frames: u64,
    /// Data packets handed to nodes
    pub delivered: u64,
    /// Acks sent
    pub acks: u64,
    /// Nacks sent
    pub nacks: u64,
    /// Stimuli received
    pub stimuli: u64,
    /// CoAP requests received
    pub coap_requests: u64,
}

/// Routing engine state
#[derive(Debug)]
pub struct RoutingEngine {
    topology: Arc<TopologyTable>,
    stimuli: StimulusRecorder,
    trace: Option<TrafficTrace>,
    counters: EngineCounters,
}

impl RoutingEngine {
    /// Create an engine over a topology
    pub fn new(topology: Arc<TopologyTable>, stimuli: StimulusRecorder) -> Self {
        Self {
            topology,
            stimuli,
            trace: None,
            counters: EngineCounters::default(),
        }
    }

    /// Enable the traffic trace
    pub fn with_trace(mut self, trace: TrafficTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Topology used for reachability
    pub fn topology(&self) -> &TopologyTable {
        &self.topology
    }

    /// Counters so far
    pub fn counters(&self) -> EngineCounters {
        self.counters
    }

    /// Push a packet to a node's outbound data connection.
    ///
    /// Returns the encoded packet length.
    pub fn deliver(
        &mut self,
        registry: &ConnectionRegistry,
        node_id: NodeId,
        packet: &OutgoingPacket,
    ) -> Result<usize, CommunicationError> {
        let handle = registry
            .outbound_data(node_id)
            .ok_or(CommunicationError::Resolution {
                node: node_id,
                reason: DropReason::NotConnected,
            })?;
        let len = handle.send(packet)?;

        if let OutgoingPacket::Data(_) = packet {
            self.counters.delivered += 1;
            if let Some(trace) = self.trace.as_mut() {
                trace.record(TraceKind::Recv, node_id, len);
            }
        }
        debug!("Delivered {:?} packet to node {} ({} bytes)", packet.kind(), node_id, len);
        Ok(len)
    }

    /// Route an application payload from `sender` to `target`.
    ///
    /// Broadcasts never fail as a whole; per-target failures are logged and
    /// the remaining targets still get the payload. Returns the number of
    /// nodes the payload was handed to.
    pub fn route_data(
        &mut self,
        registry: &ConnectionRegistry,
        sender: NodeId,
        target: NodeId,
        payload: Bytes,
    ) -> Result<usize, CommunicationError> {
        let decision = decide(
            self.topology.as_ref(),
            sender,
            target,
            registry.all_outbound_data_ids(),
        );

        match decision {
            RoutingDecision::Broadcast(targets) => {
                let mut delivered = 0;
                for id in targets {
                    match self.deliver(registry, id, &OutgoingPacket::Data(payload.clone())) {
                        Ok(_) => delivered += 1,
                        Err(e) => warn!("Broadcast from {} to {} failed: {}", sender, id, e),
                    }
                }
                debug!("Broadcast from {} reached {} nodes", sender, delivered);
                Ok(delivered)
            }
            RoutingDecision::Unicast(id) => {
                self.deliver(registry, id, &OutgoingPacket::Data(payload))?;
                Ok(1)
            }
            RoutingDecision::Drop { target, reason } => {
                Err(CommunicationError::Resolution { node: target, reason })
            }
        }
    }

    /// Handle one data frame read from `sender`'s inbound data connection.
    ///
    /// Unicasts are answered with an Ack or Nack on the same connection.
    /// Only a malformed frame is an error.
    pub fn handle_incoming_data(
        &mut self,
        registry: &ConnectionRegistry,
        sender: NodeId,
        frame: Bytes,
    ) -> Result<(), CommunicationError> {
        self.counters.data_frames += 1;
        if let Some(trace) = self.trace.as_mut() {
            trace.record(TraceKind::Send, sender, frame.len());
        }

        let data = IncomingData::decode(frame)?;
        let target = data.target;
        let broadcast = data.is_broadcast();
        let result = self.route_data(registry, sender, target, data.payload);

        if broadcast {
            return Ok(());
        }

        let reply = match result {
            Ok(_) => {
                self.counters.acks += 1;
                OutgoingPacket::Ack(target)
            }
            Err(e) => {
                info!("Unicast from {} to {} failed: {}", sender, target, e);
                self.counters.nacks += 1;
                OutgoingPacket::Nack(target)
            }
        };

        match registry.inbound_ack(sender) {
            Some(handle) => {
                if let Err(e) = handle.send(&reply) {
                    warn!("Failed to send {:?} to node {}: {}", reply.kind(), sender, e);
                }
            }
            None => warn!("Node {} has no ack connection for {:?}", sender, reply.kind()),
        }
        Ok(())
    }

    /// Handle one frame from a stimulus source.
    ///
    /// A node that cannot take the stimulus is unregistered; only a
    /// malformed frame is an error.
    pub fn handle_stimulus(
        &mut self,
        registry: &mut ConnectionRegistry,
        frame: &[u8],
    ) -> Result<(), CommunicationError> {
        let request = StimulusRequest::decode(frame)?;
        self.counters.stimuli += 1;

        let entry = self.stimuli.record(&request);
        if let SensorCategory::Unknown(code) = entry.category {
            warn!("Stimulus for node {} has unknown sensor category {}", entry.node_id, code);
        }
        info!("Stimulus: {}", entry);

        if let Err(e) = self.deliver(registry, request.node_id, &request.to_packet()) {
            warn!("Stimulus delivery to node {} failed: {}", request.node_id, e);
            registry.unregister(request.node_id);
        }
        Ok(())
    }

    /// Inject a CoAP message into a node
    pub fn handle_coap_request(
        &mut self,
        registry: &ConnectionRegistry,
        node_id: NodeId,
        message: Bytes,
    ) -> Result<usize, CommunicationError> {
        self.counters.coap_requests += 1;
        debug!("CoAP request for node {} ({} bytes)", node_id, message.len());
        self.deliver(registry, node_id, &OutgoingPacket::Coap(message))
    }
}
