//! Dispatcher event loop.
//!
//! A single task owns the [`ConnectionRegistry`] and the [`RoutingEngine`].
//! It accepts connections, hands each one to a short-lived handshake task,
//! binds the result into the registry and reacts to everything the per
//! connection tasks report. Registry mutation only ever happens here.

use crate::engine::{EngineCounters, RoutingEngine};
use crate::handshake::accept_handshake;
use crate::registry::ConnectionRegistry;
use crate::transport::{
    spawn_coap_reader, spawn_frame_reader, spawn_writer, ConnId, ConnectionEvent,
    ConnectionHandle,
};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use wsn_wire::{Binding, NodeId, SocketRole};

/// Pause after a failed accept, so descriptor exhaustion cannot spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Event loop options
#[derive(Debug, Clone, Default)]
pub struct DispatcherOptions {
    /// Period of the stats log line; `None` disables it
    pub stats_interval: Option<Duration>,
}

/// Snapshot of the loop state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Nodes with an outbound data connection
    pub outbound_data: Vec<NodeId>,
    /// Nodes with an inbound data / outbound ack connection
    pub inbound_ack: Vec<NodeId>,
    /// Connected stimulus sources
    pub stimulus_sources: usize,
    /// Connected CoAP sources
    pub coap_sources: usize,
    /// Routing engine counters
    pub counters: EngineCounters,
    /// Handshakes that failed
    pub handshake_failures: u64,
}

impl fmt::Display for DispatcherStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "outbound={:?} inbound={:?} stimulus_sources={} coap_sources={} \
             frames={} delivered={} acks={} nacks={} stimuli={} coap={} handshake_failures={}",
            self.outbound_data,
            self.inbound_ack,
            self.stimulus_sources,
            self.coap_sources,
            self.counters.data_frames,
            self.counters.delivered,
            self.counters.acks,
            self.counters.nacks,
            self.counters.stimuli,
            self.counters.coap_requests,
            self.handshake_failures
        )
    }
}

#[derive(Debug)]
enum DispatcherCommand {
    Stats(oneshot::Sender<DispatcherStats>),
    Shutdown,
}

/// Control handle of a running dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    commands: mpsc::UnboundedSender<DispatcherCommand>,
}

impl DispatcherHandle {
    /// Ask the loop for a snapshot; `None` once the loop has stopped
    pub async fn stats(&self) -> Option<DispatcherStats> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(DispatcherCommand::Stats(tx)).ok()?;
        rx.await.ok()
    }

    /// Ask the loop to stop and close every connection
    pub fn shutdown(&self) {
        if self.commands.send(DispatcherCommand::Shutdown).is_err() {
            debug!("Dispatcher already stopped");
        }
    }
}

/// The dispatcher event loop
#[derive(Debug)]
pub struct Dispatcher {
    engine: RoutingEngine,
    registry: ConnectionRegistry,
    options: DispatcherOptions,
    next_conn: ConnId,
    handshake_failures: u64,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    events_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    commands_rx: mpsc::UnboundedReceiver<DispatcherCommand>,
}

impl Dispatcher {
    /// Create a dispatcher and its control handle
    pub fn new(engine: RoutingEngine, options: DispatcherOptions) -> (Self, DispatcherHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            engine,
            registry: ConnectionRegistry::new(),
            options,
            next_conn: 1,
            handshake_failures: 0,
            events_tx,
            events_rx,
            commands_rx,
        };
        (dispatcher, DispatcherHandle { commands: commands_tx })
    }

    /// Run until shutdown is requested through a [`DispatcherHandle`]
    pub async fn run(mut self, listener: TcpListener) {
        match listener.local_addr() {
            Ok(addr) => info!("Dispatcher listening on {}", addr),
            Err(e) => warn!("Dispatcher listening on unknown address: {}", e),
        }

        let mut stats_tick = self.options.stats_interval.map(stats_timer);
        let mut commands_open = true;

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_handshake(stream, peer),
                    Err(e) => accept_backoff(&e).await,
                },

                Some(event) = self.events_rx.recv() => self.handle_event(event),

                command = self.commands_rx.recv(), if commands_open => match command {
                    Some(DispatcherCommand::Stats(reply)) => {
                        let _ = reply.send(self.stats());
                    }
                    Some(DispatcherCommand::Shutdown) => {
                        info!("Dispatcher shutting down");
                        break;
                    }
                    None => commands_open = false,
                },

                _ = async {
                    match stats_tick.as_mut() {
                        Some(tick) => {
                            tick.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    info!("Dispatcher stats: {}", self.stats());
                }
            }
        }

        self.registry.clear();
    }

    /// Current snapshot
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            outbound_data: self.registry.all_outbound_data_ids().into_iter().collect(),
            inbound_ack: self.registry.inbound_ack_ids().into_iter().collect(),
            stimulus_sources: self.registry.stimulus_source_count(),
            coap_sources: self.registry.coap_source_count(),
            counters: self.engine.counters(),
            handshake_failures: self.handshake_failures,
        }
    }

    fn spawn_handshake(&self, mut stream: TcpStream, peer: SocketAddr) {
        debug!("Accepted connection from {}", peer);
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match accept_handshake(&mut stream).await {
                Ok(binding) => ConnectionEvent::Accepted {
                    stream,
                    peer,
                    binding,
                },
                Err(error) => ConnectionEvent::HandshakeFailed { peer, error },
            };
            let _ = events.send(event);
        });
    }

    fn attach(&mut self, stream: TcpStream, peer: SocketAddr, binding: Binding) {
        let conn = self.next_conn;
        self.next_conn += 1;

        let (read_half, write_half) = stream.into_split();
        let (outbound, frames) = mpsc::unbounded_channel();
        let mut handle = ConnectionHandle::new(conn, Some(peer), outbound);
        spawn_writer(conn, write_half, frames, self.events_tx.clone());

        let events = self.events_tx.clone();
        let reader = match binding.role() {
            SocketRole::OutboundData => None,
            SocketRole::InboundDataOutboundAck | SocketRole::StimulusSource => {
                Some(spawn_frame_reader(conn, read_half, events))
            }
            SocketRole::CoapRequestSource => Some(spawn_coap_reader(conn, read_half, events)),
        };
        if let Some(task) = reader {
            handle = handle.with_reader(task.abort_handle());
        }

        info!("Connection {} from {} bound as {}", conn, peer, binding);
        if let Some(displaced) = self.registry.register(binding, handle) {
            warn!(
                "Connection {} replaces connection {} as {}",
                conn,
                displaced.id(),
                binding
            );
            displaced.shutdown();
        }
    }

    fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Accepted {
                stream,
                peer,
                binding,
            } => self.attach(stream, peer, binding),

            ConnectionEvent::HandshakeFailed { peer, error } => {
                self.handshake_failures += 1;
                if error.is_closed() {
                    debug!("Peer {} left during handshake", peer);
                } else {
                    warn!("Handshake with {} failed: {}", peer, error);
                }
            }

            ConnectionEvent::Frame { conn, payload } => {
                if self.registry.is_stimulus_source(conn) {
                    if let Err(e) = self.engine.handle_stimulus(&mut self.registry, &payload) {
                        warn!("Dropping stimulus source {}: {}", conn, e);
                        self.registry.remove_source(conn);
                    }
                    return;
                }

                let sender = match self.registry.reverse_lookup(conn) {
                    Ok(node_id) => node_id,
                    Err(e) => {
                        debug!("Skipping frame: {}", e);
                        return;
                    }
                };
                if let Err(e) = self.engine.handle_incoming_data(&self.registry, sender, payload) {
                    warn!("Dropping node {}: {}", sender, e);
                    self.registry.unregister(sender);
                }
            }

            ConnectionEvent::CoapRequest {
                conn,
                node_id,
                message,
            } => {
                if !self.registry.is_coap_source(conn) {
                    debug!("Skipping CoAP request from stale connection {}", conn);
                    return;
                }
                if let Err(e) = self.engine.handle_coap_request(&self.registry, node_id, message) {
                    warn!("CoAP request for node {} not delivered: {}", node_id, e);
                }
            }

            ConnectionEvent::Closed { conn, error } => match self.registry.locate(conn) {
                Some(Binding::StimulusSource) | Some(Binding::CoapRequestSource) => {
                    debug!("Source connection {} closed: {}", conn, error);
                    self.registry.remove_source(conn);
                }
                Some(binding) => {
                    if error.is_closed() {
                        info!("Connection {} ({}) closed by peer", conn, binding);
                    } else {
                        warn!("Connection {} ({}) failed: {}", conn, binding, error);
                    }
                    if let Some(node_id) = binding.node_id() {
                        self.registry.unregister(node_id);
                    }
                }
                None => debug!("Ignoring close of released connection {}", conn),
            },
        }
    }
}

/// Stats timer whose first tick is one full period away
fn stats_timer(period: Duration) -> Interval {
    let mut tick = tokio::time::interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick
}

async fn accept_backoff(error: &std::io::Error) {
    warn!(
        "Failed to accept connection, retrying in {:?}: {}",
        ACCEPT_BACKOFF, error
    );
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}
