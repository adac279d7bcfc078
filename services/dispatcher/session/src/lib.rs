//! Connection management and routing for the WSN dispatcher.
//!
//! This crate owns everything that touches a live connection: the TCP
//! transport tasks, the registration handshake, the connection registry,
//! the routing engine and the event loop tying them together.
//!
//! ## Features
//!
//! - **Transport**: per-connection reader and writer tasks feeding one loop
//! - **Handshake**: role byte plus node id for data connections
//! - **Registry**: node ids bound to outbound and ack connections
//! - **Routing**: geometric unicast with Ack/Nack, unacknowledged broadcast
//! - **Injection**: stimulus and CoAP side channels
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wsn_session::{
//!     listen_tcp, Dispatcher, DispatcherOptions, FileStimulusSink, RoutingEngine,
//!     StimulusRecorder,
//! };
//! use wsn_topology::TopologyTable;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let topology = Arc::new(TopologyTable::load("topology.yml")?);
//! let recorder = StimulusRecorder::new(Box::new(FileStimulusSink::new("dumped_stimulus.log")));
//! let engine = RoutingEngine::new(topology, recorder);
//!
//! let listener = listen_tcp("127.0.0.1:9000".parse()?).await?;
//! let (dispatcher, handle) = Dispatcher::new(engine, DispatcherOptions::default());
//! tokio::spawn(dispatcher.run(listener));
//!
//! if let Some(stats) = handle.stats().await {
//!     println!("{}", stats);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod registry;
pub mod stimulus;
pub mod trace;
pub mod transport;

pub use client::NodeClient;
pub use dispatcher::{Dispatcher, DispatcherHandle, DispatcherOptions, DispatcherStats};
pub use engine::{EngineCounters, RoutingEngine};
pub use error::{CommunicationError, LookupError};
pub use handshake::{accept_handshake, send_handshake};
pub use registry::ConnectionRegistry;
pub use stimulus::{
    FileStimulusSink, MemoryStimulusSink, StimulusLogEntry, StimulusRecorder, StimulusSink,
};
pub use trace::{TraceKind, TrafficTrace};
pub use transport::{
    connect_tcp, listen_tcp, spawn_coap_reader, spawn_frame_reader, spawn_writer, ConnId,
    ConnectionEvent, ConnectionHandle,
};
