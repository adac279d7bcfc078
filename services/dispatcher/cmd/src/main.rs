//! WSN dispatcher binary.
//!
//! Emulates the radio medium of a simulated sensor network: nodes connect
//! over TCP, and frames they send are relayed to every node the sender's
//! radio would reach according to the deployment topology.

use anyhow::Context;
use clap::Parser;
use std::{net::IpAddr, path::PathBuf, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wsn_session::{
    listen_tcp, Dispatcher, DispatcherOptions, FileStimulusSink, RoutingEngine, StimulusRecorder,
    TrafficTrace,
};
use wsn_topology::TopologyTable;

mod config;
#[macro_use]
mod logging;

use config::DispatcherConfig;
use logging::DispatcherLogFormatter;

/// Radio-link emulating dispatcher for simulated sensor nodes
#[derive(Parser, Debug)]
#[command(name = "wsn-dispatcher", version, about = "Radio-link emulating dispatcher")]
struct Args {
    /// Listen address, e.g. 0.0.0.0
    #[arg(long)]
    listen: Option<IpAddr>,

    /// Listen port for node connections
    #[arg(long)]
    port: Option<u16>,

    /// Topology file (.yml, .yaml, .toml or .json)
    #[arg(long)]
    topology: Option<PathBuf>,

    /// Stimulus audit log
    #[arg(long)]
    stimulus_log: Option<PathBuf>,

    /// Traffic trace CSV file
    #[arg(long)]
    trace_file: Option<PathBuf>,

    /// Stats log interval, e.g. 30s
    #[arg(long)]
    stats_interval: Option<humantime::Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

impl Args {
    /// Explicit flags win over file and environment
    fn apply_to(&self, config: &mut DispatcherConfig) {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(topology) = &self.topology {
            config.topology = topology.clone();
        }
        if let Some(stimulus_log) = &self.stimulus_log {
            config.stimulus_log = stimulus_log.clone();
        }
        if let Some(trace_file) = &self.trace_file {
            config.trace_file = Some(trace_file.clone());
        }
        if let Some(interval) = &self.stats_interval {
            config.stats_interval = Some(**interval);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut env_filter = EnvFilter::new("info");
    for target in [
        "wsn_dispatcher",
        "wsn_session",
        "wsn_wire",
        "wsn_routing",
        "wsn_topology",
    ] {
        env_filter = env_filter.add_directive(format!("{}={}", target, args.log_level).parse()?);
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(true)
        .event_format(DispatcherLogFormatter::new("dispatcher".to_string()))
        .init();

    info!("Starting WSN dispatcher v{}", env!("CARGO_PKG_VERSION"));

    let mut config = DispatcherConfig::load_from_file(&args.config)?;
    args.apply_to(&mut config);

    let topology = match TopologyTable::load(&config.topology) {
        Ok(topology) => topology,
        Err(e) => {
            error!(component = "topology", "Failed to load {:?}: {}", config.topology, e);
            return Err(e).context("topology is required");
        }
    };
    component_info!(
        "topology",
        "Loaded {} nodes from {:?}",
        topology.len(),
        config.topology
    );

    let recorder = StimulusRecorder::new(Box::new(FileStimulusSink::new(&config.stimulus_log)));
    component_info!("stimulus", "Recording stimuli to {:?}", config.stimulus_log);
    let mut engine = RoutingEngine::new(Arc::new(topology), recorder);

    if let Some(path) = &config.trace_file {
        let trace = TrafficTrace::create(path)
            .with_context(|| format!("failed to create traffic trace {:?}", path))?;
        component_info!("trace", "Tracing traffic to {:?}", path);
        engine = engine.with_trace(trace);
    }

    let listener = listen_tcp(config.socket_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.socket_addr()))?;

    let options = DispatcherOptions {
        stats_interval: config.stats_interval,
    };
    let (dispatcher, handle) = Dispatcher::new(engine, options);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                component_info!("signal", "Received Ctrl-C, shutting down");
                handle.shutdown();
            }
            Err(e) => component_warn!("signal", "Failed to listen for Ctrl-C: {}", e),
        }
    });

    dispatcher.run(listener).await;
    info!("Dispatcher stopped");
    Ok(())
}
