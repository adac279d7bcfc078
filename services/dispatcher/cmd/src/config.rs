//! Configuration handling for the dispatcher service.
//!
//! Values come from the shared YAML config file, then from environment
//! variables, then from command line flags applied by `main`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Dispatcher service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Address the node listener binds to
    pub listen: IpAddr,
    /// Port of the node listener
    pub port: u16,
    /// Topology file (YAML, TOML or JSON)
    pub topology: PathBuf,
    /// Stimulus audit log
    pub stimulus_log: PathBuf,
    /// Optional traffic trace CSV
    pub trace_file: Option<PathBuf>,
    /// Period of the stats log line
    pub stats_interval: Option<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            listen: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9000,
            topology: PathBuf::from("topology.yml"),
            stimulus_log: PathBuf::from("dumped_stimulus.log"),
            trace_file: None,
            stats_interval: Some(Duration::from_secs(60)),
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    services: Option<ServicesConfig>,
}

#[derive(Debug, Deserialize)]
struct ServicesConfig {
    dispatcher: Option<ServiceConfig>,
}

#[derive(Debug, Deserialize)]
struct ServiceConfig {
    args: Option<Vec<String>>,
    config: Option<HashMap<String, String>>,
}

impl DispatcherConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root_config) => {
                    config.apply_root_config(root_config);
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => warn!(
                    "Failed to parse config file {:?}, using defaults: {}",
                    config_path.as_ref(),
                    e
                ),
            },
            Err(_) => warn!(
                "Config file {:?} not found, using defaults",
                config_path.as_ref()
            ),
        }

        config.apply_overrides(|key| std::env::var(key).ok());

        info!(
            "Final dispatcher configuration: listen={}, topology={:?}, stimulus_log={:?}, trace_file={:?}",
            config.socket_addr(),
            config.topology,
            config.stimulus_log,
            config.trace_file
        );

        Ok(config)
    }

    /// Address the node listener binds to
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen, self.port)
    }

    fn apply_root_config(&mut self, root_config: RootConfig) {
        if let Some(service) = root_config.services.and_then(|s| s.dispatcher) {
            self.apply_service_config(service);
        }
    }

    fn apply_service_config(&mut self, service_config: ServiceConfig) {
        if let Some(args) = service_config.args {
            for arg in args {
                if let Some((flag, value)) = arg.split_once('=') {
                    if let Some(name) = flag.strip_prefix("--") {
                        self.apply_value(&name.replace('-', "_"), value);
                        continue;
                    }
                }
                warn!("Ignoring malformed dispatcher argument: {:?}", arg);
            }
        }

        if let Some(config_map) = service_config.config {
            for (key, value) in config_map {
                match key.strip_prefix("services.dispatcher.") {
                    Some(name) => {
                        self.apply_value(name, &value);
                    }
                    None => warn!("Ignoring configuration key outside the dispatcher: {}", key),
                }
            }
        }
    }

    /// Apply environment variable overrides through `lookup`
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (var, name) in [
            ("DISPATCHER_LISTEN", "listen"),
            ("DISPATCHER_PORT", "port"),
            ("DISPATCHER_TOPOLOGY", "topology"),
            ("DISPATCHER_STIMULUS_LOG", "stimulus_log"),
            ("DISPATCHER_TRACE_FILE", "trace_file"),
        ] {
            if let Some(value) = lookup(var) {
                if self.apply_value(name, &value) {
                    info!("{} overridden by environment: {}", name, value);
                }
            }
        }
    }

    /// Set one named value; returns whether it was applied.
    ///
    /// Unknown names and unparsable values are logged and leave the
    /// configuration untouched.
    fn apply_value(&mut self, name: &str, value: &str) -> bool {
        match name {
            "listen" => match value.parse() {
                Ok(addr) => self.listen = addr,
                Err(_) => return invalid(name, value),
            },
            "port" => match value.parse() {
                Ok(port) => self.port = port,
                Err(_) => return invalid(name, value),
            },
            "topology" => self.topology = PathBuf::from(value),
            "stimulus_log" => self.stimulus_log = PathBuf::from(value),
            "trace_file" => {
                self.trace_file = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            "stats_interval" => match value {
                "off" | "0" => self.stats_interval = None,
                _ => match humantime::parse_duration(value) {
                    Ok(period) => self.stats_interval = Some(period),
                    Err(_) => return invalid(name, value),
                },
            },
            _ => {
                warn!("Ignoring unknown configuration key: {}", name);
                return false;
            }
        }
        true
    }
}

fn invalid(name: &str, value: &str) -> bool {
    warn!("Ignoring invalid value for {}: {:?}", name, value);
    false
}
