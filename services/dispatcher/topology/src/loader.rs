//! Declarative node list loading.
//!
//! The node list is a map with a `nodes` array; each node carries an `id`
//! and a `phy` section with its position and emission range. Other keys
//! (build parameters, sensor descriptions) are ignored.
//!
//! ```yaml
//! nodes:
//!   - id: 1
//!     phy: { x: 0, y: 0, range: 120 }
//!   - id: 2
//!     phy: { x: 80, y: 40, range: 60 }
//! ```

use crate::{NodeEntry, TopologyTable};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use wsn_wire::NodeId;

/// Topology loading errors
#[derive(Error, Debug)]
pub enum TopologyError {
    /// File could not be read
    #[error("failed to read {path:?}: {source}")]
    Io {
        /// Path being read
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// File content does not match the node list shape
    #[error("failed to parse node list: {0}")]
    Parse(String),
    /// Unsupported file extension
    #[error("unsupported node list format: {0:?}")]
    Format(Option<String>),
    /// Same node id listed twice
    #[error("duplicate node id {0}")]
    DuplicateNode(NodeId),
    /// Node uses the broadcast address as its id
    #[error("node id {0:#06x} is reserved")]
    ReservedId(NodeId),
}

#[derive(Debug, Deserialize)]
struct NodeList {
    #[serde(default)]
    nodes: Vec<NodeSpec>,
}

#[derive(Debug, Deserialize)]
struct NodeSpec {
    id: NodeId,
    phy: PhySpec,
}

#[derive(Debug, Deserialize)]
struct PhySpec {
    x: i32,
    y: i32,
    range: u32,
}

/// Supported node list encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeListFormat {
    /// YAML document
    Yaml,
    /// TOML document
    Toml,
    /// JSON document
    Json,
}

impl NodeListFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, TopologyError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(NodeListFormat::Yaml),
            Some("toml") => Ok(NodeListFormat::Toml),
            Some("json") => Ok(NodeListFormat::Json),
            _ => Err(TopologyError::Format(ext)),
        }
    }
}

impl TopologyTable {
    /// Load a node list from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TopologyError> {
        let path = path.as_ref();
        let format = NodeListFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|source| TopologyError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let table = Self::parse(&content, format)?;
        info!("Loaded topology with {} nodes from {:?}", table.len(), path);
        Ok(table)
    }

    /// Parse a node list held in memory
    pub fn parse(content: &str, format: NodeListFormat) -> Result<Self, TopologyError> {
        let list: NodeList = match format {
            NodeListFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| TopologyError::Parse(e.to_string()))?
            }
            NodeListFormat::Toml => {
                toml::from_str(content).map_err(|e| TopologyError::Parse(e.to_string()))?
            }
            NodeListFormat::Json => {
                serde_json::from_str(content).map_err(|e| TopologyError::Parse(e.to_string()))?
            }
        };

        let entries = list.nodes.into_iter().map(|spec| {
            debug!(
                "Node {} at ({}, {}) with range {}",
                spec.id, spec.phy.x, spec.phy.y, spec.phy.range
            );
            NodeEntry::new(spec.id, spec.phy.x, spec.phy.y, spec.phy.range)
        });
        TopologyTable::new(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_parse_yaml_ignores_extra_keys() {
        let yaml = r#"
network:
  failure_handling: true
nodes:
  - id: 1
    area: 3
    simulation: true
    phy: { x: 0, y: 0, range: 10 }
  - id: 2
    phy:
      x: 6
      y: 8
      range: 20
"#;
        let table = TopologyTable::parse(yaml, NodeListFormat::Yaml).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(2).unwrap().position.y, 8);
    }

    #[test]
    fn test_parse_toml_and_json() {
        let toml = r#"
[[nodes]]
id = 4
phy = { x = -5, y = 5, range = 3 }
"#;
        let table = TopologyTable::parse(toml, NodeListFormat::Toml).unwrap();
        assert_eq!(table.get(4).unwrap().position.x, -5);

        let json = r#"{"nodes":[{"id":9,"phy":{"x":1,"y":1,"range":1}}]}"#;
        let table = TopologyTable::parse(json, NodeListFormat::Json).unwrap();
        assert!(table.contains(9));
    }

    #[test]
    fn test_parse_rejects_missing_phy() {
        let yaml = "nodes:\n  - id: 1\n";
        assert!(matches!(
            TopologyTable::parse(yaml, NodeListFormat::Yaml),
            Err(TopologyError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(b"nodes:\n  - id: 12\n    phy: { x: 1, y: 2, range: 3 }\n")
            .unwrap();

        let table = TopologyTable::load(file.path()).unwrap();
        assert_eq!(table.node_ids(), vec![12]);
    }

    #[test]
    fn test_unknown_extension() {
        assert!(matches!(
            NodeListFormat::from_path(Path::new("network.xml")),
            Err(TopologyError::Format(Some(_)))
        ));
        assert!(TopologyTable::load("/nonexistent/network.yaml").is_err());
    }
}
