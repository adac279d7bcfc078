//! Traffic trace.
//!
//! CSV log of data frames crossing the dispatcher, one line per frame:
//! `timestamp, type, node_id, msg_length, cost`. `send` lines are frames a
//! node emitted, `recv` lines are Data packets handed to a node.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tokio::time::Instant;
use tracing::warn;
use wsn_wire::NodeId;

const HEADER: &str = "timestamp, type, node_id, msg_length, cost";

/// Direction of a traced frame, from the node's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    /// Node emitted the frame
    Send,
    /// Node was handed the frame
    Recv,
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceKind::Send => write!(f, "send"),
            TraceKind::Recv => write!(f, "recv"),
        }
    }
}

/// Traffic trace writer
pub struct TrafficTrace {
    started: Instant,
    out: Box<dyn Write + Send>,
}

impl TrafficTrace {
    /// Create (or truncate) a trace file and write its header
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Self::from_writer(Box::new(BufWriter::new(file)))
    }

    /// Trace into an arbitrary writer
    pub fn from_writer(mut out: Box<dyn Write + Send>) -> std::io::Result<Self> {
        writeln!(out, "{}", HEADER)?;
        out.flush()?;
        Ok(Self {
            started: Instant::now(),
            out,
        })
    }

    /// Append one line; failures are logged and swallowed
    pub fn record(&mut self, kind: TraceKind, node_id: NodeId, len: usize) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let result = writeln!(
            self.out,
            "{:.6}, {}, {}, {}, {:.6}",
            elapsed, kind, node_id, len, 0.0
        )
        .and_then(|_| self.out.flush());
        if let Err(e) = result {
            warn!("Failed to write traffic trace: {}", e);
        }
    }
}

impl fmt::Debug for TrafficTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrafficTrace")
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}
