//! Stimulus audit log.
//!
//! Every decoded stimulus is appended to a sink as
//! `elapsed_secs, node_id, category, channel, value`, where elapsed time is
//! counted from one second before the first stimulus ever seen.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;
use wsn_wire::{NodeId, SensorCategory, StimulusRequest};

/// Offset applied to the first stimulus so its elapsed time reads 1
const START_OFFSET: Duration = Duration::from_secs(1);

/// One audit record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StimulusLogEntry {
    /// Whole seconds since the reference start time
    pub elapsed_secs: u64,
    /// Target node
    pub node_id: NodeId,
    /// Decoded sensor category
    pub category: SensorCategory,
    /// Sensor channel
    pub channel: u8,
    /// Stimulus value
    pub value: u8,
}

impl fmt::Display for StimulusLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}, {}",
            self.elapsed_secs, self.node_id, self.category, self.channel, self.value
        )
    }
}

/// Append-only destination for stimulus records
pub trait StimulusSink: Send {
    /// Append one record
    fn append(&mut self, entry: &StimulusLogEntry) -> std::io::Result<()>;
}

/// Appends records as text lines to a file, creating it on first use
#[derive(Debug, Clone)]
pub struct FileStimulusSink {
    path: PathBuf,
}

impl FileStimulusSink {
    /// Sink writing to `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Target path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StimulusSink for FileStimulusSink {
    fn append(&mut self, entry: &StimulusLogEntry) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", entry)
    }
}

/// Keeps records in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemoryStimulusSink {
    entries: Arc<Mutex<Vec<StimulusLogEntry>>>,
}

impl MemoryStimulusSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records appended so far
    pub fn entries(&self) -> Vec<StimulusLogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl StimulusSink for MemoryStimulusSink {
    fn append(&mut self, entry: &StimulusLogEntry) -> std::io::Result<()> {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(*entry),
            Err(poisoned) => poisoned.into_inner().push(*entry),
        }
        Ok(())
    }
}

/// Turns stimuli into audit records
pub struct StimulusRecorder {
    started: Option<Instant>,
    sink: Box<dyn StimulusSink>,
}

impl StimulusRecorder {
    /// Recorder writing to `sink`
    pub fn new(sink: Box<dyn StimulusSink>) -> Self {
        Self {
            started: None,
            sink,
        }
    }

    /// Reference start time, set by the first recorded stimulus
    pub fn started(&self) -> Option<Instant> {
        self.started
    }

    /// Record a stimulus; sink failures are logged and swallowed
    pub fn record(&mut self, request: &StimulusRequest) -> StimulusLogEntry {
        let now = Instant::now();
        let started = *self
            .started
            .get_or_insert_with(|| now.checked_sub(START_OFFSET).unwrap_or(now));

        let entry = StimulusLogEntry {
            elapsed_secs: now.saturating_duration_since(started).as_secs(),
            node_id: request.node_id,
            category: request.category(),
            channel: request.channel(),
            value: request.value,
        };

        if let Err(e) = self.sink.append(&entry) {
            warn!("Failed to append stimulus record: {}", e);
        }
        entry
    }
}

impl fmt::Debug for StimulusRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StimulusRecorder")
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(node_id: NodeId, sensor: u8, value: u8) -> StimulusRequest {
        StimulusRequest {
            node_id,
            sensor,
            value,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_time_is_monotonic() {
        let sink = MemoryStimulusSink::new();
        let mut recorder = StimulusRecorder::new(Box::new(sink.clone()));

        tokio::time::advance(Duration::from_millis(500)).await;
        let first = recorder.record(&request(3, 0x21, 7));
        tokio::time::advance(Duration::from_secs(1)).await;
        let second = recorder.record(&request(3, 0x21, 8));

        assert_eq!(first.elapsed_secs, 1);
        assert_eq!(second.elapsed_secs, 2);
        assert_eq!(sink.entries(), vec![first, second]);
    }

    #[test]
    fn test_entry_line_format() {
        let entry = StimulusLogEntry {
            elapsed_secs: 4,
            node_id: 12,
            category: SensorCategory::Seismic,
            channel: 1,
            value: 200,
        };
        assert_eq!(entry.to_string(), "4, 12, SEISMIC, 1, 200");
    }

    #[tokio::test]
    async fn test_file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dumped_stimulus.log");
        let mut recorder = StimulusRecorder::new(Box::new(FileStimulusSink::new(&path)));

        recorder.record(&request(1, 0x00, 1));
        recorder.record(&request(2, 0x13, 2));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(", 1, PIR, 0, 1"));
        assert!(lines[1].ends_with(", 2, SPIRIT, 3, 2"));
    }

    #[tokio::test]
    async fn test_sink_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending
        let mut recorder =
            StimulusRecorder::new(Box::new(FileStimulusSink::new(dir.path())));
        let entry = recorder.record(&request(1, 0x20, 9));
        assert_eq!(entry.category, SensorCategory::Seismic);
        assert!(recorder.started().is_some());
    }
}
