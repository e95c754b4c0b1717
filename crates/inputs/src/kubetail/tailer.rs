//! Per-file follower
//!
//! One task per watched log file. The follower polls for new complete
//! lines from its last position, parses the container runtime's JSON
//! line format, and emits records. Rotation (inode change) and
//! truncation both rewind to the start of the file; a partial line at
//! EOF is left in place until its newline arrives.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use haul_protocol::Record;
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Poll cadence for new lines.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// One line of container runtime output.
#[derive(Debug, Deserialize)]
struct ContainerLine {
    log: String,
    #[serde(default)]
    #[allow(dead_code)]
    stream: String,
    #[serde(default)]
    time: String,
}

/// Follower state for one file.
pub(crate) struct Tailer {
    path: PathBuf,
    hostname: String,
    tag: String,
    position: u64,
    #[cfg(unix)]
    inode: Option<u64>,
    /// Per-file parse failures; counted, never surfaced.
    parse_errors: Arc<AtomicU64>,
    records: mpsc::Sender<Record>,
}

impl Tailer {
    pub(crate) fn new(
        path: PathBuf,
        hostname: String,
        tag: String,
        seek_to_end: bool,
        parse_errors: Arc<AtomicU64>,
        records: mpsc::Sender<Record>,
    ) -> Self {
        // Startup-scanned files seek to end so a restart does not
        // rebroadcast history; freshly created files read from zero.
        let position = if seek_to_end {
            std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0)
        } else {
            0
        };
        #[cfg(unix)]
        let inode = {
            use std::os::unix::fs::MetadataExt;
            std::fs::metadata(&path).map(|m| m.ino()).ok()
        };

        Self {
            path,
            hostname,
            tag,
            position,
            #[cfg(unix)]
            inode,
            parse_errors,
            records,
        }
    }

    /// Follow the file until cancelled or the record stream closes.
    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        let mut poll = tokio::time::interval(POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if !self.read_new_lines().await {
                        return;
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::debug!(path = %self.path.display(), "tailer stopping");
                    return;
                }
            }
        }
    }

    /// Detect rotation by inode change; rewind when seen.
    #[cfg(unix)]
    fn check_rotation(&mut self, metadata: &std::fs::Metadata) {
        use std::os::unix::fs::MetadataExt;
        let current = metadata.ino();
        if let Some(previous) = self.inode {
            if previous != current {
                tracing::debug!(path = %self.path.display(), "rotation detected, rewinding");
                self.position = 0;
            }
        }
        self.inode = Some(current);
    }

    #[cfg(not(unix))]
    fn check_rotation(&mut self, _metadata: &std::fs::Metadata) {}

    /// Read every complete new line since the last position. Returns
    /// false when the record stream has closed.
    async fn read_new_lines(&mut self) -> bool {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            // The file may be mid-rotation or already removed; the
            // directory watcher owns the lifecycle decision.
            Err(_) => return true,
        };
        let metadata = match file.metadata().await {
            Ok(metadata) => metadata,
            Err(_) => return true,
        };

        self.check_rotation(&metadata);
        if metadata.len() < self.position {
            tracing::debug!(path = %self.path.display(), "file truncated, rewinding");
            self.position = 0;
        }

        let mut reader = BufReader::new(file);
        if reader.seek(SeekFrom::Start(self.position)).await.is_err() {
            return true;
        }

        let mut line = String::new();
        loop {
            line.clear();
            let n = match reader.read_line(&mut line).await {
                Ok(n) => n,
                Err(_) => return true,
            };
            if n == 0 {
                return true;
            }
            if !line.ends_with('\n') {
                // Partial line; re-read once the writer finishes it.
                return true;
            }
            self.position += n as u64;

            match self.parse(&line) {
                Some(record) => {
                    if self.records.send(record).await.is_err() {
                        return false;
                    }
                }
                None => {
                    self.parse_errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// One JSON line to one record. An unparseable `time` becomes "now".
    fn parse(&self, line: &str) -> Option<Record> {
        let parsed: ContainerLine = serde_json::from_str(line.trim_end()).ok()?;
        let timestamp = DateTime::parse_from_rfc3339(&parsed.time)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Some(Record::new(
            0,
            0,
            timestamp,
            self.hostname.clone(),
            self.tag.clone(),
            parsed.log,
        ))
    }
}

#[cfg(test)]
#[path = "tailer_test.rs"]
mod tailer_test;
