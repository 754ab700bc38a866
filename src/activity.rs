//! Reader for the worker's structured activity log.
//!
//! The worker appends one JSON record per line to `activity.log.jsonl`. This
//! side never writes it. Each read starts from the top of the file, skips
//! lines that do not parse and stops as soon as enough entries are collected.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

pub const ACTIVITY_LOG_FILE: &str = "activity.log.jsonl";

/// Default number of entries returned by a read.
pub const DEFAULT_LIMIT: usize = 1000;

/// Ceiling applied to caller-supplied limits.
pub const MAX_LIMIT: usize = 10_000;

/// One parsed record. The worker owns the schema, so the value is kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogEntry(pub serde_json::Value);

#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    pub fn new(logs_dir: &Path) -> Self {
        Self {
            path: logs_dir.join(ACTIVITY_LOG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lazily parsed entries in file order. A missing file yields nothing.
    pub fn entries(&self) -> Entries {
        let reader = match File::open(&self.path) {
            Ok(file) => Some(BufReader::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed to open activity log");
                None
            }
        };
        Entries {
            reader,
            buf: Vec::new(),
        }
    }

    /// At most `limit` entries from the start of the file.
    pub fn read(&self, limit: usize) -> Vec<LogEntry> {
        if limit == 0 {
            return Vec::new();
        }
        self.entries().take(limit).collect()
    }
}

/// Iterator over the parseable lines of the activity log.
pub struct Entries {
    reader: Option<BufReader<File>>,
    buf: Vec<u8>,
}

impl Iterator for Entries {
    type Item = LogEntry;

    fn next(&mut self) -> Option<LogEntry> {
        loop {
            let reader = self.reader.as_mut()?;
            self.buf.clear();
            match reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.reader = None;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "failed reading activity log");
                    self.reader = None;
                    return None;
                }
            }
            let line = String::from_utf8_lossy(&self.buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(value) => return Some(LogEntry(value)),
                Err(e) => tracing::trace!(error = %e, "skipping malformed activity log line"),
            }
        }
    }
}
