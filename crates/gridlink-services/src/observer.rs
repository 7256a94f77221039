//! Polls the record file and reports when a new grid lands.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use gridlink_core::grid::{grid_hash, GridStats};

/// Human summary of one record file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSummary {
    pub received_at: String,
    pub stats: GridStats,
    /// Raw byte count as recorded, or `None` when the record omits it.
    pub bytes: Option<u64>,
    pub hash: String,
}

impl std::fmt::Display for GridSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {} (", self.received_at, self.stats)?;
        match self.bytes {
            Some(bytes) => write!(f, "{bytes} bytes)"),
            None => f.write_str("n/a bytes)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// No record file yet.
    Missing,
    /// The file exists but could not be read as a record.
    Invalid(String),
    /// Same hash as the last reported record.
    Unchanged,
    Changed(GridSummary),
}

pub struct GridObserver {
    path: PathBuf,
    last_hash: Option<String>,
}

impl GridObserver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_hash: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file once. Reports `Changed` only the first time a given
    /// hash is seen.
    pub fn poll(&mut self) -> Observation {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Observation::Missing,
            Err(e) => return Observation::Invalid(e.to_string()),
        };
        let record: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => return Observation::Invalid(e.to_string()),
        };

        let summary = summarize(&record);
        if self.last_hash.as_deref() == Some(summary.hash.as_str()) {
            return Observation::Unchanged;
        }
        self.last_hash = Some(summary.hash.clone());
        Observation::Changed(summary)
    }
}

fn summarize(record: &Value) -> GridSummary {
    let grid = record.get("grid").cloned().unwrap_or(Value::Array(Vec::new()));
    let hash = record
        .get("hash")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| grid_hash(&grid));

    GridSummary {
        received_at: record
            .get("receivedAt")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        stats: GridStats::of(&grid),
        bytes: record.get("bytes").and_then(Value::as_u64),
        hash,
    }
}
