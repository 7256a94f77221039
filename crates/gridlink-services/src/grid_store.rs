//! Grid record persistence: the JSON file the status observer watches.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use gridlink_core::GridRecord;

/// Writes and reads the record file.
#[derive(Debug, Clone)]
pub struct GridStore {
    path: PathBuf,
}

impl GridStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the record file atomically (write temp, then rename).
    /// Returns the size of the written file.
    pub fn save(&self, record: &GridRecord) -> io::Result<u64> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "grid.json".to_string());
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let tmp = dir.join(format!("{file_name}.{}.{nanos}.tmp", std::process::id()));

        let text = serde_json::to_string_pretty(record).map_err(io::Error::other)?;
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(text.as_bytes())?;
            file.sync_all()?;
        }
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }

        let size = std::fs::metadata(&self.path)?.len();
        tracing::info!(path = %self.path.display(), size, hash = %record.hash, "grid record saved");
        Ok(size)
    }

    pub fn load(&self) -> io::Result<GridRecord> {
        let text = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
