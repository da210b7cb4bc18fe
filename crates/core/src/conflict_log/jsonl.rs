//! One JSON object per line, appended.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::LogError;

use super::ConflictLogEntry;

#[derive(Debug)]
pub struct JsonlLog {
    path: PathBuf,
    file: File,
}

impl JsonlLog {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn open(path: &Path) -> Result<Self, LogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, entry: &ConflictLogEntry) -> Result<(), LogError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        debug!(path = %entry.path, "conflict log entry appended");
        Ok(())
    }
}

/// Read the last `limit` entries, newest first. Malformed lines are skipped.
pub fn read_recent(path: &Path, limit: usize) -> Result<Vec<ConflictLogEntry>, LogError> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ConflictLogEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line = number + 1, error = %e, "skipping malformed conflict log line"),
        }
    }
    entries.reverse();
    entries.truncate(limit);
    Ok(entries)
}
