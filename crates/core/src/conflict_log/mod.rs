//! Best-effort record of resolutions.
//!
//! The log is an audit trail, not part of the workflow's correctness: a
//! writer that cannot open or append degrades to [`ConflictLogWriter::Disabled`]
//! with a warning, and resolutions carry on.

pub mod jsonl;
#[cfg(feature = "sqlite-log")]
pub mod sqlite;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{ConflictLogConfig, LogFormat};
use crate::conflict::{ConflictKind, ConflictRecord, MergeContext, ResolutionMethod};
use crate::errors::LogError;

use jsonl::JsonlLog;
#[cfg(feature = "sqlite-log")]
use sqlite::SqliteLog;

/// What happened to the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutcome {
    Resolved,
    Undone,
}

/// One line of the conflict log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictLogEntry {
    /// Identifies one workflow instance; all entries it writes share it.
    pub session_id: Uuid,
    pub logged_at: DateTime<Utc>,
    pub path: String,
    pub kind: ConflictKind,
    pub context: MergeContext,
    pub outcome: LogOutcome,
    pub method: Option<ResolutionMethod>,
    pub tool: Option<String>,
}

impl ConflictLogEntry {
    pub fn new(
        session_id: Uuid,
        record: &ConflictRecord,
        context: MergeContext,
        outcome: LogOutcome,
        method: Option<ResolutionMethod>,
    ) -> Self {
        let tool = method.as_ref().and_then(|m| m.tool_name()).map(str::to_string);
        Self {
            session_id,
            logged_at: Utc::now(),
            path: record.path.clone(),
            kind: record.kind,
            context,
            outcome,
            method,
            tool,
        }
    }
}

/// Where the log lives. Relative paths are taken from the `.git` directory.
pub fn resolve_log_path(config: &ConflictLogConfig, git_dir: &Path) -> PathBuf {
    if config.path.is_absolute() {
        config.path.clone()
    } else {
        git_dir.join(&config.path)
    }
}

/// Appends entries in the configured format.
#[derive(Debug, Default)]
pub enum ConflictLogWriter {
    #[default]
    Disabled,
    Jsonl(JsonlLog),
    #[cfg(feature = "sqlite-log")]
    Sqlite(SqliteLog),
}

impl ConflictLogWriter {
    /// Open the writer described by `config`. Never fails: a disabled or
    /// unusable log yields [`ConflictLogWriter::Disabled`].
    pub fn open(config: &ConflictLogConfig, git_dir: &Path) -> Self {
        if !config.enabled {
            return Self::Disabled;
        }
        match Self::try_open(config, git_dir) {
            Ok(writer) => writer,
            Err(e) => {
                warn!(error = %e, "conflict log disabled");
                Self::Disabled
            }
        }
    }

    /// Open the writer regardless of `config.enabled`, reporting failures.
    pub fn try_open(config: &ConflictLogConfig, git_dir: &Path) -> Result<Self, LogError> {
        let path = resolve_log_path(config, git_dir);
        let writer = match config.format {
            LogFormat::Jsonl => Self::Jsonl(JsonlLog::open(&path)?),
            #[cfg(feature = "sqlite-log")]
            LogFormat::Sqlite => Self::Sqlite(SqliteLog::open(&path)?),
            #[cfg(not(feature = "sqlite-log"))]
            LogFormat::Sqlite => return Err(LogError::FormatUnavailable("sqlite".into())),
        };
        info!(path = %path.display(), format = ?config.format, "conflict log opened");
        Ok(writer)
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Append `entry`. A failure disables the writer for the rest of the
    /// session.
    pub fn append(&mut self, entry: &ConflictLogEntry) {
        let result = match self {
            Self::Disabled => return,
            Self::Jsonl(log) => log.append(entry),
            #[cfg(feature = "sqlite-log")]
            Self::Sqlite(log) => log.append(entry),
        };
        if let Err(e) = result {
            warn!(error = %e, path = %entry.path, "failed to write conflict log, disabling it");
            *self = Self::Disabled;
        }
    }
}

/// The newest `limit` entries, newest first. A log that was never written
/// reads as empty.
pub fn read_recent(
    config: &ConflictLogConfig,
    git_dir: &Path,
    limit: usize,
) -> Result<Vec<ConflictLogEntry>, LogError> {
    let path = resolve_log_path(config, git_dir);
    if !path.exists() {
        return Ok(Vec::new());
    }
    match config.format {
        LogFormat::Jsonl => jsonl::read_recent(&path, limit),
        #[cfg(feature = "sqlite-log")]
        LogFormat::Sqlite => SqliteLog::open(&path)?.recent(limit),
        #[cfg(not(feature = "sqlite-log"))]
        LogFormat::Sqlite => Err(LogError::FormatUnavailable("sqlite".into())),
    }
}
