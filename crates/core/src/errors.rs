//! Error types for the Conflux core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Abort(#[from] AbortError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Log(#[from] LogError),
}

// ---------------------------------------------------------------------------
// Scanner errors
// ---------------------------------------------------------------------------

/// Errors from querying the repository for unmerged paths.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The path does not exist or is not a git repository.
    #[error("not a git repository: '{0}'")]
    NotARepository(String),

    /// The repository has no working tree (bare repository).
    #[error("repository at '{0}' has no working tree")]
    BareRepository(String),

    /// A `git2` library error while reading the index.
    #[error("failed to read conflicts from the index: {0}")]
    Git2Error(#[from] git2::Error),

    /// An index entry path was not valid UTF-8.
    #[error("index entry path is not valid UTF-8: {0:?}")]
    InvalidPath(Vec<u8>),
}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

/// Workflow discipline violations raised by the conflict registry.
///
/// These are always recoverable: the caller gets the path and the attempted
/// action and can retry after fixing the situation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A state mutation (refresh, abort) was attempted while a resolution
    /// session is open.
    #[error("cannot {action} while '{path}' is being resolved; close the open session first")]
    Busy { action: String, path: String },

    /// The path was already resolved; undo it before resolving again.
    #[error("'{0}' is already resolved; undo the resolution before resolving it again")]
    AlreadyResolved(String),

    /// Another path is being resolved.
    #[error("cannot start resolving '{requested}': '{in_progress}' is still in progress; please resolve current conflicts before starting a new one")]
    ConflictInProgress {
        requested: String,
        in_progress: String,
    },

    /// The path is not part of the current conflict set.
    #[error("'{0}' is not a conflicted path")]
    NotFound(String),

    /// Undo was requested for a path that is not resolved.
    #[error("'{0}' is not resolved; nothing to undo")]
    NotResolved(String),

    /// `clear_in_progress` was called for a path that is not in progress.
    #[error("'{0}' is not being resolved")]
    NotInProgress(String),
}

// ---------------------------------------------------------------------------
// Tool errors
// ---------------------------------------------------------------------------

/// Errors from looking up and launching external diff/merge tools.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool configuration matches the path.
    #[error("no {purpose} tool is configured for '{path}'")]
    UnknownTool { path: String, purpose: String },

    /// A tool configuration matches, but it is disabled.
    #[error("tool '{tool}' matches '{path}' but is disabled")]
    ToolDisabled { path: String, tool: String },

    /// The command template could not be parsed.
    #[error("invalid command template for tool '{tool}': {detail}")]
    Template { tool: String, detail: String },

    /// The tool process could not be started.
    #[error("failed to launch tool '{tool}' for '{path}': {source}")]
    Launch {
        tool: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool process terminated abnormally (killed by a signal).
    #[error("tool '{tool}' crashed while resolving '{path}'{}", signal_suffix(.signal))]
    Crashed {
        tool: String,
        path: String,
        signal: Option<i32>,
    },

    /// Generic I/O wrapper (temporary stage files, merged output checks).
    #[error("tool I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

fn signal_suffix(signal: &Option<i32>) -> String {
    match signal {
        Some(sig) => format!(" (signal {})", sig),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// VCS errors
// ---------------------------------------------------------------------------

/// Errors from VCS commands other than scanning and aborting.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found")]
    BinaryNotFound,

    /// A `git` command exited with a non-zero status.
    #[error("`git {command}` failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// Re-reading the index conflicts failed.
    #[error("cannot read conflicts: {0}")]
    Scan(#[from] ScanError),

    /// The requested index stage does not exist for the path.
    #[error("'{path}' has no {stage} version")]
    MissingStage { path: String, stage: String },

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Aborting the in-progress merge failed at the VCS level.
///
/// This is fatal for the session: the repository may be left in an
/// inconsistent state that needs manual intervention.
#[derive(Debug, Error)]
#[error("failed to abort the {operation} in '{repo}': {detail}; the repository may need manual cleanup")]
pub struct AbortError {
    pub operation: String,
    pub repo: String,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Workflow errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the resolution workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The scan found nothing to resolve.
    #[error("no merge conflicts to resolve")]
    NoConflicts,

    /// The action does not apply to the path's conflict kind.
    #[error("'{action}' is not available for '{path}' ({kind})")]
    ActionUnavailable {
        path: String,
        action: String,
        kind: String,
    },

    /// The tool exited without producing a resolved file.
    #[error("'{path}' was not resolved by '{tool}': {reason}")]
    NotResolvedByTool {
        path: String,
        tool: String,
        reason: String,
    },

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Abort(#[from] AbortError),
}

impl WorkflowError {
    /// `true` for failures the user fixes by changing tool configuration.
    pub fn is_tool_failure(&self) -> bool {
        matches!(self, Self::Tool(_))
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Conflict log errors
// ---------------------------------------------------------------------------

/// Errors from the conflict log writer. Never propagated out of a resolution.
#[derive(Debug, Error)]
pub enum LogError {
    /// The requested log format was compiled out.
    #[error("conflict log format '{0}' is not available in this build")]
    FormatUnavailable(String),

    /// JSON serialization failure.
    #[error("conflict log serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// SQLite failure.
    #[cfg(feature = "sqlite-log")]
    #[error("conflict log database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error.
    #[error("conflict log I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = RegistryError::AlreadyResolved("src/main.rs".into());
        assert!(err.to_string().contains("already resolved"));

        let err = RegistryError::Busy {
            action: "refresh".into(),
            path: "a.txt".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot refresh while 'a.txt' is being resolved; close the open session first"
        );

        let err = ToolError::Crashed {
            tool: "kdiff3".into(),
            path: "b.png".into(),
            signal: Some(11),
        };
        assert_eq!(
            err.to_string(),
            "tool 'kdiff3' crashed while resolving 'b.png' (signal 11)"
        );

        let err = ToolError::UnknownTool {
            path: "a.txt".into(),
            purpose: "merge".into(),
        };
        assert_eq!(err.to_string(), "no merge tool is configured for 'a.txt'");
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let err: CoreError = ScanError::NotARepository("/tmp/x".into()).into();
        assert!(matches!(err, CoreError::Scan(_)));

        let err: WorkflowError = RegistryError::NotFound("x".into()).into();
        assert!(matches!(err, WorkflowError::Registry(_)));
        assert!(!err.is_tool_failure());

        let err: WorkflowError = ToolError::UnknownTool {
            path: "a".into(),
            purpose: "merge".into(),
        }
        .into();
        assert!(err.is_tool_failure());
    }
}
