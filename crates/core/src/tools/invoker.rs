//! Launching a configured tool for a conflict and judging the result.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use regex_lite::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::config::ToolConfig;
use crate::conflict::ConflictRecord;
use crate::errors::ToolError;

use super::runner::{ProcessRunner, RawExit};
use super::template;
use super::StageFiles;

/// Why a tool that exited cleanly still did not resolve the conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    MissingOutput,
    EmptyOutput,
    /// The tool exited cleanly without saving anything.
    Unchanged,
    ConflictMarkers,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingOutput => write!(f, "the merged file does not exist"),
            Self::EmptyOutput => write!(f, "the merged file is empty"),
            Self::Unchanged => write!(f, "the merged file was left unchanged"),
            Self::ConflictMarkers => write!(f, "the merged file still contains conflict markers"),
        }
    }
}

/// Outcome of a tool run that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Resolved,
    /// Clean non-zero exit: the user closed the tool without saving.
    Aborted { code: i32 },
    Unresolved(UnresolvedReason),
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved => write!(f, "resolved"),
            Self::Aborted { code } => write!(f, "tool exited with status {}", code),
            Self::Unresolved(reason) => write!(f, "{}", reason),
        }
    }
}

/// Runs merge and diff tools through a [`ProcessRunner`].
#[derive(Clone)]
pub struct ToolInvoker {
    runner: Arc<dyn ProcessRunner>,
    reject_conflict_markers: bool,
}

impl fmt::Debug for ToolInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolInvoker")
            .field("reject_conflict_markers", &self.reject_conflict_markers)
            .finish_non_exhaustive()
    }
}

impl ToolInvoker {
    pub fn new(runner: Arc<dyn ProcessRunner>, reject_conflict_markers: bool) -> Self {
        Self {
            runner,
            reject_conflict_markers,
        }
    }

    /// Run `tool` to merge `record` and decide whether the merged file is a
    /// resolution.
    ///
    /// Resolved only when the tool exits with status zero and the merged
    /// file exists, is non-empty, differs from what it held before the
    /// launch and (optionally) holds no conflict markers.
    #[instrument(skip(self, record, tool, files, cwd), fields(path = %record.path, tool = %tool.name))]
    pub async fn merge(
        &self,
        record: &ConflictRecord,
        tool: &ToolConfig,
        files: &StageFiles,
        cwd: &Path,
    ) -> Result<ExitOutcome, ToolError> {
        let before = fingerprint(&files.merged)?;
        let exit = self.launch(&record.path, tool, files, cwd).await?;

        if let Some(code) = exit.code.filter(|&c| c != 0) {
            info!(code, "tool exited without resolving");
            return Ok(ExitOutcome::Aborted { code });
        }

        let outcome = match self.inspect_merged(&files.merged, before.as_deref())? {
            Some(reason) => ExitOutcome::Unresolved(reason),
            None => ExitOutcome::Resolved,
        };
        info!(%outcome, "tool finished");
        Ok(outcome)
    }

    /// Show the two sides of a conflict in a diff tool. Never changes state.
    #[instrument(skip(self, tool, files, cwd), fields(tool = %tool.name))]
    pub async fn diff(
        &self,
        path: &str,
        tool: &ToolConfig,
        files: &StageFiles,
        cwd: &Path,
    ) -> Result<RawExit, ToolError> {
        self.launch(path, tool, files, cwd).await
    }

    async fn launch(
        &self,
        path: &str,
        tool: &ToolConfig,
        files: &StageFiles,
        cwd: &Path,
    ) -> Result<RawExit, ToolError> {
        let command = template::render(&tool.name, &tool.command, files)?;
        debug!(program = %command.program, args = ?command.args, "rendered tool command");

        let exit = self
            .runner
            .invoke(&command.program, &command.args, cwd)
            .await
            .map_err(|source| ToolError::Launch {
                tool: tool.name.clone(),
                path: path.to_string(),
                source,
            })?;

        if exit.crashed() {
            warn!(signal = ?exit.signal, "tool terminated abnormally");
            return Err(ToolError::Crashed {
                tool: tool.name.clone(),
                path: path.to_string(),
                signal: exit.signal,
            });
        }
        Ok(exit)
    }

    fn inspect_merged(
        &self,
        merged: &Path,
        before: Option<&[u8]>,
    ) -> Result<Option<UnresolvedReason>, ToolError> {
        let bytes = match std::fs::read(merged) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Some(UnresolvedReason::MissingOutput))
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            return Ok(Some(UnresolvedReason::EmptyOutput));
        }
        if before == Some(Sha256::digest(&bytes).as_slice()) {
            return Ok(Some(UnresolvedReason::Unchanged));
        }
        if self.reject_conflict_markers && has_conflict_markers(&bytes) {
            return Ok(Some(UnresolvedReason::ConflictMarkers));
        }
        Ok(None)
    }
}

/// SHA-256 of the file at `path`, `None` if it does not exist.
fn fingerprint(path: &Path) -> Result<Option<Vec<u8>>, ToolError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(Sha256::digest(&bytes).to_vec())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// `true` if `contents` holds a complete `<<<<<<<` / `=======` / `>>>>>>>`
/// block. Binary (non UTF-8) content is never considered marked.
pub fn has_conflict_markers(contents: &[u8]) -> bool {
    static MARKERS: OnceLock<Option<Regex>> = OnceLock::new();
    let Ok(text) = std::str::from_utf8(contents) else {
        return false;
    };
    let re = MARKERS.get_or_init(|| {
        Regex::new(r"(?ms)^<{7}(?:[ \t][^\n]*)?\r?$.*?^={7}\r?$.*?^>{7}(?:[ \t][^\n]*)?\r?$").ok()
    });
    re.as_ref().map(|re| re.is_match(text)).unwrap_or(false)
}
