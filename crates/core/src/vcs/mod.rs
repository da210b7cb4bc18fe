//! Version-control operations the workflow depends on.
//!
//! The workflow talks to the repository only through the [`Vcs`] trait;
//! [`GitVcs`] is the production implementation.

pub mod git;

use std::path::Path;

use async_trait::async_trait;

use crate::conflict::{ConflictRecord, MergeContext, Stage};
use crate::errors::{AbortError, ScanError, VcsError};
use crate::scanner::ScanReport;
use crate::tools::StageFiles;

pub use git::GitVcs;

#[async_trait]
pub trait Vcs: Send + Sync {
    /// Working tree root; relative record paths resolve against it.
    fn repo_root(&self) -> &Path;

    /// The `.git` directory.
    fn git_dir(&self) -> &Path;

    /// Enumerate the unmerged paths.
    async fn scan(&self) -> Result<ScanReport, ScanError>;

    /// Write the base, ours and theirs versions of `record` to scratch
    /// files. Missing stages become empty files.
    async fn materialize_stages(&self, record: &ConflictRecord) -> Result<StageFiles, VcsError>;

    /// Replace the working file with `stage` and stage it.
    async fn checkout_stage(&self, path: &str, stage: Stage) -> Result<(), VcsError>;

    /// Delete `path` from the working tree and the index.
    async fn remove_path(&self, path: &str) -> Result<(), VcsError>;

    /// Record the working file as the resolution of `path`.
    async fn mark_resolved(&self, path: &str) -> Result<(), VcsError>;

    /// Paths that were conflicted in this operation and have since been
    /// resolved, in this session or an earlier one.
    async fn resolved_paths(&self) -> Result<Vec<String>, VcsError>;

    /// Put `path` back into the conflicted state.
    async fn recreate_conflict(&self, path: &str) -> Result<(), VcsError>;

    /// Abort the operation that produced the conflicts.
    async fn abort(&self, context: MergeContext) -> Result<(), AbortError>;
}
