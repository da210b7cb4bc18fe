//! Enumerating unmerged paths from a repository index.

use std::collections::BTreeMap;
use std::path::Path;

use git2::{ErrorCode, Repository};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::conflict::{ConflictRecord, MergeContext, StageSet};
use crate::errors::ScanError;

/// Everything a scan learned about the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub context: MergeContext,
    /// Fresh, unresolved records sorted by path.
    pub records: Vec<ConflictRecord>,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Open the repository containing `path`, rejecting bare repositories.
pub fn open_repository(path: &Path) -> Result<Repository, ScanError> {
    let repo = Repository::discover(path).map_err(|e| match e.code() {
        ErrorCode::NotFound => ScanError::NotARepository(path.display().to_string()),
        _ => ScanError::Git2Error(e),
    })?;
    if repo.is_bare() {
        return Err(ScanError::BareRepository(path.display().to_string()));
    }
    Ok(repo)
}

/// Read the index of the repository at `path` and classify every conflict.
#[instrument(fields(path = %path.display()))]
pub fn scan(path: &Path) -> Result<ScanReport, ScanError> {
    let repo = open_repository(path)?;
    scan_repository(&repo)
}

/// Classify the conflicts recorded in `repo`'s index.
pub fn scan_repository(repo: &Repository) -> Result<ScanReport, ScanError> {
    let context = MergeContext::from(repo.state());
    let index = repo.index()?;

    // Keyed by path so the result is ordered and each path appears once.
    let mut stages: BTreeMap<String, StageSet> = BTreeMap::new();
    if index.has_conflicts() {
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let raw = [&conflict.ancestor, &conflict.our, &conflict.their]
                .into_iter()
                .flatten()
                .map(|entry| entry.path.clone())
                .next();
            let Some(raw) = raw else {
                continue;
            };
            let path = String::from_utf8(raw).map_err(|e| ScanError::InvalidPath(e.into_bytes()))?;

            let set = stages.entry(path).or_default();
            set.base |= conflict.ancestor.is_some();
            set.ours |= conflict.our.is_some();
            set.theirs |= conflict.their.is_some();
        }
    }

    let mut records = Vec::with_capacity(stages.len());
    for (path, set) in stages {
        match ConflictRecord::new(path.clone(), set) {
            Some(record) => {
                debug!(path = %record.path, kind = %record.kind, stages = %set, "conflict found");
                records.push(record);
            }
            None => warn!(path, "conflict entry without any stage ignored"),
        }
    }

    info!(count = records.len(), %context, "scan completed");
    Ok(ScanReport { context, records })
}
