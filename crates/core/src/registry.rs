//! The ordered, filterable collection of conflict records.
//!
//! The [`Registry`] is the single source of truth for the resolution
//! workflow. It enforces the state discipline of the engine:
//!
//! * at most one record is `InProgress` at any time;
//! * a resolved record must be undone before it is resolved again;
//! * the registry refuses to be rebuilt or cleared while a session is open.
//!
//! Callers that only observe state (a UI listing conflicts) go through a
//! [`RegistryHandle`], which can be read at any time, including while a tool
//! is running.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conflict::{ConflictRecord, MergeContext, ResolutionMethod, ResolutionState};
use crate::errors::RegistryError;
use crate::filter::PathFilter;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of asking the registry for the next record to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextOutcome {
    /// The next unresolved record at or after the cursor.
    Record(ConflictRecord),
    /// The end was reached and traversal restarted from the beginning.
    WrappedAround(ConflictRecord),
    /// Every record matching the active filter is resolved, but records
    /// outside the filter remain.
    FilterExhausted { remaining_unfiltered: usize },
    /// Every record is resolved.
    AllResolved,
    /// No unresolved record after the cursor and wrapping was not requested,
    /// or only skipped / in-progress records remain.
    EndOfList,
}

/// Counts describing how far the resolution has progressed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub resolved: usize,
    pub skipped: usize,
    pub in_progress: Option<String>,
    /// Records matching the active filter (all records when no filter).
    pub filtered_total: usize,
    /// Matching records that are not resolved yet.
    pub filtered_remaining: usize,
}

impl Progress {
    pub fn remaining(&self) -> usize {
        self.total - self.resolved
    }

    pub fn all_resolved(&self) -> bool {
        self.resolved == self.total
    }

    /// The filtered working set is done but other records are not.
    pub fn filter_exhausted(&self) -> bool {
        self.filtered_remaining == 0 && !self.all_resolved()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered conflict records with per-record resolution state.
#[derive(Debug, Default)]
pub struct Registry {
    records: Vec<ConflictRecord>,
    by_path: HashMap<String, usize>,
    context: MergeContext,
    active_filter: Option<PathFilter>,
    cursor: usize,
    /// The cursor sits on a record that was selected, handed out by
    /// [`next`](Self::next), or resolved there. Cleared by
    /// [`advance`](Self::advance) and whenever the cursor is reset.
    pinned: bool,
    /// Index of the record in progress and the state it had before.
    in_progress: Option<(usize, ResolutionState)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Replace the contents with a freshly scanned set of records.
    ///
    /// Records keep their order. A duplicate path keeps its first occurrence.
    /// The active filter survives; the cursor restarts at the beginning.
    pub fn rebuild(
        &mut self,
        context: MergeContext,
        records: Vec<ConflictRecord>,
    ) -> Result<(), RegistryError> {
        self.ensure_idle("refresh")?;

        let mut by_path = HashMap::with_capacity(records.len());
        let mut kept = Vec::with_capacity(records.len());
        for mut record in records {
            if by_path.contains_key(&record.path) {
                warn!(path = %record.path, "duplicate conflict path ignored");
                continue;
            }
            record.state = ResolutionState::Unresolved;
            record.tool_used = None;
            record.method = None;
            record.last_error = None;
            by_path.insert(record.path.clone(), kept.len());
            kept.push(record);
        }

        info!(count = kept.len(), %context, "registry rebuilt");
        self.records = kept;
        self.by_path = by_path;
        self.context = context;
        self.reset_cursor();
        Ok(())
    }

    /// Drop every record (after an abort).
    pub fn clear(&mut self) -> Result<(), RegistryError> {
        self.ensure_idle("abort")?;
        self.records.clear();
        self.by_path.clear();
        self.reset_cursor();
        self.context = MergeContext::default();
        debug!("registry cleared");
        Ok(())
    }

    /// Fail with [`RegistryError::Busy`] while a record is in progress.
    pub fn ensure_idle(&self, action: &str) -> Result<(), RegistryError> {
        match self.in_progress_path() {
            Some(path) => Err(RegistryError::Busy {
                action: action.to_string(),
                path: path.to_string(),
            }),
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Filtering and traversal
    // -----------------------------------------------------------------------

    pub fn apply_filter(&mut self, filter: PathFilter) {
        info!(%filter, "filter applied");
        self.active_filter = Some(filter);
        self.reset_cursor();
    }

    pub fn clear_filter(&mut self) {
        if self.active_filter.take().is_some() {
            info!("filter cleared");
        }
        self.reset_cursor();
    }

    pub fn filter(&self) -> Option<&PathFilter> {
        self.active_filter.as_ref()
    }

    fn passes_filter(&self, record: &ConflictRecord) -> bool {
        self.active_filter
            .as_ref()
            .map(|f| f.matches(&record.path))
            .unwrap_or(true)
    }

    fn is_eligible(&self, record: &ConflictRecord) -> bool {
        record.is_unresolved() && self.passes_filter(record)
    }

    fn reset_cursor(&mut self) {
        self.cursor = 0;
        self.pinned = false;
    }

    /// The record under the cursor, for resolving "the current one".
    ///
    /// A pinned cursor on a resolved record is an error: the caller must
    /// [`advance`](Self::advance) or undo first. A pinned cursor on a record
    /// that is skipped or outside the filter, and an unpinned cursor, fall
    /// through to [`next`](Self::next).
    pub fn current(&mut self, wrap: bool) -> Result<NextOutcome, RegistryError> {
        if self.pinned {
            if let Some(record) = self.records.get(self.cursor) {
                if record.state == ResolutionState::Resolved {
                    return Err(RegistryError::AlreadyResolved(record.path.clone()));
                }
                if self.is_eligible(record) {
                    return Ok(NextOutcome::Record(record.clone()));
                }
            }
        }
        Ok(self.next(wrap))
    }

    /// Release the cursor so the next [`current`](Self::current) moves on.
    pub fn advance(&mut self) {
        self.pinned = false;
    }

    /// Advance the cursor to the next unresolved record that passes the
    /// active filter, starting at the cursor itself.
    pub fn next(&mut self, wrap: bool) -> NextOutcome {
        let start = self.cursor.min(self.records.len());

        if let Some(idx) = (start..self.records.len()).find(|&i| self.is_eligible(&self.records[i]))
        {
            self.cursor = idx;
            self.pinned = true;
            return NextOutcome::Record(self.records[idx].clone());
        }

        if let Some(idx) = (0..start).find(|&i| self.is_eligible(&self.records[i])) {
            if wrap {
                debug!(path = %self.records[idx].path, "wrapped around to the beginning");
                self.cursor = idx;
                self.pinned = true;
                return NextOutcome::WrappedAround(self.records[idx].clone());
            }
            return NextOutcome::EndOfList;
        }

        let progress = self.progress();
        if progress.all_resolved() {
            NextOutcome::AllResolved
        } else if self.active_filter.is_some() && progress.filtered_remaining == 0 {
            NextOutcome::FilterExhausted {
                remaining_unfiltered: progress.remaining(),
            }
        } else {
            NextOutcome::EndOfList
        }
    }

    /// Move the cursor onto `path`.
    pub fn select(&mut self, path: &str) -> Result<(), RegistryError> {
        self.cursor = self.index_of(path)?;
        self.pinned = true;
        Ok(())
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    // -----------------------------------------------------------------------
    // State transitions
    // -----------------------------------------------------------------------

    /// Open a resolution session for `path`.
    pub fn mark_in_progress(&mut self, path: &str) -> Result<(), RegistryError> {
        let idx = self.index_of(path)?;
        if let Some(open) = self.in_progress_path() {
            return Err(RegistryError::ConflictInProgress {
                requested: path.to_string(),
                in_progress: open.to_string(),
            });
        }
        let record = &mut self.records[idx];
        if record.state == ResolutionState::Resolved {
            return Err(RegistryError::AlreadyResolved(path.to_string()));
        }
        self.in_progress = Some((idx, record.state));
        record.state = ResolutionState::InProgress;
        debug!(path, "marked in progress");
        Ok(())
    }

    /// Close the session for `path` without resolving it, restoring the
    /// state the record had before [`mark_in_progress`](Self::mark_in_progress).
    pub fn clear_in_progress(&mut self, path: &str) -> Result<(), RegistryError> {
        let idx = self.index_of(path)?;
        match self.in_progress {
            Some((open, previous)) if open == idx => {
                self.records[idx].state = previous;
                self.in_progress = None;
                debug!(path, "cleared in-progress state");
                Ok(())
            }
            _ => Err(RegistryError::NotInProgress(path.to_string())),
        }
    }

    /// Close the session for `path` and record the failure.
    pub fn mark_failed(&mut self, path: &str, error: &str) -> Result<(), RegistryError> {
        self.clear_in_progress(path)?;
        let idx = self.index_of(path)?;
        self.records[idx].last_error = Some(error.to_string());
        Ok(())
    }

    /// Mark `path` resolved by `method`.
    pub fn mark_resolved(
        &mut self,
        path: &str,
        method: ResolutionMethod,
    ) -> Result<(), RegistryError> {
        let idx = self.index_of(path)?;
        if let Some((open, _)) = self.in_progress {
            if open != idx {
                return Err(RegistryError::ConflictInProgress {
                    requested: path.to_string(),
                    in_progress: self.records[open].path.clone(),
                });
            }
        }
        let record = &mut self.records[idx];
        if record.state == ResolutionState::Resolved {
            return Err(RegistryError::AlreadyResolved(path.to_string()));
        }
        record.state = ResolutionState::Resolved;
        record.tool_used = method.tool_name().map(str::to_string);
        record.method = Some(method);
        record.last_error = None;
        self.in_progress = None;
        info!(path, "marked resolved");
        Ok(())
    }

    /// Undo a resolution: `Resolved` back to `Unresolved`, forgetting the
    /// tool and method.
    pub fn reset_to_unresolved(&mut self, path: &str) -> Result<(), RegistryError> {
        let idx = self.index_of(path)?;
        let record = &mut self.records[idx];
        if record.state != ResolutionState::Resolved {
            return Err(RegistryError::NotResolved(path.to_string()));
        }
        record.state = ResolutionState::Unresolved;
        record.tool_used = None;
        record.method = None;
        record.last_error = None;
        info!(path, "resolution undone");
        Ok(())
    }

    /// Pass over `path` in continuous traversal.
    pub fn skip(&mut self, path: &str) -> Result<(), RegistryError> {
        let idx = self.index_of(path)?;
        match self.records[idx].state {
            ResolutionState::Resolved => Err(RegistryError::AlreadyResolved(path.to_string())),
            ResolutionState::InProgress => Err(RegistryError::Busy {
                action: "skip".into(),
                path: path.to_string(),
            }),
            _ => {
                self.records[idx].state = ResolutionState::Skipped;
                debug!(path, "skipped");
                Ok(())
            }
        }
    }

    /// Return every skipped record to `Unresolved`.
    pub fn unskip_all(&mut self) -> usize {
        let mut count = 0;
        for record in &mut self.records {
            if record.state == ResolutionState::Skipped {
                record.state = ResolutionState::Unresolved;
                count += 1;
            }
        }
        if count > 0 {
            debug!(count, "skipped records returned");
        }
        count
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn records(&self) -> &[ConflictRecord] {
        &self.records
    }

    pub fn get(&self, path: &str) -> Option<&ConflictRecord> {
        self.by_path.get(path).map(|&i| &self.records[i])
    }

    /// Records passing the active filter, in order.
    pub fn filtered(&self) -> Vec<&ConflictRecord> {
        self.records
            .iter()
            .filter(|r| self.passes_filter(r))
            .collect()
    }

    pub fn context(&self) -> MergeContext {
        self.context
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn in_progress_path(&self) -> Option<&str> {
        self.in_progress
            .map(|(idx, _)| self.records[idx].path.as_str())
    }

    pub fn progress(&self) -> Progress {
        let mut p = Progress {
            total: self.records.len(),
            in_progress: self.in_progress_path().map(str::to_string),
            ..Default::default()
        };
        for record in &self.records {
            match record.state {
                ResolutionState::Resolved => p.resolved += 1,
                ResolutionState::Skipped => p.skipped += 1,
                _ => {}
            }
            if self.passes_filter(record) {
                p.filtered_total += 1;
                if record.state != ResolutionState::Resolved {
                    p.filtered_remaining += 1;
                }
            }
        }
        p
    }

    fn index_of(&self, path: &str) -> Result<usize, RegistryError> {
        self.by_path
            .get(path)
            .copied()
            .ok_or_else(|| RegistryError::NotFound(path.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Cloneable, thread-safe handle to a [`Registry`].
///
/// Locks are held only for the duration of a single call, never across an
/// await point, so observers can read while a tool runs.
#[derive(Debug, Clone, Default)]
pub struct RegistryHandle {
    inner: Arc<RwLock<Registry>>,
}

impl RegistryHandle {
    pub fn new(registry: Registry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(registry)),
        }
    }

    /// Shared read access. A poisoned lock is recovered rather than
    /// propagating a panic.
    pub fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner.read().unwrap_or_else(|poisoned| {
            warn!("registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.inner.write().unwrap_or_else(|poisoned| {
            warn!("registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Copy of every record, for display.
    pub fn snapshot(&self) -> Vec<ConflictRecord> {
        self.read().records().to_vec()
    }

    pub fn get(&self, path: &str) -> Option<ConflictRecord> {
        self.read().get(path).cloned()
    }

    pub fn progress(&self) -> Progress {
        self.read().progress()
    }
}
