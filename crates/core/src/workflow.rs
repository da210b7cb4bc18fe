//! The resolution workflow: a state machine that drives the registry, the
//! VCS and the tool invoker.
//!
//! ```text
//! Idle ─refresh─▶ Scanning ─▶ Ready ─resolve─▶ Resolving(path) ─▶ Ready
//!                                │                                 │
//!                                └────────abort────▶ Aborted       └─▶ Completed
//! ```
//!
//! Every mutation goes through `&mut self`, so at most one resolution runs
//! per workflow. Observers read the shared [`RegistryHandle`] and listen to
//! [`WorkflowEvent`]s; neither blocks a running tool.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::conflict::{ConflictRecord, ResolutionAction, ResolutionMethod, ResolutionState};
use crate::conflict_log::{ConflictLogEntry, ConflictLogWriter, LogOutcome};
use crate::errors::{RegistryError, WorkflowError};
use crate::events::{EventSink, WorkflowEvent};
use crate::filter::PathFilter;
use crate::registry::{NextOutcome, Progress, RegistryHandle};
use crate::tools::{ExitOutcome, ProcessRunner, Purpose, ToolInvoker, ToolSet};
use crate::vcs::Vcs;

// ---------------------------------------------------------------------------
// States, commands and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Scanning,
    Ready,
    Resolving(String),
    Completed,
    Aborted,
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scanning => write!(f, "scanning"),
            Self::Ready => write!(f, "ready"),
            Self::Resolving(path) => write!(f, "resolving '{}'", path),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// A request to the workflow, for callers that queue work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Refresh,
    ResolveCurrent,
    ResolveNext,
    ResolvePath(String),
    ResolveContinuous(Option<PathFilter>),
    ApplyAction {
        path: String,
        action: ResolutionAction,
    },
    UndoResolution(String),
    Abort,
    SetFilter(PathFilter),
    ClearFilter,
    Skip(String),
    UnskipAll,
}

/// Result of one resolve step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Resolved {
        path: String,
        method: ResolutionMethod,
    },
    AllResolved,
    FilterResolved {
        remaining_unfiltered: usize,
    },
    /// Nothing left to visit: only skipped records remain, or wrapping is
    /// off and the rest precede the cursor.
    EndOfList,
}

/// What a continuous run achieved before it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuousReport {
    pub resolved: Vec<String>,
    pub stopped: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Refreshed { count: usize },
    Step(StepOutcome),
    Continuous(ContinuousReport),
    Undone(String),
    Aborted,
    Updated(Progress),
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

pub struct Workflow<V: Vcs> {
    vcs: V,
    registry: RegistryHandle,
    tools: ToolSet,
    invoker: ToolInvoker,
    events: EventSink,
    log: ConflictLogWriter,
    session_id: Uuid,
    state: WorkflowState,
    wrap_around: bool,
    all_resolved_announced: bool,
    filter_resolved_announced: bool,
}

impl<V: Vcs> Workflow<V> {
    pub fn new(vcs: V, config: &AppConfig, runner: Arc<dyn ProcessRunner>, events: EventSink) -> Self {
        let log = ConflictLogWriter::open(&config.log, vcs.git_dir());
        Self {
            registry: RegistryHandle::default(),
            tools: ToolSet::new(config.tools.clone()),
            invoker: ToolInvoker::new(runner, config.general.reject_conflict_markers),
            events,
            log,
            session_id: Uuid::new_v4(),
            state: WorkflowState::Idle,
            wrap_around: config.general.wrap_around,
            all_resolved_announced: false,
            filter_resolved_announced: false,
            vcs,
        }
    }

    /// Shared, read-anytime view of the records.
    pub fn registry(&self) -> RegistryHandle {
        self.registry.clone()
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn progress(&self) -> Progress {
        self.registry.progress()
    }

    fn set_state(&mut self, state: WorkflowState) {
        if self.state != state {
            info!(from = %self.state, to = %state, "workflow state changed");
            self.state = state;
        }
    }

    /// Dispatch a [`Command`].
    pub async fn execute(&mut self, command: Command) -> Result<CommandOutcome, WorkflowError> {
        debug!(?command, "executing command");
        match command {
            Command::Refresh => self
                .refresh()
                .await
                .map(|count| CommandOutcome::Refreshed { count }),
            Command::ResolveCurrent => self.resolve_current().await.map(CommandOutcome::Step),
            Command::ResolveNext => self.resolve_next().await.map(CommandOutcome::Step),
            Command::ResolvePath(path) => self.resolve_path(&path).await.map(CommandOutcome::Step),
            Command::ResolveContinuous(filter) => self
                .resolve_continuous(filter)
                .await
                .map(CommandOutcome::Continuous),
            Command::ApplyAction { path, action } => self
                .apply_action(&path, action)
                .await
                .map(CommandOutcome::Step),
            Command::UndoResolution(path) => {
                self.undo_resolution(&path).await?;
                Ok(CommandOutcome::Undone(path))
            }
            Command::Abort => {
                self.abort().await?;
                Ok(CommandOutcome::Aborted)
            }
            Command::SetFilter(filter) => {
                self.set_filter(filter);
                Ok(CommandOutcome::Updated(self.progress()))
            }
            Command::ClearFilter => {
                self.clear_filter();
                Ok(CommandOutcome::Updated(self.progress()))
            }
            Command::Skip(path) => {
                self.skip(&path)?;
                Ok(CommandOutcome::Updated(self.progress()))
            }
            Command::UnskipAll => {
                self.unskip_all();
                Ok(CommandOutcome::Updated(self.progress()))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Scanning
    // -----------------------------------------------------------------------

    /// Rescan the repository and rebuild the registry.
    ///
    /// Zero conflicts is reported as [`WorkflowError::NoConflicts`], except
    /// right after the workflow completed, where it is the expected result.
    #[instrument(skip(self))]
    pub async fn refresh(&mut self) -> Result<usize, WorkflowError> {
        self.registry.read().ensure_idle("refresh")?;

        let was_completed = self.state == WorkflowState::Completed;
        let previous = self.state.clone();
        self.set_state(WorkflowState::Scanning);
        self.events.emit(WorkflowEvent::ScanStarted);

        let report = match self.vcs.scan().await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "scan failed");
                self.set_state(previous);
                return Err(e.into());
            }
        };
        self.registry.write().rebuild(report.context, report.records)?;

        let count = self.registry.read().len();
        self.events.emit(WorkflowEvent::ScanCompleted { count });

        if count == 0 {
            if was_completed {
                self.set_state(WorkflowState::Completed);
                return Ok(0);
            }
            self.set_state(WorkflowState::Idle);
            self.events.emit(WorkflowEvent::NoConflictsToResolve);
            return Err(WorkflowError::NoConflicts);
        }

        self.all_resolved_announced = false;
        self.filter_resolved_announced = false;
        self.set_state(WorkflowState::Ready);
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Resolve the record under the cursor with its configured merge tool.
    ///
    /// The cursor stays on a record once it has been selected or handed out,
    /// so calling this again after a success fails with
    /// [`RegistryError::AlreadyResolved`]. Without a current record the
    /// cursor moves to the next unresolved one.
    pub async fn resolve_current(&mut self) -> Result<StepOutcome, WorkflowError> {
        let current = self.registry.write().current(self.wrap_around)?;
        match current {
            NextOutcome::Record(record) => self.resolve_with_tool(record).await,
            NextOutcome::WrappedAround(record) => {
                self.events.emit(WorkflowEvent::WrappedAround {
                    path: record.path.clone(),
                });
                self.resolve_with_tool(record).await
            }
            NextOutcome::AllResolved => {
                self.announce_all_resolved();
                Ok(StepOutcome::AllResolved)
            }
            NextOutcome::FilterExhausted {
                remaining_unfiltered,
            } => {
                self.announce_filter_resolved(remaining_unfiltered);
                Ok(StepOutcome::FilterResolved {
                    remaining_unfiltered,
                })
            }
            NextOutcome::EndOfList => Ok(StepOutcome::EndOfList),
        }
    }

    /// Move past the current record and resolve the next unresolved one.
    pub async fn resolve_next(&mut self) -> Result<StepOutcome, WorkflowError> {
        self.registry.write().advance();
        self.resolve_current().await
    }

    /// Resolve `path` with its configured merge tool and move the cursor
    /// there.
    pub async fn resolve_path(&mut self, path: &str) -> Result<StepOutcome, WorkflowError> {
        let record = {
            let mut registry = self.registry.write();
            registry.select(path)?;
            registry
                .get(path)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(path.to_string()))?
        };
        self.resolve_with_tool(record).await
    }

    /// Resolve records one after another until one fails, everything (or
    /// everything matching `filter`) is resolved, or nothing is left to
    /// visit.
    #[instrument(skip(self))]
    pub async fn resolve_continuous(
        &mut self,
        filter: Option<PathFilter>,
    ) -> Result<ContinuousReport, WorkflowError> {
        if let Some(filter) = filter {
            self.set_filter(filter);
        }
        let mut resolved = Vec::new();
        loop {
            match self.resolve_next().await? {
                StepOutcome::Resolved { path, .. } => resolved.push(path),
                stopped => {
                    info!(count = resolved.len(), ?stopped, "continuous resolve finished");
                    return Ok(ContinuousReport { resolved, stopped });
                }
            }
        }
    }

    /// Resolve `path` without a tool by picking a side or deleting it.
    #[instrument(skip(self))]
    pub async fn apply_action(
        &mut self,
        path: &str,
        action: ResolutionAction,
    ) -> Result<StepOutcome, WorkflowError> {
        let (record, context) = {
            let registry = self.registry.read();
            let record = registry
                .get(path)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(path.to_string()))?;
            (record, registry.context())
        };
        if record.state == ResolutionState::Resolved {
            return Err(RegistryError::AlreadyResolved(path.to_string()).into());
        }
        let stage = action.target_stage(record.kind);
        if !record.available_actions(context).contains(&action)
            || (stage.is_none() && action != ResolutionAction::DeleteFile)
        {
            return Err(WorkflowError::ActionUnavailable {
                path: path.to_string(),
                action: action.to_string(),
                kind: record.kind.to_string(),
            });
        }

        self.begin(&record)?;
        let result = match stage {
            Some(stage) => self.vcs.checkout_stage(path, stage).await,
            None => self.vcs.remove_path(path).await,
        };
        match result {
            Ok(()) => self.succeed(&record, ResolutionMethod::Action(action)),
            Err(e) => self.fail(&record, e.into()),
        }
    }

    async fn resolve_with_tool(&mut self, record: ConflictRecord) -> Result<StepOutcome, WorkflowError> {
        if record.state == ResolutionState::Resolved {
            return Err(RegistryError::AlreadyResolved(record.path.clone()).into());
        }
        if !record.kind.is_mergeable() {
            return Err(WorkflowError::ActionUnavailable {
                path: record.path.clone(),
                action: "merge tool".into(),
                kind: record.kind.to_string(),
            });
        }

        self.begin(&record)?;
        match self.run_merge_tool(&record).await {
            Ok(method) => self.succeed(&record, method),
            Err(e) => self.fail(&record, e),
        }
    }

    async fn run_merge_tool(&self, record: &ConflictRecord) -> Result<ResolutionMethod, WorkflowError> {
        let tool = self.tools.require(&record.path, Purpose::Merge)?.clone();
        let files = self.vcs.materialize_stages(record).await?;
        let outcome = self
            .invoker
            .merge(record, &tool, &files, self.vcs.repo_root())
            .await?;
        match outcome {
            ExitOutcome::Resolved => {
                self.vcs.mark_resolved(&record.path).await?;
                Ok(ResolutionMethod::Tool(tool.name))
            }
            other => Err(WorkflowError::NotResolvedByTool {
                path: record.path.clone(),
                tool: tool.name,
                reason: other.to_string(),
            }),
        }
    }

    fn begin(&mut self, record: &ConflictRecord) -> Result<(), WorkflowError> {
        self.registry.write().mark_in_progress(&record.path)?;
        self.set_state(WorkflowState::Resolving(record.path.clone()));
        self.events.emit(WorkflowEvent::ResolutionStarted {
            path: record.path.clone(),
        });
        Ok(())
    }

    fn succeed(
        &mut self,
        record: &ConflictRecord,
        method: ResolutionMethod,
    ) -> Result<StepOutcome, WorkflowError> {
        let (context, progress) = {
            let mut registry = self.registry.write();
            registry.mark_resolved(&record.path, method.clone())?;
            (registry.context(), registry.progress())
        };
        self.log.append(&ConflictLogEntry::new(
            self.session_id,
            record,
            context,
            LogOutcome::Resolved,
            Some(method.clone()),
        ));
        info!(path = %record.path, %method, "conflict resolved");
        self.events.emit(WorkflowEvent::ResolutionSucceeded {
            path: record.path.clone(),
            method: method.clone(),
        });
        self.set_state(WorkflowState::Ready);

        if progress.all_resolved() {
            self.announce_all_resolved();
        } else if self.registry.read().filter().is_some() && progress.filtered_remaining == 0 {
            self.announce_filter_resolved(progress.remaining());
        }
        Ok(StepOutcome::Resolved {
            path: record.path.clone(),
            method,
        })
    }

    fn fail(&mut self, record: &ConflictRecord, error: WorkflowError) -> Result<StepOutcome, WorkflowError> {
        let message = error.to_string();
        warn!(path = %record.path, error = %message, "resolution failed");
        if let Err(e) = self.registry.write().mark_failed(&record.path, &message) {
            warn!(path = %record.path, error = %e, "could not close the resolution session");
        }
        self.events.emit(WorkflowEvent::ResolutionFailed {
            path: record.path.clone(),
            error: message,
        });
        self.set_state(WorkflowState::Ready);
        Err(error)
    }

    fn announce_all_resolved(&mut self) {
        self.set_state(WorkflowState::Completed);
        if !self.all_resolved_announced {
            self.all_resolved_announced = true;
            self.events.emit(WorkflowEvent::AllResolved);
        }
    }

    fn announce_filter_resolved(&mut self, remaining_unfiltered: usize) {
        if !self.filter_resolved_announced {
            self.filter_resolved_announced = true;
            self.events.emit(WorkflowEvent::FilterResolved {
                remaining_unfiltered,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Undo, abort, filtering
    // -----------------------------------------------------------------------

    /// Put a resolved path back into conflict.
    ///
    /// A path resolved before the last rescan is no longer in the registry;
    /// if the VCS still remembers its stages the conflict is recreated and
    /// the registry rebuilt.
    #[instrument(skip(self))]
    pub async fn undo_resolution(&mut self, path: &str) -> Result<(), WorkflowError> {
        let found = {
            let registry = self.registry.read();
            registry.get(path).cloned().map(|r| (r, registry.context()))
        };
        let Some((record, context)) = found else {
            return self.undo_earlier_resolution(path).await;
        };
        if record.state != ResolutionState::Resolved {
            return Err(RegistryError::NotResolved(path.to_string()).into());
        }

        self.vcs.recreate_conflict(path).await?;
        self.registry.write().reset_to_unresolved(path)?;
        self.log.append(&ConflictLogEntry::new(
            self.session_id,
            &record,
            context,
            LogOutcome::Undone,
            record.method.clone(),
        ));
        self.events.emit(WorkflowEvent::ResolutionUndone {
            path: path.to_string(),
        });
        self.all_resolved_announced = false;
        self.filter_resolved_announced = false;
        self.set_state(WorkflowState::Ready);
        Ok(())
    }

    async fn undo_earlier_resolution(&mut self, path: &str) -> Result<(), WorkflowError> {
        self.registry.read().ensure_idle("undo")?;
        let resolved = self.vcs.resolved_paths().await?;
        if !resolved.iter().any(|p| p == path) {
            return Err(RegistryError::NotFound(path.to_string()).into());
        }

        info!(path, "recreating a conflict resolved before the last scan");
        self.vcs.recreate_conflict(path).await?;
        self.refresh().await?;

        let (record, context) = {
            let registry = self.registry.read();
            let record = registry
                .get(path)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(path.to_string()))?;
            (record, registry.context())
        };
        self.log.append(&ConflictLogEntry::new(
            self.session_id,
            &record,
            context,
            LogOutcome::Undone,
            None,
        ));
        self.events.emit(WorkflowEvent::ResolutionUndone {
            path: path.to_string(),
        });
        Ok(())
    }

    /// Abandon the merge (or rebase, cherry-pick, revert) entirely.
    #[instrument(skip(self))]
    pub async fn abort(&mut self) -> Result<(), WorkflowError> {
        let (context, empty) = {
            let registry = self.registry.read();
            registry.ensure_idle("abort")?;
            (registry.context(), registry.is_empty())
        };
        let context = if empty {
            self.vcs.scan().await?.context
        } else {
            context
        };

        self.vcs.abort(context).await?;
        self.registry.write().clear()?;
        self.set_state(WorkflowState::Aborted);
        self.events.emit(WorkflowEvent::Aborted);
        Ok(())
    }

    pub fn set_filter(&mut self, filter: PathFilter) {
        self.registry.write().apply_filter(filter);
        self.filter_resolved_announced = false;
    }

    pub fn clear_filter(&mut self) {
        self.registry.write().clear_filter();
        self.filter_resolved_announced = false;
    }

    /// Leave `path` out of continuous resolution for this session.
    pub fn skip(&mut self, path: &str) -> Result<(), WorkflowError> {
        self.registry.write().skip(path)?;
        Ok(())
    }

    /// Put every skipped path back into traversal.
    pub fn unskip_all(&mut self) -> usize {
        self.registry.write().unskip_all()
    }

    /// Open the diff tool configured for `path` on its two sides.
    #[instrument(skip(self))]
    pub async fn diff(&self, path: &str) -> Result<(), WorkflowError> {
        let record = self
            .registry
            .get(path)
            .ok_or_else(|| RegistryError::NotFound(path.to_string()))?;
        let tool = self.tools.require(path, Purpose::Diff)?.clone();
        let files = self.vcs.materialize_stages(&record).await?;
        let exit = self
            .invoker
            .diff(path, &tool, &files, self.vcs.repo_root())
            .await?;
        debug!(?exit, "diff tool closed");
        Ok(())
    }
}
