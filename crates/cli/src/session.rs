//! Configuration lookup, workflow construction and event rendering shared
//! by the subcommands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tracing::debug;

use conflux_core::config::{AppConfig, REPO_CONFIG_FILE};
use conflux_core::events::{EventReceiver, EventSink, WorkflowEvent};
use conflux_core::scanner;
use conflux_core::tools::TokioProcessRunner;
use conflux_core::vcs::GitVcs;
use conflux_core::workflow::Workflow;
use conflux_core::WorkflowError;

use crate::style;

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// Working tree root containing `repo`, or `repo` itself outside a
/// repository.
pub fn repo_root(repo: &Path) -> PathBuf {
    scanner::open_repository(repo)
        .ok()
        .and_then(|r| r.workdir().map(Path::to_path_buf))
        .unwrap_or_else(|| repo.to_path_buf())
}

/// Config files tried in order when `--config` is not given.
pub fn config_candidates(repo_root: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![repo_root.join(REPO_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("conflux").join("config.toml"));
    }
    candidates
}

/// Load and validate the configuration. An explicit path must exist;
/// otherwise the first existing candidate wins and defaults apply when none
/// does.
pub fn load_config(explicit: Option<&Path>, repo_root: &Path) -> Result<(AppConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let path = expand_tilde(path);
        let config = AppConfig::load_and_validate(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;
        return Ok((config, Some(path)));
    }
    let (config, path) = AppConfig::load_first_existing(&config_candidates(repo_root))
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    Ok((config, path))
}

/// Open the repository and build a workflow over it.
pub fn open_workflow(repo: &Path, config: &AppConfig, events: EventSink) -> Result<Workflow<GitVcs>> {
    let vcs = GitVcs::open(repo).context("failed to open repository")?;
    Ok(Workflow::new(
        vcs,
        config,
        Arc::new(TokioProcessRunner),
        events,
    ))
}

/// A workflow whose events are printed while it runs.
pub struct Session {
    pub workflow: Workflow<GitVcs>,
    renderer: JoinHandle<()>,
}

impl Session {
    pub fn open(repo: &Path, config: &AppConfig) -> Result<Self> {
        let (events, rx) = EventSink::channel();
        let workflow = open_workflow(repo, config, events)?;
        Ok(Self {
            workflow,
            renderer: spawn_renderer(rx, ProgressBar::hidden()),
        })
    }

    /// Open and scan, with a progress bar over the conflicts found.
    /// The flag is `false` when there is nothing to resolve.
    pub async fn open_with_progress(repo: &Path, config: &AppConfig) -> Result<(Self, bool)> {
        let (events, rx) = EventSink::channel();
        let mut workflow = open_workflow(repo, config, events)?;
        let found = match workflow.refresh().await {
            Ok(_) => true,
            Err(WorkflowError::NoConflicts) => false,
            Err(e) => return Err(e).context("failed to scan for conflicts"),
        };
        let bar = if found {
            let progress = workflow.progress();
            progress_bar(progress.total, progress.resolved)
        } else {
            ProgressBar::hidden()
        };
        let session = Self {
            workflow,
            renderer: spawn_renderer(rx, bar),
        };
        Ok((session, found))
    }

    /// Rescan. `Ok(false)` when there is nothing to resolve.
    pub async fn refresh(&mut self) -> Result<bool> {
        match self.workflow.refresh().await {
            Ok(_) => Ok(true),
            Err(WorkflowError::NoConflicts) => Ok(false),
            Err(e) => Err(e).context("failed to scan for conflicts"),
        }
    }

    /// Drop the workflow and wait until every event has been printed.
    pub async fn finish(self) -> Result<()> {
        let Self { workflow, renderer } = self;
        drop(workflow);
        renderer.await.context("event renderer stopped unexpectedly")
    }
}

// ---------------------------------------------------------------------------
// Event rendering
// ---------------------------------------------------------------------------

/// Progress bar over `total` conflicts, positioned at `resolved`.
pub fn progress_bar(total: usize, resolved: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:30.green/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.set_position(resolved as u64);
    bar
}

/// Print workflow events as they arrive. The task ends once every sender
/// (the workflow's sink) is dropped.
pub fn spawn_renderer(mut rx: EventReceiver, bar: ProgressBar) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            render(&bar, event);
        }
        bar.finish_and_clear();
    })
}

fn render(bar: &ProgressBar, event: WorkflowEvent) {
    let line = match event {
        WorkflowEvent::ScanStarted | WorkflowEvent::ScanCompleted { .. } => {
            debug!(?event, "scan event");
            return;
        }
        WorkflowEvent::ResolutionStarted { path } => {
            bar.set_message(path);
            return;
        }
        WorkflowEvent::NoConflictsToResolve => style::success("No merge conflicts to resolve."),
        WorkflowEvent::ResolutionSucceeded { path, method } => {
            bar.inc(1);
            style::success(&format!("{} ({})", path, method))
        }
        WorkflowEvent::ResolutionFailed { path, error } => {
            style::error(&format!("{}: {}", path, error))
        }
        WorkflowEvent::ResolutionUndone { path } => {
            style::warn(&format!("{} is conflicted again", path))
        }
        WorkflowEvent::WrappedAround { path } => style::dim(&format!(
            "Reached the end of the list, continuing with {}",
            path
        )),
        WorkflowEvent::FilterResolved {
            remaining_unfiltered,
        } => style::success(&format!(
            "Every path matching the filter is resolved; {} remain outside it.",
            remaining_unfiltered
        )),
        WorkflowEvent::AllResolved => style::success("All conflicts resolved."),
        WorkflowEvent::Aborted => style::warn("Operation aborted; the repository is back to its previous state."),
    };
    if bar.is_hidden() {
        println!("{}", line);
    } else {
        bar.println(line);
    }
}
