//! Subcommands that change resolution state: resolve, use, diff, undo and
//! abort.

use std::path::Path;

use anyhow::{Context, Result};
use dialoguer::Confirm;

use conflux_core::conflict::{MergeContext, ResolutionAction};
use conflux_core::workflow::StepOutcome;
use conflux_core::{AppConfig, PathFilter, WorkflowError};

use crate::session::Session;
use crate::style;

/// Options of `conflux resolve`.
#[derive(Debug, Default)]
pub struct ResolveOptions {
    pub path: Option<String>,
    pub continuous: bool,
    pub filter: Option<String>,
    pub skip: Vec<String>,
}

pub async fn run_resolve(repo: &Path, config: &AppConfig, opts: ResolveOptions) -> Result<()> {
    let (mut session, found) = Session::open_with_progress(repo, config).await?;
    if !found {
        return session.finish().await;
    }

    let result = resolve(&mut session, opts).await;
    let context = session.workflow.registry().read().context();
    let remaining = session.workflow.progress().remaining();
    session.finish().await?;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            if e.downcast_ref::<WorkflowError>().is_some_and(WorkflowError::is_tool_failure) {
                println!(
                    "  {}",
                    style::dim("Add a [[tools]] entry for it, or resolve it with `conflux use <action> <path>`.")
                );
            }
            return Err(e);
        }
    };
    match outcome {
        StepOutcome::AllResolved => println!("  {}", style::dim(&finish_hint(context))),
        StepOutcome::EndOfList => println!(
            "{}",
            style::warn(&format!(
                "Nothing left to visit; {} conflict(s) remain skipped or out of reach.",
                remaining
            ))
        ),
        StepOutcome::Resolved { .. } | StepOutcome::FilterResolved { .. } => {
            if remaining > 0 {
                println!("  {}", style::dim(&format!("{} conflict(s) remaining", remaining)));
            }
        }
    }
    Ok(())
}

async fn resolve(session: &mut Session, opts: ResolveOptions) -> Result<StepOutcome> {
    let workflow = &mut session.workflow;
    for path in &opts.skip {
        workflow
            .skip(path)
            .with_context(|| format!("cannot skip '{}'", path))?;
    }
    let filter = opts.filter.as_deref().map(PathFilter::parse);

    if let Some(path) = opts.path {
        return Ok(workflow.resolve_path(&path).await?);
    }
    if opts.continuous {
        let report = workflow.resolve_continuous(filter).await?;
        return Ok(report.stopped);
    }
    if let Some(filter) = filter {
        workflow.set_filter(filter);
    }
    Ok(workflow.resolve_next().await?)
}

/// `conflux use <action> <path>...`
pub async fn run_use(repo: &Path, config: &AppConfig, action: &str, paths: &[String]) -> Result<()> {
    let action: ResolutionAction = action.parse().map_err(anyhow::Error::msg)?;
    let mut session = Session::open(repo, config)?;
    if !session.refresh().await? {
        return session.finish().await;
    }

    let mut result = Ok(());
    for path in paths {
        if let Err(e) = session.workflow.apply_action(path, action).await {
            result = Err(explain_action_error(&session, path, e));
            break;
        }
    }
    let done = session.workflow.progress().all_resolved();
    let context = session.workflow.registry().read().context();
    session.finish().await?;
    result?;
    if done {
        println!("  {}", style::dim(&finish_hint(context)));
    }
    Ok(())
}

fn explain_action_error(session: &Session, path: &str, error: WorkflowError) -> anyhow::Error {
    if let WorkflowError::ActionUnavailable { .. } = error {
        let registry = session.workflow.registry();
        let context = registry.read().context();
        if let Some(record) = registry.get(path) {
            let available: Vec<&str> = record
                .available_actions(context)
                .iter()
                .map(|a| a.keyword())
                .collect();
            return anyhow::anyhow!(
                "{}: {} (available: {})",
                style::conflict_label(record.kind, path),
                error,
                available.join(", ")
            );
        }
    }
    error.into()
}

/// `conflux diff <path>`
pub async fn run_diff(repo: &Path, config: &AppConfig, path: &str) -> Result<()> {
    let mut session = Session::open(repo, config)?;
    if !session.refresh().await? {
        return session.finish().await;
    }
    let result = session.workflow.diff(path).await;
    session.finish().await?;
    result.with_context(|| format!("failed to diff '{}'", path))
}

/// `conflux undo <path>...`
pub async fn run_undo(repo: &Path, config: &AppConfig, paths: &[String]) -> Result<()> {
    let mut session = Session::open(repo, config)?;
    // Undoing the last resolution starts from a repository without conflicts.
    session.refresh().await?;

    let mut result = Ok(());
    for path in paths {
        if let Err(e) = session.workflow.undo_resolution(path).await {
            result = Err(e).with_context(|| format!("cannot undo '{}'", path));
            break;
        }
    }
    session.finish().await?;
    result
}

/// `conflux abort`
pub async fn run_abort(repo: &Path, config: &AppConfig, yes: bool) -> Result<()> {
    let mut session = Session::open(repo, config)?;
    session.refresh().await?;

    let context = session.workflow.registry().read().context();
    if !yes && context != MergeContext::Unknown {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Abort the {} and discard every resolution made so far?",
                context
            ))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        if !confirmed {
            println!("Nothing changed.");
            return session.finish().await;
        }
    }

    let result = session.workflow.abort().await;
    session.finish().await?;
    result.context("failed to abort")
}

/// How to conclude the operation once nothing is conflicted.
fn finish_hint(context: MergeContext) -> String {
    match context.abort_command() {
        Some("merge") => "Run `git commit` to conclude the merge.".into(),
        Some(command) => format!("Run `git {} --continue` to proceed.", command),
        None => "Review and commit the result.".into(),
    }
}
