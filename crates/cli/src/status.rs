//! `conflux status`: the conflicted paths and what can be done with them.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use conflux_core::conflict::ConflictRecord;
use conflux_core::tools::{Purpose, ToolLookup, ToolSet};
use conflux_core::vcs::{GitVcs, Vcs};
use conflux_core::workflow::Workflow;
use conflux_core::WorkflowError;

use crate::style;

pub async fn run_status(mut workflow: Workflow<GitVcs>, filter: Option<String>) -> Result<()> {
    let resolved_earlier = workflow
        .vcs()
        .resolved_paths()
        .await
        .context("failed to read resolved paths")?;

    match workflow.refresh().await {
        Ok(_) => {}
        Err(WorkflowError::NoConflicts) => {
            println!("{}", style::success("No merge conflicts."));
            if !resolved_earlier.is_empty() {
                println!(
                    "  {}",
                    style::dim(&format!(
                        "{} path(s) resolved; commit or continue the operation to finish.",
                        resolved_earlier.len()
                    ))
                );
            }
            return Ok(());
        }
        Err(e) => return Err(e).context("failed to scan for conflicts"),
    }
    if let Some(expression) = filter {
        workflow.set_filter(conflux_core::PathFilter::parse(&expression));
    }

    let registry = workflow.registry();
    let (context, records): (_, Vec<ConflictRecord>) = {
        let guard = registry.read();
        (guard.context(), guard.filtered().into_iter().cloned().collect())
    };
    let progress = registry.progress();

    println!();
    println!(
        "{}",
        style::header(&format!("Merge conflicts ({})", context))
    );
    println!(
        "  {} of {} unresolved",
        progress.remaining(),
        progress.total
    );
    if records.len() != progress.total {
        println!(
            "  {}",
            style::dim(&format!("{} match the filter", records.len()))
        );
    }
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["", "Path", "Conflict", "State", "Merge tool", "Actions"]);

    for record in &records {
        let actions: Vec<&str> = record
            .available_actions(context)
            .iter()
            .map(|a| a.keyword())
            .collect();
        table.add_row(vec![
            Cell::new(record.kind.short_code()).fg(style::kind_color(record.kind)),
            Cell::new(&record.path),
            Cell::new(record.kind.to_string()),
            Cell::new(record.state.to_string()).fg(style::state_color(record.state)),
            Cell::new(tool_label(workflow.tools(), record)),
            Cell::new(actions.join(", ")),
        ]);
    }
    println!("{table}");

    if !resolved_earlier.is_empty() {
        println!();
        println!(
            "{}",
            style::dim(&format!(
                "Already resolved (undo with `conflux undo <path>`): {}",
                resolved_earlier.join(", ")
            ))
        );
    }
    Ok(())
}

fn tool_label(tools: &ToolSet, record: &ConflictRecord) -> String {
    if !record.kind.is_mergeable() {
        return "-".into();
    }
    match tools.lookup(&record.path, Purpose::Merge) {
        ToolLookup::Found(tool) => tool.name.clone(),
        ToolLookup::Disabled(tool) => format!("{} (disabled)", tool.name),
        ToolLookup::NotFound => "none".into(),
    }
}
