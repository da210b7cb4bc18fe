//! `conflux log`: recent entries of the conflict log.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use conflux_core::conflict_log::{self, ConflictLogEntry};
use conflux_core::vcs::{GitVcs, Vcs};
use conflux_core::AppConfig;

use crate::style;

pub fn run_log(repo: &Path, config: &AppConfig, limit: usize, json: bool) -> Result<()> {
    let vcs = GitVcs::open(repo).context("failed to open repository")?;
    if !config.log.enabled {
        println!(
            "{}",
            style::warn("The conflict log is disabled; set `log.enabled = true` to record resolutions.")
        );
    }

    let entries = conflict_log::read_recent(&config.log, vcs.git_dir(), limit)
        .context("failed to read the conflict log")?;

    if json {
        for entry in &entries {
            println!("{}", serde_json::to_string(entry)?);
        }
        return Ok(());
    }

    if entries.is_empty() {
        println!("No resolutions logged.");
        return Ok(());
    }

    println!();
    println!(
        "{}",
        style::header(&format!("Conflict log (last {})", limit))
    );
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Time", "Path", "Conflict", "Outcome", "Method", "Session"]);
    for entry in &entries {
        table.add_row(row(entry));
    }
    println!("{table}");
    println!();
    println!("{} entries shown", entries.len());
    Ok(())
}

fn row(entry: &ConflictLogEntry) -> Vec<Cell> {
    let method = entry
        .method
        .as_ref()
        .map(|m| m.to_string())
        .unwrap_or_else(|| "-".into());
    let session = entry.session_id.to_string();
    vec![
        Cell::new(
            entry
                .logged_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
        ),
        Cell::new(&entry.path),
        Cell::new(entry.kind.short_code()),
        Cell::new(format!("{:?}", entry.outcome).to_lowercase()),
        Cell::new(method),
        Cell::new(&session[..8]),
    ]
}
