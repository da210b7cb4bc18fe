//! Conflux command-line merge conflict resolver.
//!
//! Lists the conflicts left by a merge, rebase, cherry-pick or revert,
//! opens the configured diff/merge tool for each path, resolves paths by
//! picking a side, and undoes or aborts resolutions.

mod log;
mod resolve;
mod session;
mod status;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use dialoguer::Confirm;
use tracing_subscriber::EnvFilter;

use conflux_core::config::{AppConfig, REPO_CONFIG_FILE};
use conflux_core::events::EventSink;

use resolve::ResolveOptions;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Conflux command-line merge conflict resolver.
#[derive(Parser, Debug)]
#[command(
    name = "conflux",
    version,
    about = "Work through a repository's merge conflicts"
)]
struct Cli {
    /// Path to the TOML configuration file. Defaults to `.conflux.toml` in
    /// the repository, then the user configuration directory.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Repository to operate on.
    #[arg(short = 'C', long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the conflicted paths.
    Status {
        /// Only show paths matching this glob or substring.
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Resolve conflicts with the configured merge tools.
    Resolve {
        /// Resolve this path instead of the next unresolved one.
        path: Option<String>,

        /// Keep going until every conflict is resolved or a tool fails.
        #[arg(long)]
        continuous: bool,

        /// Only visit paths matching this glob or substring.
        #[arg(short, long)]
        filter: Option<String>,

        /// Leave these paths for later.
        #[arg(long, value_name = "PATH")]
        skip: Vec<String>,
    },

    /// Resolve paths without a tool by picking a side or deleting them.
    Use {
        /// ours, theirs, local, remote, created, modified or delete.
        action: String,

        /// Conflicted paths.
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Compare the two sides of a conflicted path in the diff tool.
    Diff {
        path: String,
    },

    /// Put resolved paths back into conflict.
    Undo {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Abort the merge, rebase, cherry-pick or revert.
    Abort {
        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show recent conflict log entries.
    Log {
        /// Maximum number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print one JSON object per line.
        #[arg(long)]
        json: bool,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file without asking.
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration file.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `--log-level` wins over `RUST_LOG`, which wins over the configured level.
fn init_tracing(explicit: Option<&str>, configured: &str) {
    let filter = match explicit {
        Some(level) => EnvFilter::try_new(level),
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(configured)),
    }
    .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let root = session::repo_root(&cli.repo);

    match cli.command {
        Commands::Init { output, force } => {
            init_tracing(cli.log_level.as_deref(), "warn");
            let output = output.unwrap_or_else(|| root.join(REPO_CONFIG_FILE));
            return cmd_init(&session::expand_tilde(&output), force);
        }
        Commands::Validate => {
            init_tracing(cli.log_level.as_deref(), "warn");
            return cmd_validate(cli.config.as_deref(), &root);
        }
        _ => {}
    }

    let (config, _) = session::load_config(cli.config.as_deref(), &root)?;
    init_tracing(cli.log_level.as_deref(), &config.general.log_level);

    let repo = cli.repo.as_path();
    match cli.command {
        Commands::Status { filter } => {
            let workflow = session::open_workflow(repo, &config, EventSink::disconnected())?;
            status::run_status(workflow, filter).await
        }
        Commands::Resolve {
            path,
            continuous,
            filter,
            skip,
        } => {
            let opts = ResolveOptions {
                path,
                continuous,
                filter,
                skip,
            };
            resolve::run_resolve(repo, &config, opts).await
        }
        Commands::Use { action, paths } => resolve::run_use(repo, &config, &action, &paths).await,
        Commands::Diff { path } => resolve::run_diff(repo, &config, &path).await,
        Commands::Undo { paths } => resolve::run_undo(repo, &config, &paths).await,
        Commands::Abort { yes } => resolve::run_abort(repo, &config, yes).await,
        Commands::Log { limit, json } => log::run_log(repo, &config, limit, json),
        Commands::Init { .. } | Commands::Validate => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Configuration subcommands
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", output.display()))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        if !overwrite {
            println!("Keeping the existing file.");
            return Ok(());
        }
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("failed to create config directory")?;
    }
    std::fs::write(output, AppConfig::default_toml()).context("failed to write config file")?;

    println!("{}", style::success(&format!("Default configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Add a [[tools]] entry for each diff/merge tool you use");
    println!(
        "  2. Validate with: conflux validate --config {}",
        output.display()
    );
    println!("  3. After a conflicting merge: conflux status, then conflux resolve --continuous");

    Ok(())
}

fn cmd_validate(explicit: Option<&Path>, root: &Path) -> Result<()> {
    let path = match explicit {
        Some(path) => session::expand_tilde(path),
        None => session::config_candidates(root)
            .into_iter()
            .find(|p| p.exists())
            .context("no configuration file found; create one with `conflux init`")?,
    };
    println!("Validating configuration: {}", path.display());
    println!();

    let config = AppConfig::load_from_file(&path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    match config.validate() {
        Ok(()) => println!("  [OK] All fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  Log level      : {}", config.general.log_level);
    println!("  Wrap around    : {}", config.general.wrap_around);
    println!("  Reject markers : {}", config.general.reject_conflict_markers);
    println!(
        "  Conflict log   : {}",
        if config.log.enabled {
            format!("{} at {}", config.log.format, config.log.path.display())
        } else {
            "disabled".to_string()
        }
    );
    println!();

    if config.tools.is_empty() {
        println!("{}", style::warn("No tools configured; only direct actions are available."));
    } else {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Tool", "Kind", "Suffixes", "Enabled", "Command"]);
        for tool in &config.tools {
            table.add_row(vec![
                Cell::new(&tool.name),
                Cell::new(tool.kind.to_string()),
                Cell::new(tool.suffixes.join(" ")),
                Cell::new(if tool.enabled { "yes" } else { "no" }),
                Cell::new(truncate(&tool.command, 60)),
            ]);
        }
        println!("{table}");
        println!();
    }
    println!("Configuration is valid.");

    Ok(())
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
