//! End-to-end tests for conflict resolution against real git repositories.
//!
//! Each test builds a throwaway repository in a `TempDir`, produces a merge
//! with conflicts using the `git` CLI, and drives `GitVcs` plus the workflow
//! over it.
//!
//! Tests skip gracefully if `git` is not installed.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tempfile::TempDir;

use conflux_core::config::{AppConfig, ToolConfig, ToolKind};
use conflux_core::conflict::{ConflictKind, MergeContext, ResolutionAction, ResolutionState};
use conflux_core::events::{EventSink, WorkflowEvent};
use conflux_core::scanner;
use conflux_core::tools::TokioProcessRunner;
use conflux_core::vcs::{GitVcs, Vcs};
use conflux_core::workflow::{StepOutcome, Workflow, WorkflowState};
use conflux_core::WorkflowError;

// ===========================================================================
// Helpers
// ===========================================================================

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn git_raw(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new("git")
        .current_dir(dir)
        .args([
            "-c",
            "user.name=Test User",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "core.autocrlf=false",
        ])
        .args(args)
        .output()
        .expect("failed to run git")
}

fn git(dir: &Path, args: &[&str]) {
    let output = git_raw(dir, args);
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

fn read(dir: &Path, name: &str) -> String {
    std::fs::read_to_string(dir.join(name)).unwrap()
}

const OURS: &str = "line1\nours\nline3\n";
const THEIRS: &str = "line1\ntheirs\nline3\n";

/// A repository on `main` in the middle of merging `topic`, with:
///
/// * `conflict.txt` modified on both sides,
/// * `added.txt` added on both sides,
/// * `deleted.txt` modified on main and deleted on topic.
fn conflicted_repo() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    git(dir, &["init", "-q"]);
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);

    write(dir, "conflict.txt", "line1\nbase\nline3\n");
    write(dir, "deleted.txt", "keep me\n");
    write(dir, "clean.txt", "untouched\n");
    git(dir, &["add", "."]);
    git(dir, &["commit", "-q", "-m", "base"]);

    git(dir, &["checkout", "-q", "-b", "topic"]);
    write(dir, "conflict.txt", THEIRS);
    write(dir, "added.txt", "theirs added\n");
    git(dir, &["rm", "-q", "deleted.txt"]);
    git(dir, &["add", "."]);
    git(dir, &["commit", "-q", "-m", "topic"]);

    git(dir, &["checkout", "-q", "main"]);
    write(dir, "conflict.txt", OURS);
    write(dir, "added.txt", "ours added\n");
    write(dir, "deleted.txt", "keep me, modified\n");
    git(dir, &["add", "."]);
    git(dir, &["commit", "-q", "-m", "main"]);

    let merge = git_raw(dir, &["merge", "--no-edit", "topic"]);
    assert!(!merge.status.success(), "merge was expected to conflict");
    tmp
}

/// A repository merging `topic` into `main` where both sides changed the
/// binary `logo.png`.
fn binary_conflict_repo() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    git(dir, &["init", "-q"]);
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);

    std::fs::write(dir.join("logo.png"), [0x89, b'P', b'N', b'G', 0x00, 0x00]).unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-q", "-m", "base"]);

    git(dir, &["checkout", "-q", "-b", "topic"]);
    std::fs::write(dir.join("logo.png"), [0x89, b'P', b'N', b'G', 0x00, 0x02]).unwrap();
    git(dir, &["commit", "-q", "-am", "topic"]);

    git(dir, &["checkout", "-q", "main"]);
    std::fs::write(dir.join("logo.png"), [0x89, b'P', b'N', b'G', 0x00, 0x01]).unwrap();
    git(dir, &["commit", "-q", "-am", "main"]);

    let merge = git_raw(dir, &["merge", "--no-edit", "topic"]);
    assert!(!merge.status.success(), "merge was expected to conflict");
    tmp
}

fn config_with(tools: Vec<ToolConfig>) -> AppConfig {
    AppConfig {
        tools,
        ..Default::default()
    }
}

fn open_workflow(dir: &Path, tools: Vec<ToolConfig>) -> Workflow<GitVcs> {
    let vcs = GitVcs::open(dir).expect("failed to open repository");
    Workflow::new(
        vcs,
        &config_with(tools),
        Arc::new(TokioProcessRunner),
        EventSink::disconnected(),
    )
}

fn conflicted_paths(dir: &Path) -> Vec<String> {
    scanner::scan(dir)
        .unwrap()
        .records
        .into_iter()
        .map(|r| r.path)
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn test_scan_classifies_real_conflicts() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let repo = conflicted_repo();
    let vcs = GitVcs::open(repo.path()).unwrap();
    let report = vcs.scan().await.unwrap();

    assert_eq!(report.context, MergeContext::Merge);
    let kinds: Vec<(&str, ConflictKind)> = report
        .records
        .iter()
        .map(|r| (r.path.as_str(), r.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("added.txt", ConflictKind::BothAdded),
            ("conflict.txt", ConflictKind::BothModified),
            ("deleted.txt", ConflictKind::DeletedByThem),
        ]
    );
    assert!(report
        .records
        .iter()
        .all(|r| r.state == ResolutionState::Unresolved));
}

#[tokio::test]
async fn test_stage_files_hold_each_side() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let repo = conflicted_repo();
    let vcs = GitVcs::open(repo.path()).unwrap();
    let report = vcs.scan().await.unwrap();

    let conflict = report.records.iter().find(|r| r.path == "conflict.txt").unwrap();
    let files = vcs.materialize_stages(conflict).await.unwrap();
    assert_eq!(std::fs::read_to_string(&files.local).unwrap(), OURS);
    assert_eq!(std::fs::read_to_string(&files.remote).unwrap(), THEIRS);
    assert_eq!(std::fs::read_to_string(&files.base).unwrap(), "line1\nbase\nline3\n");

    // Added on both sides: there is no common ancestor.
    let added = report.records.iter().find(|r| r.path == "added.txt").unwrap();
    let files = vcs.materialize_stages(added).await.unwrap();
    assert_eq!(std::fs::read_to_string(&files.base).unwrap(), "");
    assert!(files.local.to_string_lossy().ends_with("added.LOCAL.txt"));
}

#[tokio::test]
async fn test_use_ours_then_undo() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let repo = conflicted_repo();
    let mut wf = open_workflow(repo.path(), vec![]);
    assert_eq!(wf.refresh().await.unwrap(), 3);

    wf.apply_action("conflict.txt", ResolutionAction::UseOurs)
        .await
        .unwrap();
    assert_eq!(read(repo.path(), "conflict.txt"), OURS);
    assert!(!conflicted_paths(repo.path()).contains(&"conflict.txt".to_string()));

    wf.undo_resolution("conflict.txt").await.unwrap();
    assert!(conflicted_paths(repo.path()).contains(&"conflict.txt".to_string()));
    assert!(read(repo.path(), "conflict.txt").contains("<<<<<<<"));
    assert_eq!(
        wf.registry().get("conflict.txt").unwrap().state,
        ResolutionState::Unresolved
    );
}

#[tokio::test]
async fn test_undo_after_rescan_uses_resolve_undo() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let repo = conflicted_repo();
    let mut wf = open_workflow(repo.path(), vec![]);
    wf.refresh().await.unwrap();
    wf.apply_action("conflict.txt", ResolutionAction::UseTheirs)
        .await
        .unwrap();

    // A new session only sees the remaining conflicts.
    let mut wf = open_workflow(repo.path(), vec![]);
    assert_eq!(wf.refresh().await.unwrap(), 2);
    assert_eq!(wf.vcs().resolved_paths().await.unwrap(), vec!["conflict.txt"]);

    wf.undo_resolution("conflict.txt").await.unwrap();
    assert_eq!(wf.registry().read().len(), 3);
    assert!(conflicted_paths(repo.path()).contains(&"conflict.txt".to_string()));

    // Never conflicted, so there is nothing to undo.
    assert!(wf.undo_resolution("clean.txt").await.is_err());
    assert_eq!(read(repo.path(), "clean.txt"), "untouched\n");
}

#[tokio::test]
async fn test_delete_and_keep_modified() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let repo = conflicted_repo();
    let mut wf = open_workflow(repo.path(), vec![]);
    wf.refresh().await.unwrap();

    wf.apply_action("deleted.txt", ResolutionAction::DeleteFile)
        .await
        .unwrap();
    assert!(!repo.path().join("deleted.txt").exists());

    wf.apply_action("added.txt", ResolutionAction::UseModified)
        .await
        .unwrap();
    assert_eq!(read(repo.path(), "added.txt"), "theirs added\n");

    assert_eq!(conflicted_paths(repo.path()), vec!["conflict.txt"]);
    assert_eq!(wf.progress().remaining(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_external_tool_resolves_with_real_process() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let repo = conflicted_repo();
    let take_theirs = ToolConfig {
        name: "take-theirs".into(),
        suffixes: vec!["txt".into()],
        kind: ToolKind::Merge,
        command: r#"sh -c 'cp "$0" "$1"' $REMOTE $MERGED"#.into(),
        enabled: true,
    };
    let quitter = ToolConfig {
        name: "quitter".into(),
        suffixes: vec!["txt".into()],
        kind: ToolKind::Merge,
        command: "sh -c 'exit 1'".into(),
        enabled: true,
    };

    // A tool that gives up leaves the conflict in place.
    let mut wf = open_workflow(repo.path(), vec![quitter]);
    wf.refresh().await.unwrap();
    assert!(wf.resolve_path("conflict.txt").await.is_err());
    assert!(conflicted_paths(repo.path()).contains(&"conflict.txt".to_string()));

    let vcs = GitVcs::open(repo.path()).unwrap();
    let (events, mut rx) = EventSink::channel();
    let mut wf = Workflow::new(
        vcs,
        &config_with(vec![take_theirs]),
        Arc::new(TokioProcessRunner),
        events,
    );
    wf.refresh().await.unwrap();
    let outcome = wf.resolve_path("conflict.txt").await.unwrap();
    assert!(matches!(outcome, StepOutcome::Resolved { .. }));
    assert_eq!(read(repo.path(), "conflict.txt"), THEIRS);
    assert!(!conflicted_paths(repo.path()).contains(&"conflict.txt".to_string()));
    assert_eq!(
        wf.registry().get("conflict.txt").unwrap().tool_used.as_deref(),
        Some("take-theirs")
    );

    let mut saw_success = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, WorkflowEvent::ResolutionSucceeded { ref path, .. } if path == "conflict.txt") {
            saw_success = true;
        }
    }
    assert!(saw_success);
}

#[cfg(unix)]
#[tokio::test]
async fn test_tool_that_saves_nothing_leaves_binary_conflict() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let repo = binary_conflict_repo();
    let noop = ToolConfig {
        name: "noop".into(),
        suffixes: vec!["png".into()],
        kind: ToolKind::Merge,
        command: "true $LOCAL $REMOTE $BASE $MERGED".into(),
        enabled: true,
    };
    let mut wf = open_workflow(repo.path(), vec![noop]);
    assert_eq!(wf.refresh().await.unwrap(), 1);

    let err = wf.resolve_path("logo.png").await.unwrap_err();
    match err {
        WorkflowError::NotResolvedByTool { reason, .. } => assert!(reason.contains("unchanged")),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(conflicted_paths(repo.path()), vec!["logo.png"]);
    assert_eq!(
        wf.registry().get("logo.png").unwrap().state,
        ResolutionState::Unresolved
    );
    assert_eq!(
        std::fs::read(repo.path().join("logo.png")).unwrap(),
        vec![0x89, b'P', b'N', b'G', 0x00, 0x01]
    );
}

#[tokio::test]
async fn test_abort_restores_pre_merge_state() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let repo = conflicted_repo();
    let mut wf = open_workflow(repo.path(), vec![]);
    wf.refresh().await.unwrap();

    wf.abort().await.unwrap();
    assert_eq!(wf.state(), &WorkflowState::Aborted);
    assert!(conflicted_paths(repo.path()).is_empty());
    assert_eq!(read(repo.path(), "conflict.txt"), OURS);
    assert!(!repo.path().join(".git/MERGE_HEAD").exists());
}

#[tokio::test]
async fn test_resolving_everything_completes() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let repo = conflicted_repo();
    let mut wf = open_workflow(repo.path(), vec![]);
    wf.refresh().await.unwrap();

    wf.apply_action("added.txt", ResolutionAction::UseCreated)
        .await
        .unwrap();
    wf.apply_action("conflict.txt", ResolutionAction::UseTheirs)
        .await
        .unwrap();
    wf.apply_action("deleted.txt", ResolutionAction::UseModified)
        .await
        .unwrap();
    assert_eq!(wf.state(), &WorkflowState::Completed);
    assert_eq!(read(repo.path(), "deleted.txt"), "keep me, modified\n");

    // A rescan after completion finds nothing and does not fail.
    assert_eq!(wf.refresh().await.unwrap(), 0);
}
