//! [`Vcs`] backed by `git2` for index reads and the `git` CLI for commands
//! that change the working tree.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use git2::Repository;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::conflict::{ConflictRecord, MergeContext, Stage};
use crate::errors::{AbortError, ScanError, VcsError};
use crate::scanner::{self, ScanReport};
use crate::tools::StageFiles;

use super::Vcs;

/// A non-bare git repository.
#[derive(Debug, Clone)]
pub struct GitVcs {
    root: PathBuf,
    git_dir: PathBuf,
}

impl GitVcs {
    /// Open the repository containing `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let repo = scanner::open_repository(path)?;
        let root = repo
            .workdir()
            .ok_or_else(|| ScanError::BareRepository(path.display().to_string()))?
            .to_path_buf();
        let git_dir = repo.path().to_path_buf();
        info!(root = %root.display(), "opened git repository");
        Ok(Self { root, git_dir })
    }

    fn repository(&self) -> Result<Repository, VcsError> {
        Ok(Repository::open(&self.root)?)
    }

    /// Run `git` in the working tree root and return its stdout.
    async fn run_git(&self, args: &[&str]) -> Result<String, VcsError> {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.root)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(cmd = ?format!("git {}", args.join(" ")), "running git command");
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VcsError::BinaryNotFound
            } else {
                VcsError::IoError(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(exit_code, %stderr, "git command failed");
            return Err(VcsError::CommandFailed {
                command: args.join(" "),
                exit_code,
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Contents of `path` at index `stage`, if that stage exists.
    fn stage_contents(repo: &Repository, path: &str, stage: Stage) -> Result<Option<Vec<u8>>, VcsError> {
        let index = repo.index()?;
        match index.get_path(Path::new(path), stage.index_stage()) {
            Some(entry) => Ok(Some(repo.find_blob(entry.id)?.content().to_vec())),
            None => Ok(None),
        }
    }
}

/// `dir/name.ext` becomes `name.LABEL.ext`, so tools still detect the type.
fn stage_file_name(path: &str, label: &str) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}.{}.{}", stem, label, ext),
        _ => format!("{}.{}", file_name, label),
    }
}

/// Paths from `git ls-files -z --resolve-undo`, whose entries look like
/// `<mode> <sha> <stage>\t<path>`, one per recorded stage.
fn parse_resolve_undo(output: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for entry in output.split('\0') {
        if let Some((_, path)) = entry.split_once('\t') {
            if !paths.iter().any(|p| p == path) {
                paths.push(path.to_string());
            }
        }
    }
    paths
}

#[async_trait]
impl Vcs for GitVcs {
    fn repo_root(&self) -> &Path {
        &self.root
    }

    fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    async fn scan(&self) -> Result<ScanReport, ScanError> {
        scanner::scan(&self.root)
    }

    #[instrument(skip(self, record), fields(path = %record.path))]
    async fn materialize_stages(&self, record: &ConflictRecord) -> Result<StageFiles, VcsError> {
        let scratch = tempfile::Builder::new().prefix("conflux-").tempdir()?;
        let repo = self.repository()?;

        let write_stage = |stage: Stage, label: &str| -> Result<PathBuf, VcsError> {
            let target = scratch.path().join(stage_file_name(&record.path, label));
            let contents = Self::stage_contents(&repo, &record.path, stage)?.unwrap_or_default();
            std::fs::write(&target, contents)?;
            Ok(target)
        };
        let local = write_stage(Stage::Ours, "LOCAL")?;
        let remote = write_stage(Stage::Theirs, "REMOTE")?;
        let base = write_stage(Stage::Base, "BASE")?;

        debug!(dir = %scratch.path().display(), "stage files written");
        Ok(StageFiles::new(local, remote, base, self.root.join(&record.path)).with_scratch(scratch))
    }

    #[instrument(skip(self))]
    async fn checkout_stage(&self, path: &str, stage: Stage) -> Result<(), VcsError> {
        match stage.checkout_flag() {
            Some(flag) => {
                self.run_git(&["checkout", flag, "--", path]).await?;
            }
            None => {
                let contents = {
                    let repo = self.repository()?;
                    Self::stage_contents(&repo, path, stage)?
                }
                .ok_or_else(|| VcsError::MissingStage {
                    path: path.to_string(),
                    stage: stage.to_string(),
                })?;
                let target = self.root.join(path);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&target, contents)?;
            }
        }
        self.mark_resolved(path).await
    }

    #[instrument(skip(self))]
    async fn remove_path(&self, path: &str) -> Result<(), VcsError> {
        self.run_git(&["rm", "--quiet", "--force", "--", path]).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_resolved(&self, path: &str) -> Result<(), VcsError> {
        self.run_git(&["add", "--", path]).await?;
        Ok(())
    }

    async fn resolved_paths(&self) -> Result<Vec<String>, VcsError> {
        let still_conflicted: Vec<String> = scanner::scan(&self.root)?
            .records
            .into_iter()
            .map(|r| r.path)
            .collect();
        let output = self.run_git(&["ls-files", "-z", "--resolve-undo"]).await?;
        let mut paths = parse_resolve_undo(&output);
        paths.retain(|p| !still_conflicted.contains(p));
        Ok(paths)
    }

    #[instrument(skip(self))]
    async fn recreate_conflict(&self, path: &str) -> Result<(), VcsError> {
        self.run_git(&["checkout", "-m", "--", path]).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn abort(&self, context: MergeContext) -> Result<(), AbortError> {
        let repo = self.root.display().to_string();
        let Some(command) = context.abort_command() else {
            return Err(AbortError {
                operation: context.to_string(),
                repo,
                detail: "no merge, rebase, cherry-pick or revert is in progress".into(),
            });
        };
        self.run_git(&[command, "--abort"])
            .await
            .map_err(|e| AbortError {
                operation: context.to_string(),
                repo,
                detail: e.to_string(),
            })?;
        info!(%context, "operation aborted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_file_name() {
        assert_eq!(stage_file_name("img/logo.png", "LOCAL"), "logo.LOCAL.png");
        assert_eq!(stage_file_name("Makefile", "BASE"), "Makefile.BASE");
        assert_eq!(stage_file_name(".gitignore", "REMOTE"), ".gitignore.REMOTE");
        assert_eq!(stage_file_name("a/b.tar.gz", "LOCAL"), "b.tar.LOCAL.gz");
    }

    #[test]
    fn test_parse_resolve_undo() {
        let output = "100644 aaaa 1\tsrc/a b.txt\0100644 bbbb 2\tsrc/a b.txt\0100644 cccc 3\tother.txt\0";
        assert_eq!(parse_resolve_undo(output), vec!["src/a b.txt", "other.txt"]);
        assert!(parse_resolve_undo("").is_empty());
    }

    #[test]
    fn test_open_non_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GitVcs::open(dir.path()),
            Err(ScanError::NotARepository(_))
        ));
    }

    #[test]
    fn test_open_reports_root_and_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let vcs = GitVcs::open(dir.path()).unwrap();
        assert!(vcs.git_dir().ends_with(".git"));
        assert_eq!(
            vcs.repo_root().canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn test_resolved_paths_reports_unreadable_index() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let vcs = GitVcs::open(dir.path()).unwrap();
        std::fs::remove_dir_all(dir.path().join(".git")).unwrap();

        let err = vcs.resolved_paths().await.unwrap_err();
        assert!(matches!(err, VcsError::Scan(ScanError::NotARepository(_))));
    }

    #[tokio::test]
    async fn test_abort_without_operation_fails() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let vcs = GitVcs::open(dir.path()).unwrap();
        let err = vcs.abort(MergeContext::Unknown).await.unwrap_err();
        assert!(err.to_string().contains("no merge"));
    }
}
