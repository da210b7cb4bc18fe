//! Process launching behind a narrow trait.
//!
//! The workflow never spawns processes directly; it goes through a
//! [`ProcessRunner`] so tests can substitute a fake.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawExit {
    /// Exit code; `None` when the process did not exit normally.
    pub code: Option<i32>,
    /// Terminating signal on Unix.
    pub signal: Option<i32>,
}

impl RawExit {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn killed(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Terminated abnormally rather than exiting with a code.
    pub fn crashed(&self) -> bool {
        self.code.is_none()
    }
}

impl From<ExitStatus> for RawExit {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Launches a program and waits for it to finish.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `program` with `args` in `cwd`. An `Err` means the process could
    /// not be started at all.
    async fn invoke(&self, program: &str, args: &[String], cwd: &Path) -> std::io::Result<RawExit>;
}

/// Runs tools as child processes sharing the caller's terminal, so
/// interactive editors and GUI tools work.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    #[instrument(skip(self, args), fields(cwd = %cwd.display()))]
    async fn invoke(&self, program: &str, args: &[String], cwd: &Path) -> std::io::Result<RawExit> {
        debug!(program, ?args, "launching tool");
        let status = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| {
                warn!(program, error = %e, "failed to launch tool");
                e
            })?;
        let exit = RawExit::from(status);
        debug!(program, ?exit, "tool finished");
        Ok(exit)
    }
}
