//! A single owned subprocess-spawn helper for git invocations, carrying the
//! workspace git timeout uniformly rather than each call site hand-rolling
//! its own `tokio::select!`.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

use wp_domain::{Error, Result};

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}

/// Run `git <args>` in `cwd`, killing it if it outruns `timeout`.
/// Failures of every kind (spawn error, non-UTF8 output, timeout) are
/// reported as `Error::Workspace` — callers never see a bare `io::Error`.
pub async fn run_git(cwd: &Path, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(cwd);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let child = cmd
        .spawn()
        .map_err(|err| Error::Workspace(format!("spawning git {args:?}: {err}")))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| Error::Workspace(format!("git {args:?} timed out after {timeout:?}")))?
        .map_err(|err| Error::Workspace(format!("waiting on git {args:?}: {err}")))?;

    Ok(CommandOutput {
        status_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn git_version_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_git(dir.path(), &["--version"], Duration::from_secs(5)).await.unwrap();
        assert!(output.success());
        assert!(output.stdout.contains("git version"));
    }

    #[tokio::test]
    async fn unknown_subcommand_fails_without_erroring_the_call() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_git(dir.path(), &["not-a-real-subcommand"], Duration::from_secs(5)).await.unwrap();
        assert!(!output.success());
    }

    #[tokio::test]
    async fn timeout_is_reported_as_workspace_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_git(dir.path(), &["--version"], Duration::from_millis(0)).await;
        // A zero timeout races with process exit; accept either outcome but
        // require that any error is reported as Workspace, never bubbled raw.
        if let Err(err) = result {
            assert!(matches!(err, Error::Workspace(_)));
        }
    }
}
