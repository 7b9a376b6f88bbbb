//! The non-forked workspace `deploy` steps run against: no branch
//! isolation, operating directly on the checkout an operator already has
//! in place. Grounded on [`crate::ShadowForkWorkspace`]'s git-subprocess
//! shape, stripped of the branch-claim machinery a real promotion step must
//! not have.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use wp_domain::{Error, Result};

use crate::process::run_git;
use crate::trait_def::Workspace;

pub struct RealWorkspace {
    repo_root: PathBuf,
    git_timeout: Duration,
}

impl RealWorkspace {
    pub fn open(repo_root: impl Into<PathBuf>, git_timeout: Duration) -> Self {
        Self { repo_root: repo_root.into(), git_timeout }
    }

    pub fn root(&self) -> &Path {
        &self.repo_root
    }

    pub async fn current_branch(&self) -> Result<String> {
        let output = run_git(&self.repo_root, &["rev-parse", "--abbrev-ref", "HEAD"], self.git_timeout).await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Stage and commit everything in the checkout's current branch,
    /// returning the new commit hash, or `None` if there was nothing to
    /// commit. No branch switch happens here — the operator's checked-out
    /// branch is whatever it already was.
    pub async fn commit_all(&self, message: &str) -> Result<Option<String>> {
        run_git(&self.repo_root, &["add", "-A"], self.git_timeout).await?;
        let status = run_git(&self.repo_root, &["status", "--porcelain"], self.git_timeout).await?;
        if status.stdout.trim().is_empty() {
            return Ok(None);
        }
        let commit = run_git(&self.repo_root, &["commit", "-m", message], self.git_timeout).await?;
        if !commit.success() {
            return Err(Error::Workspace(format!("git commit failed: {}", commit.stderr)));
        }
        let rev = run_git(&self.repo_root, &["rev-parse", "HEAD"], self.git_timeout).await?;
        Ok(Some(rev.stdout.trim().to_string()))
    }

    pub async fn written_paths(&self) -> Result<Vec<PathBuf>> {
        let status = run_git(&self.repo_root, &["status", "--porcelain"], self.git_timeout).await?;
        Ok(status
            .stdout
            .lines()
            .filter_map(|line| line.get(3..))
            .map(|rel| self.repo_root.join(rel.trim()))
            .collect())
    }
}

#[async_trait]
impl Workspace for RealWorkspace {
    fn root(&self) -> &Path {
        RealWorkspace::root(self)
    }

    async fn current_branch(&self) -> Result<String> {
        RealWorkspace::current_branch(self).await
    }

    async fn commit_all(&self, message: &str) -> Result<Option<String>> {
        RealWorkspace::commit_all(self, message).await
    }

    fn release(&self) -> Result<()> {
        Ok(())
    }

    async fn written_paths(&self) -> Result<Vec<PathBuf>> {
        RealWorkspace::written_paths(self).await
    }

    fn is_shadow(&self) -> bool {
        false
    }

    fn real_repo_root(&self) -> Option<&Path> {
        Some(&self.repo_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn init_repo(dir: &Path) {
        run_git(dir, &["init", "-q"], Duration::from_secs(5)).await.unwrap();
        run_git(dir, &["config", "user.email", "test@example.com"], Duration::from_secs(5)).await.unwrap();
        run_git(dir, &["config", "user.name", "test"], Duration::from_secs(5)).await.unwrap();
        std::fs::write(dir.join("README.md"), "hello\n").unwrap();
        run_git(dir, &["add", "-A"], Duration::from_secs(5)).await.unwrap();
        run_git(dir, &["commit", "-q", "-m", "init"], Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn commits_directly_on_whatever_branch_is_checked_out() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;
        let workspace = RealWorkspace::open(dir.path(), Duration::from_secs(5));
        let branch_before = workspace.current_branch().await.unwrap();

        std::fs::write(dir.path().join("promoted.txt"), "v2").unwrap();
        let rev = workspace.commit_all("promote build").await.unwrap();
        assert!(rev.is_some());
        assert_eq!(workspace.current_branch().await.unwrap(), branch_before);
    }

    #[tokio::test]
    async fn reports_no_real_repo_root_distinct_from_shadow() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;
        let workspace = RealWorkspace::open(dir.path(), Duration::from_secs(5));
        assert!(!Workspace::is_shadow(&workspace));
        assert_eq!(Workspace::real_repo_root(&workspace), Some(dir.path()));
    }
}
