//! Shadow-fork isolation: every run gets its own branch off the real repo,
//! so steps can commit freely without ever touching the branch an operator
//! actually has checked out.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use wp_domain::{Error, Result};

use crate::process::run_git;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MarkerFile {
    run_id: String,
    branch: String,
    created_at: chrono::DateTime<Utc>,
}

/// A workspace bound to one run, isolated on its own git branch inside the
/// same working copy as the real repo.
pub struct ShadowForkWorkspace {
    repo_root: PathBuf,
    run_id: String,
    branch: String,
    git_timeout: Duration,
    base_branch: String,
    base_head: Option<String>,
}

fn marker_path(repo_root: &Path) -> PathBuf {
    repo_root.join(".git").join("wp-shadow-fork-lock")
}

impl ShadowForkWorkspace {
    pub fn branch_name(run_id: &str) -> String {
        format!("wp-run/{run_id}")
    }

    /// Claim the repo root for this run. Fails fast (rather than queueing)
    /// if another run's marker is already present and its branch still
    /// exists, per the no-serialization decision for concurrent runs
    /// targeting the same repo root.
    pub async fn create(repo_root: impl Into<PathBuf>, run_id: &str, git_timeout: Duration) -> Result<Self> {
        let repo_root = repo_root.into();
        let marker = marker_path(&repo_root);

        if let Some(existing) = Self::read_marker(&marker)? {
            let branch_output = run_git(
                &repo_root,
                &["rev-parse", "--verify", &existing.branch],
                git_timeout,
            )
            .await?;
            if branch_output.success() && existing.run_id != run_id {
                return Err(Error::Concurrency(format!(
                    "repo root {} is already claimed by run {} on branch {}",
                    repo_root.display(),
                    existing.run_id,
                    existing.branch
                )));
            }
        }

        let base_branch_output = run_git(&repo_root, &["rev-parse", "--abbrev-ref", "HEAD"], git_timeout).await?;
        let base_branch = base_branch_output.stdout.trim().to_string();
        let base_head_output = run_git(&repo_root, &["rev-parse", "HEAD"], git_timeout).await?;
        let base_head = base_head_output.success().then(|| base_head_output.stdout.trim().to_string());

        let branch = Self::branch_name(run_id);
        let create_branch = run_git(&repo_root, &["checkout", "-b", &branch], git_timeout).await?;
        if !create_branch.success() {
            // Branch may already exist from a crashed prior attempt; resume it.
            let checkout = run_git(&repo_root, &["checkout", &branch], git_timeout).await?;
            if !checkout.success() {
                return Err(Error::Workspace(format!(
                    "could not create or resume branch {branch}: {}",
                    create_branch.stderr
                )));
            }
        }

        let marker_data = MarkerFile { run_id: run_id.to_string(), branch: branch.clone(), created_at: Utc::now() };
        let json = serde_json::to_string_pretty(&marker_data)?;
        std::fs::write(&marker, json)?;

        Ok(Self { repo_root, run_id: run_id.to_string(), branch, git_timeout, base_branch, base_head })
    }

    fn read_marker(path: &Path) -> Result<Option<MarkerFile>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.repo_root
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn current_branch(&self) -> Result<String> {
        let output = run_git(&self.repo_root, &["rev-parse", "--abbrev-ref", "HEAD"], self.git_timeout).await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Stage and commit everything in the shadow branch's working copy,
    /// returning the new commit hash, or `None` if there was nothing to
    /// commit.
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

    /// Release the claim on this repo root, leaving the branch itself intact
    /// for post-hoc inspection.
    pub fn release(&self) -> Result<()> {
        let marker = marker_path(&self.repo_root);
        match std::fs::remove_file(&marker) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// The number of upstream commits the run's branch has diverged behind
    /// its fork point's remote tracking branch, used by the utility flow
    /// injector's `upstream_diverged` trigger. `None` if there is no
    /// upstream configured.
    pub async fn upstream_divergence(&self) -> Result<Option<u32>> {
        let upstream = run_git(&self.repo_root, &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"], self.git_timeout).await?;
        if !upstream.success() {
            return Ok(None);
        }
        let behind = run_git(
            &self.repo_root,
            &["rev-list", "--count", &format!("HEAD..{}", upstream.stdout.trim())],
            self.git_timeout,
        )
        .await?;
        Ok(behind.stdout.trim().parse().ok())
    }

    /// Absolute paths the working tree currently shows as modified, added,
    /// or untracked, via `git status --porcelain`.
    pub async fn written_paths(&self) -> Result<Vec<PathBuf>> {
        let status = run_git(&self.repo_root, &["status", "--porcelain"], self.git_timeout).await?;
        Ok(status
            .stdout
            .lines()
            .filter_map(|line| line.get(3..))
            .map(|rel| self.repo_root.join(rel.trim()))
            .collect())
    }

    /// Whether `base_branch`'s HEAD has moved since this workspace captured
    /// it at creation time — the same-directory shadow-branch design means
    /// a path-based real-repo check can never fire, so divergence of the
    /// branch an operator actually has checked out is what stands in for it.
    pub async fn base_branch_moved(&self) -> Result<bool> {
        let Some(base_head) = &self.base_head else {
            return Ok(false);
        };
        let current = run_git(&self.repo_root, &["rev-parse", &self.base_branch], self.git_timeout).await?;
        if !current.success() {
            return Ok(false);
        }
        Ok(current.stdout.trim() != base_head)
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
    async fn create_checks_out_a_run_scoped_branch() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;

        let workspace = ShadowForkWorkspace::create(dir.path(), "build-1", Duration::from_secs(5)).await.unwrap();
        assert_eq!(workspace.branch(), "wp-run/build-1");
        assert_eq!(workspace.current_branch().await.unwrap(), "wp-run/build-1");
    }

    #[tokio::test]
    async fn second_run_on_same_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;

        let _first = ShadowForkWorkspace::create(dir.path(), "build-1", Duration::from_secs(5)).await.unwrap();
        let second = ShadowForkWorkspace::create(dir.path(), "build-2", Duration::from_secs(5)).await;
        assert!(matches!(second, Err(Error::Concurrency(_))));
    }

    #[tokio::test]
    async fn commit_all_reports_none_when_clean() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;
        let workspace = ShadowForkWorkspace::create(dir.path(), "build-1", Duration::from_secs(5)).await.unwrap();
        assert_eq!(workspace.commit_all("noop").await.unwrap(), None);
    }

    #[tokio::test]
    async fn commit_all_commits_new_files() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;
        let workspace = ShadowForkWorkspace::create(dir.path(), "build-1", Duration::from_secs(5)).await.unwrap();
        std::fs::write(dir.path().join("new.txt"), "data").unwrap();
        let rev = workspace.commit_all("add new.txt").await.unwrap();
        assert!(rev.is_some());
    }

    #[tokio::test]
    async fn base_branch_untouched_is_not_flagged() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;
        let workspace = ShadowForkWorkspace::create(dir.path(), "build-1", Duration::from_secs(5)).await.unwrap();
        assert!(!workspace.base_branch_moved().await.unwrap());
    }

    #[tokio::test]
    async fn base_branch_moved_after_shadow_creation_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;
        let workspace = ShadowForkWorkspace::create(dir.path(), "build-1", Duration::from_secs(5)).await.unwrap();

        // Simulate the base branch moving independently via plumbing commands,
        // without checking it out (the shadow branch is the one checked out).
        std::fs::write(dir.path().join("unrelated.txt"), "x").unwrap();
        run_git(dir.path(), &["add", "-A"], Duration::from_secs(5)).await.unwrap();
        let tree = run_git(dir.path(), &["write-tree"], Duration::from_secs(5)).await.unwrap();
        let parent = run_git(dir.path(), &["rev-parse", workspace.base_branch.as_str()], Duration::from_secs(5)).await.unwrap();
        let commit = run_git(
            dir.path(),
            &["commit-tree", tree.stdout.trim(), "-p", parent.stdout.trim(), "-m", "moved elsewhere"],
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        run_git(dir.path(), &["update-ref", &format!("refs/heads/{}", workspace.base_branch), commit.stdout.trim()], Duration::from_secs(5))
            .await
            .unwrap();

        assert!(workspace.base_branch_moved().await.unwrap());
    }
}
