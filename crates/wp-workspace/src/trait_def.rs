//! The `Workspace` abstraction a run's engine drives, implemented by
//! [`crate::ShadowForkWorkspace`] for the golden path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use wp_domain::Result;

#[async_trait]
pub trait Workspace: Send + Sync {
    fn root(&self) -> &Path;
    async fn current_branch(&self) -> Result<String>;
    async fn commit_all(&self, message: &str) -> Result<Option<String>>;
    fn release(&self) -> Result<()>;

    /// Paths the last commit touched, as absolute paths under `root()`.
    /// Used by the boundary scanner; a workspace with no git-status concept
    /// (e.g. a bare directory) reports nothing written.
    async fn written_paths(&self) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    /// Whether this workspace isolates a run on its own branch of a shared
    /// checkout, as opposed to operating directly on a real repo or a bare
    /// directory with no git semantics at all.
    fn is_shadow(&self) -> bool {
        false
    }

    /// The real repository's root, when this workspace shadows one. `None`
    /// for workspaces with no underlying real repo (bare directories).
    fn real_repo_root(&self) -> Option<&Path> {
        None
    }

    /// Commits the run's branch is behind its upstream tracking branch, if
    /// one is configured. `None` means no divergence data is available.
    async fn upstream_divergence(&self) -> Result<Option<u32>> {
        Ok(None)
    }

    /// Whether the base branch this workspace forked from has moved since
    /// the workspace was created — evidence that something other than this
    /// run touched the real repo while the run's shadow branch was active.
    async fn base_branch_moved(&self) -> Result<bool> {
        Ok(false)
    }
}

#[async_trait]
impl Workspace for crate::ShadowForkWorkspace {
    fn root(&self) -> &Path {
        crate::ShadowForkWorkspace::root(self)
    }

    async fn current_branch(&self) -> Result<String> {
        crate::ShadowForkWorkspace::current_branch(self).await
    }

    async fn commit_all(&self, message: &str) -> Result<Option<String>> {
        crate::ShadowForkWorkspace::commit_all(self, message).await
    }

    fn release(&self) -> Result<()> {
        crate::ShadowForkWorkspace::release(self)
    }

    async fn written_paths(&self) -> Result<Vec<PathBuf>> {
        crate::ShadowForkWorkspace::written_paths(self).await
    }

    fn is_shadow(&self) -> bool {
        true
    }

    fn real_repo_root(&self) -> Option<&Path> {
        Some(crate::ShadowForkWorkspace::root(self))
    }

    async fn upstream_divergence(&self) -> Result<Option<u32>> {
        crate::ShadowForkWorkspace::upstream_divergence(self).await
    }

    async fn base_branch_moved(&self) -> Result<bool> {
        crate::ShadowForkWorkspace::base_branch_moved(self).await
    }
}

/// A pass-through workspace with no branch isolation, used only when a run
/// targets a bare directory that is not a git repository at all.
pub struct PlainWorkspace {
    root: PathBuf,
}

impl PlainWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Workspace for PlainWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn current_branch(&self) -> Result<String> {
        Ok(String::new())
    }

    async fn commit_all(&self, _message: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn release(&self) -> Result<()> {
        Ok(())
    }
}
