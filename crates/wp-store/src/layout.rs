//! Filesystem layout of one run's durable state, rooted at
//! `{runs_root}/{run_id}/`.

use std::path::{Path, PathBuf};

pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    pub fn new(runs_root: impl AsRef<Path>, run_id: &str) -> Self {
        Self { root: runs_root.as_ref().join(run_id) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn events_path(&self) -> PathBuf {
        self.root.join("events.jsonl")
    }

    pub fn state_snapshot_path(&self) -> PathBuf {
        self.root.join("run_state.json")
    }

    pub fn receipts_dir(&self) -> PathBuf {
        self.root.join("receipts")
    }

    /// Namespaced by `flow_key` as well as `step_id`: a run chains through
    /// several flows that each mint their own `step-0`, `step-1`, ... ids,
    /// so the flow key is what keeps resume lookups from colliding across
    /// flows sharing the same run id.
    pub fn receipt_path(&self, flow_key: &str, step_id: &str) -> PathBuf {
        self.receipts_dir().join(format!("{flow_key}__{step_id}.json"))
    }

    pub fn envelopes_dir(&self) -> PathBuf {
        self.root.join("envelopes")
    }

    pub fn envelope_path(&self, flow_key: &str, step_id: &str) -> PathBuf {
        self.envelopes_dir().join(format!("{flow_key}__{step_id}.json"))
    }

    pub fn scent_trail_path(&self) -> PathBuf {
        self.root.join("scent_trail.json")
    }

    pub fn routing_decisions_path(&self) -> PathBuf {
        self.root.join("routing_decisions.jsonl")
    }

    pub fn workspace_dir(&self) -> PathBuf {
        self.root.join("workspace")
    }

    /// Create every directory this layout expects to exist. Idempotent.
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.receipts_dir())?;
        std::fs::create_dir_all(self.envelopes_dir())?;
        Ok(())
    }
}
