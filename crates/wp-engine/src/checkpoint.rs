//! Checkpoint / resume: a checkpoint is the union of a receipt file,
//! an optional envelope file, and the `step_completed` event that closed it.
//! Resuming a run never re-derives state from scratch when a prior attempt
//! left usable progress behind.

use wp_domain::Result;
use wp_store::RunLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeAction {
    StartFresh,
    Continue { step_index: u32 },
    Retry { step_index: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialStateStrategy {
    ResumeWithPartial,
    RetryFromScratch,
    Escalate,
}

pub struct CheckpointManager<'a> {
    layout: &'a RunLayout,
}

impl<'a> CheckpointManager<'a> {
    pub fn new(layout: &'a RunLayout) -> Self {
        Self { layout }
    }

    /// The resume predicate, applied to the last receipt written for
    /// `flow_key` (by filename, which step ids sort lexically since
    /// `wp_domain::ids` mints them `step-N`). Receipts are namespaced by
    /// flow key, so a prior flow's receipts in the same run never leak into
    /// this one's resume point. No receipts for this flow at all means a
    /// fresh start.
    pub fn find_resume_point(&self, flow_key: &str) -> Result<ResumeAction> {
        let receipts_dir = self.layout.receipts_dir();
        let prefix = format!("{flow_key}__");
        let mut step_ids: Vec<String> = match std::fs::read_dir(&receipts_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.path().file_stem().map(|s| s.to_string_lossy().into_owned()))
                .filter_map(|stem| stem.strip_prefix(&prefix).map(str::to_string))
                .collect(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        if step_ids.is_empty() {
            return Ok(ResumeAction::StartFresh);
        }

        step_ids.sort_by_key(|id| wp_domain::step_index_of(id));
        let last_step_id = step_ids.last().unwrap();
        let last_index = wp_domain::step_index_of(last_step_id);

        let receipt: Option<wp_domain::Receipt> = wp_store::read_json(&self.layout.receipt_path(flow_key, last_step_id))?;
        match receipt {
            Some(r) if r.status == "succeeded" => Ok(ResumeAction::Continue { step_index: last_index + 1 }),
            _ => Ok(ResumeAction::Retry { step_index: last_index }),
        }
    }

    /// Does an envelope exist for this step, i.e. is there finalize-phase
    /// output worth resuming with.
    pub fn has_partial_artifacts(&self, flow_key: &str, step_id: &str) -> bool {
        self.layout.envelope_path(flow_key, step_id).exists()
    }
}

/// Partial-state classifier: called only when resuming mid-step
/// (`ResumeAction::Retry`). `has_git_changes` comes from the workspace's own
/// forensic snapshot, not from this crate.
pub fn classify_partial_state(has_artifacts: bool, has_git_changes: bool) -> PartialStateStrategy {
    match (has_artifacts, has_git_changes) {
        (true, false) => PartialStateStrategy::ResumeWithPartial,
        (false, true) => PartialStateStrategy::RetryFromScratch,
        (true, true) => PartialStateStrategy::Escalate,
        (false, false) => PartialStateStrategy::RetryFromScratch,
    }
}
