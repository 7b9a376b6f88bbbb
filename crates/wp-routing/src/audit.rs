//! Routing audit trail: every non-trivial routing decision is
//! durably logged to `routing_decisions.jsonl` and kept in a bounded
//! in-memory ring buffer for fast "what just happened" queries.

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use wp_domain::{Error, Result, RoutingDecision};

const DEFAULT_CAPACITY: usize = 500;

pub struct RoutingAuditTrail {
    path: PathBuf,
    recent: Mutex<VecDeque<RoutingDecision>>,
    capacity: usize,
}

impl RoutingAuditTrail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(path, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self { path: path.into(), recent: Mutex::new(VecDeque::with_capacity(capacity)), capacity }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a decision to the durable log and the in-memory ring buffer.
    /// The two are kept in lock-step: a failed disk write does not update
    /// the in-memory buffer, so `recent()` never claims durability it
    /// doesn't have.
    pub fn record(&self, decision: RoutingDecision) -> Result<()> {
        let json = serde_json::to_string(&decision)?;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{json}")?;
        file.sync_data()?;

        let mut buf = self.recent.lock();
        if buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(decision);
        Ok(())
    }

    /// The `limit` most recent decisions, newest first, from memory only.
    pub fn recent(&self, limit: usize) -> Vec<RoutingDecision> {
        let buf = self.recent.lock();
        buf.iter().rev().take(limit).cloned().collect()
    }

    /// Full durable history, oldest first. Used on crash recovery to rebuild
    /// the in-memory buffer, or by an operator auditing a whole run.
    pub fn replay(&self) -> Result<Vec<RoutingDecision>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::Io(err)),
        };
        let mut decisions = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            decisions.push(serde_json::from_str(line)?);
        }
        Ok(decisions)
    }

    /// Repopulate the in-memory ring buffer from the durable log, keeping at
    /// most `capacity` of the most recent entries. Call this once after
    /// opening an existing run so `recent()` reflects history before this
    /// process's first `record()` call.
    pub fn warm_from_disk(&self) -> Result<()> {
        let all = self.replay()?;
        let mut buf = self.recent.lock();
        buf.clear();
        for decision in all.into_iter().rev().take(self.capacity).collect::<Vec<_>>().into_iter().rev() {
            buf.push_back(decision);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wp_domain::{Confidence, RoutingDecisionKind};

    fn decision(step_id: &str) -> RoutingDecision {
        RoutingDecision {
            timestamp: Utc::now(),
            run_id: "r1".into(),
            flow_key: "build".into(),
            step_id: step_id.into(),
            decision: RoutingDecisionKind::Continue,
            reason: "golden path".into(),
            confidence: Confidence::High,
            agent_key: None,
            detour_target: None,
            injected_flow: None,
            injected_nodes: Vec::new(),
            forensic_summary: None,
            iteration: None,
            signature_matched: None,
        }
    }

    #[test]
    fn record_then_recent_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let trail = RoutingAuditTrail::new(dir.path().join("routing_decisions.jsonl"));
        trail.record(decision("step-1")).unwrap();
        trail.record(decision("step-2")).unwrap();

        let recent = trail.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].step_id, "step-2");
    }

    #[test]
    fn ring_buffer_evicts_oldest_past_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let trail = RoutingAuditTrail::with_capacity(dir.path().join("routing_decisions.jsonl"), 2);
        trail.record(decision("step-1")).unwrap();
        trail.record(decision("step-2")).unwrap();
        trail.record(decision("step-3")).unwrap();

        let recent = trail.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].step_id, "step-3");
        assert_eq!(recent[1].step_id, "step-2");
    }

    #[test]
    fn replay_reads_full_durable_history_even_past_ring_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let trail = RoutingAuditTrail::with_capacity(dir.path().join("routing_decisions.jsonl"), 1);
        trail.record(decision("step-1")).unwrap();
        trail.record(decision("step-2")).unwrap();

        assert_eq!(trail.replay().unwrap().len(), 2);
    }

    #[test]
    fn warm_from_disk_repopulates_ring_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing_decisions.jsonl");
        {
            let trail = RoutingAuditTrail::new(&path);
            trail.record(decision("step-1")).unwrap();
            trail.record(decision("step-2")).unwrap();
        }

        let reopened = RoutingAuditTrail::new(&path);
        assert!(reopened.recent(10).is_empty());
        reopened.warm_from_disk().unwrap();
        assert_eq!(reopened.recent(10).len(), 2);
    }
}
