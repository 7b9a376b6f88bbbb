//! Bounded in-memory ring of recent run summaries, backed by a durable
//! JSONL index — fast `list`/`get` without replaying every run's full event
//! log. Mirrors the ring-buffer-plus-index shape used for turn tracking in
//! the teacher's server, generalized from per-turn records to per-run ones.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use wp_domain::{Event, Result, RunStatus};

const MAX_RUNS_IN_MEMORY: usize = 2000;
const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub flow_key: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct IndexInner {
    runs: VecDeque<RunSummary>,
    index: HashMap<String, usize>,
    base_seq: usize,
}

impl IndexInner {
    fn new(runs: VecDeque<RunSummary>) -> Self {
        let mut index = HashMap::with_capacity(runs.len());
        for (i, run) in runs.iter().enumerate() {
            index.insert(run.run_id.clone(), i);
        }
        Self { runs, index, base_seq: 0 }
    }

    fn deque_idx(&self, seq: usize) -> usize {
        seq - self.base_seq
    }

    fn get(&self, run_id: &str) -> Option<&RunSummary> {
        let seq = *self.index.get(run_id)?;
        self.runs.get(self.deque_idx(seq))
    }

    fn upsert(&mut self, summary: RunSummary) {
        if let Some(&seq) = self.index.get(&summary.run_id) {
            let idx = self.deque_idx(seq);
            self.runs[idx] = summary;
            return;
        }
        let seq = self.base_seq + self.runs.len();
        self.index.insert(summary.run_id.clone(), seq);
        self.runs.push_back(summary);
        if self.runs.len() > MAX_RUNS_IN_MEMORY {
            let evicted = self.runs.pop_front().expect("just checked non-empty");
            self.index.remove(&evicted.run_id);
            self.base_seq += 1;
        }
    }
}

/// Tracks recent runs for listing, and fans out their events to SSE
/// subscribers. Does not own the event log itself — call sites append to
/// an [`crate::EventLog`] and then call [`RunIndex::record`].
pub struct RunIndex {
    inner: RwLock<IndexInner>,
    log_path: PathBuf,
    channels: RwLock<HashMap<String, broadcast::Sender<Event>>>,
}

impl RunIndex {
    pub fn open(runs_root: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(runs_root.as_ref())?;
        let log_path = runs_root.as_ref().join("index.jsonl");
        let runs = Self::load_recent(&log_path);
        Ok(Self {
            inner: RwLock::new(IndexInner::new(runs)),
            log_path,
            channels: RwLock::new(HashMap::new()),
        })
    }

    fn load_recent(path: &Path) -> VecDeque<RunSummary> {
        let mut runs = VecDeque::new();
        let Ok(content) = std::fs::read_to_string(path) else {
            return runs;
        };
        // Later lines for the same run_id supersede earlier ones, so replay
        // all lines but keep only the most recent MAX_RUNS_IN_MEMORY distinct
        // run ids, preserving newest-last order.
        let mut seen = HashMap::new();
        for line in content.lines() {
            if let Ok(summary) = serde_json::from_str::<RunSummary>(line) {
                seen.insert(summary.run_id.clone(), summary);
            }
        }
        let mut ordered: Vec<RunSummary> = seen.into_values().collect();
        ordered.sort_by_key(|r| r.updated_at);
        for summary in ordered.into_iter().rev().take(MAX_RUNS_IN_MEMORY).rev() {
            runs.push_back(summary);
        }
        runs
    }

    /// Upsert a run summary in memory and append it to the durable index.
    pub fn record(&self, summary: RunSummary) -> Result<()> {
        {
            let mut inner = self.inner.write();
            inner.upsert(summary.clone());
        }
        let json = serde_json::to_string(&summary)?;
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.log_path)?;
        writeln!(file, "{json}")?;
        Ok(())
    }

    pub fn get(&self, run_id: &str) -> Option<RunSummary> {
        self.inner.read().get(run_id).cloned()
    }

    pub fn list(&self, status: Option<RunStatus>, limit: usize, offset: usize) -> (Vec<RunSummary>, usize) {
        let inner = self.inner.read();
        let filter = |r: &&RunSummary| match status {
            Some(s) => r.status == s,
            None => true,
        };
        let total = inner.runs.iter().rev().filter(filter).count();
        let page = inner.runs.iter().rev().filter(filter).skip(offset).take(limit).cloned().collect();
        (page, total)
    }

    /// Broadcast an event to this run's SSE subscribers, creating the
    /// channel lazily if this is the first event for the run.
    pub fn publish(&self, run_id: &str, event: Event) {
        let sender = {
            let channels = self.channels.read();
            channels.get(run_id).cloned()
        };
        let sender = sender.unwrap_or_else(|| {
            let mut channels = self.channels.write();
            channels
                .entry(run_id.to_string())
                .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
                .clone()
        });
        let _ = sender.send(event);
    }

    pub fn subscribe(&self, run_id: &str) -> broadcast::Receiver<Event> {
        let mut channels = self.channels.write();
        channels.entry(run_id.to_string()).or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0).subscribe()
    }

    /// Drop a run's broadcast channel once all subscribers have gone away.
    pub fn cleanup_channel(&self, run_id: &str) {
        let mut channels = self.channels.write();
        if let Some(sender) = channels.get(run_id) {
            if sender.receiver_count() == 0 {
                channels.remove(run_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wp_domain::EventKind;

    fn summary(run_id: &str, status: RunStatus) -> RunSummary {
        let now = Utc::now();
        RunSummary { run_id: run_id.into(), flow_key: "build".into(), status, created_at: now, updated_at: now }
    }

    #[test]
    fn record_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let index = RunIndex::open(dir.path()).unwrap();
        index.record(summary("r1", RunStatus::Running)).unwrap();
        assert_eq!(index.get("r1").unwrap().status, RunStatus::Running);
    }

    #[test]
    fn upsert_replaces_not_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let index = RunIndex::open(dir.path()).unwrap();
        index.record(summary("r1", RunStatus::Running)).unwrap();
        index.record(summary("r1", RunStatus::Succeeded)).unwrap();
        let (page, total) = index.list(None, 10, 0);
        assert_eq!(total, 1);
        assert_eq!(page[0].status, RunStatus::Succeeded);
    }

    #[test]
    fn reload_from_disk_keeps_latest_summary() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = RunIndex::open(dir.path()).unwrap();
            index.record(summary("r1", RunStatus::Running)).unwrap();
            index.record(summary("r1", RunStatus::Succeeded)).unwrap();
        }
        let reopened = RunIndex::open(dir.path()).unwrap();
        assert_eq!(reopened.get("r1").unwrap().status, RunStatus::Succeeded);
    }

    #[test]
    fn publish_reaches_subscriber() {
        let dir = tempfile::tempdir().unwrap();
        let index = RunIndex::open(dir.path()).unwrap();
        let mut rx = index.subscribe("r1");
        index.publish("r1", Event::new("r1", EventKind::RunCompleted));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind.name(), "run_completed");
    }
}
