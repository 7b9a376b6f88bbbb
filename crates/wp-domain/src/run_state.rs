//! Typed `RunState` — the pure-data projection of a run's event stream.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::HandoffEnvelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Stopped,
    Interrupted,
    Succeeded,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Canceled | RunStatus::Stopped
        )
    }
}

/// One frame of the interruption stack (detour / utility-flow / pause).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptionFrame {
    pub reason: String,
    pub return_node: String,
    #[serde(default)]
    pub context_snapshot: serde_json::Value,
    pub current_step_index: u32,
    pub total_steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidequest_id: Option<String>,
    pub pushed_at: DateTime<Utc>,
}

/// One entry in the append-only flow transition history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowTransition {
    pub from_flow: Option<String>,
    pub to_flow: String,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// The full, event-sourced state of one run.
///
/// **Invariant:** `RunState` is a pure function of its event stream — replaying
/// the same `events.jsonl` from scratch always yields an equal state on the
/// fields compared by [`RunState::comparable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub flow_key: String,
    pub current_flow_index: u32,
    pub status: RunStatus,
    pub current_step_id: Option<String>,
    pub step_index: u32,
    pub completed_nodes: HashSet<String>,
    pub loop_state: HashMap<String, u32>,
    pub handoff_envelopes: HashMap<String, HandoffEnvelope>,
    pub injected_nodes: HashSet<String>,
    pub injected_node_specs: HashMap<String, serde_json::Value>,
    pub interruption_stack: Vec<InterruptionFrame>,
    pub flow_transition_history: Vec<FlowTransition>,
    pub context: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, flow_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            flow_key: flow_key.into(),
            current_flow_index: 0,
            status: RunStatus::Pending,
            current_step_id: None,
            step_index: 0,
            completed_nodes: HashSet::new(),
            loop_state: HashMap::new(),
            handoff_envelopes: HashMap::new(),
            injected_nodes: HashSet::new(),
            injected_node_specs: HashMap::new(),
            interruption_stack: Vec::new(),
            flow_transition_history: Vec::new(),
            context: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The subset of fields the determinism invariant is checked against.
    pub fn comparable(&self) -> ComparableState {
        ComparableState {
            run_id: self.run_id.clone(),
            flow_key: self.flow_key.clone(),
            status: self.status,
            step_index: self.step_index,
            current_step_id: self.current_step_id.clone(),
            current_flow_index: self.current_flow_index,
            completed_nodes: self.completed_nodes.clone(),
            injected_nodes: self.injected_nodes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparableState {
    pub run_id: String,
    pub flow_key: String,
    pub status: RunStatus,
    pub step_index: u32,
    pub current_step_id: Option<String>,
    pub current_flow_index: u32,
    pub completed_nodes: HashSet<String>,
    pub injected_nodes: HashSet<String>,
}
