//! The flow-graph editor and the YAML spec/flow/template catalog are out of
//! scope; what isn't out of scope is the `FlowGraph` type they'd
//! compile down to. This module owns a tiny built-in registry — `signal`,
//! `plan`, `build`, `gate`, `deploy`, `wisdom`, and the utility `reset`
//! flow — sufficient to drive the engine end to end in tests and in a
//! deployment that hasn't wired up a real catalog yet.

use std::collections::HashMap;

/// One step in a flow graph: a stable id and the prompt its Work phase is
/// opened with. Flows in this registry are a fixed linear sequence — `next`
/// is simply "the following index" unless routing overrides it.
#[derive(Debug, Clone)]
pub struct FlowStep {
    pub step_id: String,
    pub prompt: String,
}

pub trait FlowGraph: Send + Sync {
    fn flow_key(&self) -> &str;
    fn steps(&self) -> &[FlowStep];

    fn step_at(&self, index: u32) -> Option<&FlowStep> {
        self.steps().get(index as usize)
    }

    fn step_index_of(&self, step_id: &str) -> Option<u32> {
        self.steps().iter().position(|s| s.step_id == step_id).map(|i| i as u32)
    }

    fn len(&self) -> u32 {
        self.steps().len() as u32
    }

    fn is_empty(&self) -> bool {
        self.steps().is_empty()
    }
}

pub struct StaticFlowGraph {
    flow_key: String,
    steps: Vec<FlowStep>,
}

impl StaticFlowGraph {
    fn new(flow_key: &str, step_prompts: &[(&str, &str)]) -> Self {
        Self {
            flow_key: flow_key.to_string(),
            steps: step_prompts
                .iter()
                .map(|(id, prompt)| FlowStep { step_id: id.to_string(), prompt: prompt.to_string() })
                .collect(),
        }
    }
}

impl FlowGraph for StaticFlowGraph {
    fn flow_key(&self) -> &str {
        &self.flow_key
    }

    fn steps(&self) -> &[FlowStep] {
        &self.steps
    }
}

/// A closed registry of flow keys, matching the top-level flow sequence
/// `signal → plan → build → gate → deploy → wisdom` plus the utility
/// `reset` flow the utility-flow injector targets.
pub struct FlowRegistry {
    flows: HashMap<String, StaticFlowGraph>,
}

impl FlowRegistry {
    pub fn built_in() -> Self {
        let mut flows = HashMap::new();
        flows.insert(
            "signal".to_string(),
            StaticFlowGraph::new("signal", &[("step-0", "Describe the objective and constraints for this run.")]),
        );
        flows.insert(
            "plan".to_string(),
            StaticFlowGraph::new(
                "plan",
                &[
                    ("step-0", "Produce a short implementation plan."),
                    ("step-1", "Identify risks and open questions in the plan."),
                ],
            ),
        );
        flows.insert(
            "build".to_string(),
            StaticFlowGraph::new(
                "build",
                &[
                    ("step-0", "Implement the plan."),
                    ("step-1", "Run the test suite and report results."),
                ],
            ),
        );
        flows.insert(
            "gate".to_string(),
            StaticFlowGraph::new("gate", &[("step-0", "Review the build output against the plan's acceptance criteria.")]),
        );
        flows.insert(
            "deploy".to_string(),
            StaticFlowGraph::new("deploy", &[("step-0", "Promote the build to the target environment.")]),
        );
        flows.insert(
            "wisdom".to_string(),
            StaticFlowGraph::new("wisdom", &[("step-0", "Summarize what was learned from this run.")]),
        );
        flows.insert(
            "reset".to_string(),
            StaticFlowGraph::new(
                "reset",
                &[("reset-1", "The shadow branch has fallen behind upstream; rebase or recreate it before continuing.")],
            ),
        );
        Self { flows }
    }

    pub fn get(&self, flow_key: &str) -> Option<&StaticFlowGraph> {
        self.flows.get(flow_key)
    }

    pub fn contains(&self, flow_key: &str) -> bool {
        self.flows.contains_key(flow_key)
    }
}

impl Default for FlowRegistry {
    fn default() -> Self {
        Self::built_in()
    }
}

/// The top-level run sequence a run chains through automatically once each
/// flow exhausts its steps. `reset` is a utility flow, never a member of
/// this sequence — it's reached only via injection.
pub const FLOW_SEQUENCE: &[&str] = &["signal", "plan", "build", "gate", "deploy", "wisdom"];

/// The flow that follows `flow_key` in the top-level sequence, or `None` if
/// `flow_key` is the last flow (or isn't part of the sequence at all, e.g.
/// a utility flow).
pub fn next_in_sequence(flow_key: &str) -> Option<&'static str> {
    let position = FLOW_SEQUENCE.iter().position(|&f| f == flow_key)?;
    FLOW_SEQUENCE.get(position + 1).copied()
}
