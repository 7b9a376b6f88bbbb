//! The handoff envelope — structured output of a step's finalize phase.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Unverified,
    Verified,
    Blocked,
    Partial,
}

/// Normalized `{decision, next_step_id?, reason?}` produced by a transport's
/// own (advisory) opinion about how to route next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSignal {
    pub decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffEnvelope {
    pub step_id: String,
    pub flow_key: String,
    pub run_id: String,
    pub status: StepStatus,
    /// Boolean-like per the source vocabulary (`"yes"`/`"no"`/bool); stored
    /// normalized to `Option<bool>` — see [`crate::routing::normalize_tribool`].
    pub can_further_iteration_help: Option<bool>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_signal: Option<RoutingSignal>,
    #[serde(default)]
    pub assumptions_made: Vec<String>,
    #[serde(default)]
    pub decisions_made: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critique: Option<String>,
}
