//! The append-only event taxonomy that drives `RunState` replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable entry in a run's `events.jsonl`.
///
/// `kind` is a closed tagged union so `apply_event` (in `wp-engine`) can match
/// exhaustively instead of dispatching on a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub run_id: String,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(run_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            run_id: run_id.into(),
            ts: Utc::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    RunStarted {
        flow_key: String,
    },
    FlowStarted {
        flow_key: String,
    },
    StepStarted {
        flow_key: String,
        step_id: String,
        step_index: u32,
    },
    StepCompleted {
        flow_key: String,
        step_id: String,
        status: String,
        envelope: Option<serde_json::Value>,
    },
    RouteDecision {
        flow_key: String,
        step_id: String,
        decision: serde_json::Value,
    },
    Checkpoint {
        flow_key: String,
        snapshot: serde_json::Value,
    },
    FlowPaused {
        flow_key: String,
        reason: String,
    },
    FlowCompleted {
        flow_key: String,
    },
    RunStopped {
        reason: String,
    },
    RunCompleted,
    RunFailed {
        reason: String,
    },
    MacroRoute {
        from_flow: String,
        to_flow: String,
        reason: String,
    },
    DetourStarted {
        step_id: String,
        signature_id: String,
        detour_target: String,
    },
    DetourCompleted {
        step_id: String,
        signature_id: String,
        resolved: bool,
    },
    NodeInjected {
        flow_key: String,
        node_id: String,
        spec: serde_json::Value,
    },
    UtilityFlowInjected {
        flow_id: String,
        trigger_type: String,
        return_flow_key: String,
        return_step_id: String,
    },
    BoundaryViolation {
        step_id: String,
        violation: serde_json::Value,
    },
}

impl EventKind {
    /// The string used for the SSE `event:` field and for log lines —
    /// matches the closed vocabulary from the event taxonomy.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::RunStarted { .. } => "run_started",
            EventKind::FlowStarted { .. } => "flow_started",
            EventKind::StepStarted { .. } => "step_started",
            EventKind::StepCompleted { .. } => "step_completed",
            EventKind::RouteDecision { .. } => "route_decision",
            EventKind::Checkpoint { .. } => "checkpoint",
            EventKind::FlowPaused { .. } => "flow_paused",
            EventKind::FlowCompleted { .. } => "flow_completed",
            EventKind::RunStopped { .. } => "run_stopped",
            EventKind::RunCompleted => "run_completed",
            EventKind::RunFailed { .. } => "run_failed",
            EventKind::MacroRoute { .. } => "macro_route",
            EventKind::DetourStarted { .. } => "detour_started",
            EventKind::DetourCompleted { .. } => "detour_completed",
            EventKind::NodeInjected { .. } => "node_injected",
            EventKind::UtilityFlowInjected { .. } => "utility_flow_injected",
            EventKind::BoundaryViolation { .. } => "boundary_violation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_round_trips_through_json() {
        let event = Event::new(
            "build-20260101000000-abcd1234",
            EventKind::StepStarted {
                flow_key: "build".into(),
                step_id: "1".into(),
                step_index: 0,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.run_id, event.run_id);
        assert_eq!(back.kind.name(), "step_started");
    }

    #[test]
    fn kind_name_matches_closed_vocabulary() {
        assert_eq!(EventKind::RunCompleted.name(), "run_completed");
    }
}
