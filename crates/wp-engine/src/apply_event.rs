//! The pure reducer `apply_event`: `RunState` is a pure function of
//! its event stream, so crash recovery is just "replay the log".

use wp_domain::{Event, EventKind, FlowTransition, HandoffEnvelope, InterruptionFrame, RunState, RunStatus};

/// Fold one event into a state, producing the next state. No I/O, no
/// randomness, no clock reads beyond the event's own `ts` — replaying the
/// same event stream from scratch always yields an equal
/// [`RunState::comparable`] projection.
pub fn apply_event(mut state: RunState, event: &Event) -> RunState {
    state.updated_at = event.ts;

    match &event.kind {
        EventKind::RunStarted { flow_key } => {
            state.status = RunStatus::Running;
            state.flow_key = flow_key.clone();
            state.current_flow_index = 0;
            state.flow_transition_history.push(FlowTransition {
                from_flow: None,
                to_flow: flow_key.clone(),
                reason: "run_started".into(),
                at: event.ts,
            });
        }
        EventKind::FlowStarted { flow_key } => {
            state.flow_key = flow_key.clone();
            state.step_index = 0;
            state.current_step_id = None;
        }
        EventKind::StepStarted { flow_key: _, step_id, step_index } => {
            state.current_step_id = Some(step_id.clone());
            state.step_index = *step_index;
        }
        EventKind::StepCompleted { flow_key: _, step_id, status: _, envelope } => {
            state.completed_nodes.insert(step_id.clone());
            if let Some(envelope_json) = envelope {
                if let Ok(parsed) = serde_json::from_value::<HandoffEnvelope>(envelope_json.clone()) {
                    state.handoff_envelopes.insert(step_id.clone(), parsed);
                }
            }
            state.step_index += 1;
        }
        EventKind::RouteDecision { flow_key: _, step_id: _, decision } => {
            if let Some(loop_id) = decision.get("loop_id").and_then(|v| v.as_str()) {
                *state.loop_state.entry(loop_id.to_string()).or_insert(0) += 1;
            }
            if let Some(next_step_id) = decision.get("next_step_id").and_then(|v| v.as_str()) {
                state.current_step_id = Some(next_step_id.to_string());
            }
        }
        EventKind::Checkpoint { flow_key: _, snapshot } => {
            if let Some(fields) = snapshot.as_object() {
                for (key, value) in fields {
                    state.context.insert(key.clone(), value.clone());
                }
            }
        }
        EventKind::FlowPaused { flow_key: _, reason } => {
            state.status = RunStatus::Paused;
            state.interruption_stack.push(InterruptionFrame {
                reason: reason.clone(),
                return_node: state.current_step_id.clone().unwrap_or_default(),
                context_snapshot: serde_json::Value::Null,
                current_step_index: state.step_index,
                total_steps: state.step_index,
                sidequest_id: None,
                pushed_at: event.ts,
            });
        }
        EventKind::FlowCompleted { flow_key: _ } => {
            // A flow completing doesn't by itself end the run — a
            // macro_route or run_completed/run_failed event follows.
        }
        EventKind::RunStopped { reason: _ } => {
            state.status = RunStatus::Stopped;
        }
        EventKind::RunCompleted => {
            state.status = RunStatus::Succeeded;
        }
        EventKind::RunFailed { reason: _ } => {
            state.status = RunStatus::Failed;
        }
        EventKind::MacroRoute { from_flow, to_flow, reason } => {
            let resuming_from_injection = state
                .interruption_stack
                .last()
                .and_then(|frame| frame.context_snapshot.get("return_flow_key"))
                .and_then(|v| v.as_str())
                == Some(to_flow.as_str());

            state.flow_key = to_flow.clone();
            state.current_flow_index += 1;
            state.flow_transition_history.push(FlowTransition {
                from_flow: Some(from_flow.clone()),
                to_flow: to_flow.clone(),
                reason: reason.clone(),
                at: event.ts,
            });

            if resuming_from_injection {
                if let Some(frame) = state.interruption_stack.pop() {
                    state.step_index = frame.current_step_index;
                    state.current_step_id = Some(frame.return_node);
                }
            }
        }
        EventKind::DetourStarted { step_id, signature_id, detour_target } => {
            state.interruption_stack.push(InterruptionFrame {
                reason: format!("detour:{signature_id}"),
                return_node: step_id.clone(),
                context_snapshot: serde_json::Value::Null,
                current_step_index: state.step_index,
                total_steps: state.step_index,
                sidequest_id: Some(signature_id.clone()),
                pushed_at: event.ts,
            });
            state.current_step_id = Some(detour_target.clone());
        }
        EventKind::DetourCompleted { step_id: _, signature_id: _, resolved: _ } => {
            if let Some(frame) = state.interruption_stack.pop() {
                state.current_step_id = Some(frame.return_node);
            }
        }
        EventKind::NodeInjected { flow_key: _, node_id, spec } => {
            state.injected_nodes.insert(node_id.clone());
            state.injected_node_specs.insert(node_id.clone(), spec.clone());
        }
        EventKind::UtilityFlowInjected { flow_id, trigger_type, return_flow_key, return_step_id } => {
            state.interruption_stack.push(InterruptionFrame {
                reason: format!("utility_flow:{trigger_type}"),
                return_node: return_step_id.clone(),
                context_snapshot: serde_json::json!({ "return_flow_key": return_flow_key }),
                current_step_index: state.step_index,
                total_steps: state.step_index,
                sidequest_id: None,
                pushed_at: event.ts,
            });
            state.flow_key = flow_id.clone();
            state.step_index = 0;
            state.current_step_id = None;
        }
        EventKind::BoundaryViolation { step_id: _, violation: _ } => {
            // Logged for the audit trail only; a CRITICAL violation halts
            // the orchestrator loop directly rather than through state.
        }
    }

    state
}

/// Fold a full event stream into a `RunState`, starting from `RunState::new`.
/// `run_started` (always the first event of a well-formed stream) overwrites
/// the seeded `flow_key`, so the placeholder here is never observed.
pub fn replay(run_id: &str, events: &[Event]) -> RunState {
    events.iter().fold(RunState::new(run_id, ""), |state, event| apply_event(state, event))
}

/// Compare a freshly replayed state against the last-written snapshot.
/// A mismatch means the snapshot is untrusted — the caller should log it and
/// proceed with the replayed state, never panic.
pub fn verify_run_state(replayed: &RunState, stored: &RunState) -> bool {
    replayed.comparable() == stored.comparable()
}
