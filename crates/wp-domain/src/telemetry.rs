//! Structured log events emitted at the noteworthy points of a run's life.
//!
//! Mirrors the teacher's `TraceEvent` convention: a closed, tagged enum with
//! one `.emit()` method rather than scattered `tracing::info!` call sites, so
//! the JSON shape of every kernel log line is reviewable in one place.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum KernelEvent<'a> {
    RunStarted {
        run_id: &'a str,
        flow_key: &'a str,
    },
    StepStarted {
        run_id: &'a str,
        step_id: &'a str,
        step_index: u32,
    },
    StepCompleted {
        run_id: &'a str,
        step_id: &'a str,
        status: &'a str,
        duration_ms: u64,
    },
    RouteDecided {
        run_id: &'a str,
        step_id: &'a str,
        decision: &'a str,
        confidence: &'a str,
    },
    BoundaryViolationDetected {
        run_id: &'a str,
        step_id: &'a str,
        violation_type: &'a str,
        severity: &'a str,
    },
    CheckpointResumed {
        run_id: &'a str,
        step_id: &'a str,
        action: &'a str,
    },
    StateVerifyMismatch {
        run_id: &'a str,
        detail: &'a str,
    },
    DetourMatched {
        run_id: &'a str,
        step_id: &'a str,
        signature_id: &'a str,
        confidence: &'a str,
    },
    UtilityFlowInjected {
        run_id: &'a str,
        flow_id: &'a str,
        trigger_type: &'a str,
    },
    ContextBudgetOverflow {
        run_id: &'a str,
        step_id: &'a str,
        budget_tokens: u64,
        estimated_tokens: u64,
    },
}

impl<'a> KernelEvent<'a> {
    /// Serialize to JSON and log at `info`. Never fails: a serialization
    /// error would be a bug in this enum, not a runtime condition.
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => tracing::info!(target: "wp_kernel", "{json}"),
            Err(err) => tracing::warn!(target: "wp_kernel", "failed to serialize kernel event: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_does_not_panic() {
        KernelEvent::RunStarted { run_id: "r1", flow_key: "build" }.emit();
    }

    #[test]
    fn serializes_with_tagged_event_field() {
        let event = KernelEvent::StepCompleted {
            run_id: "r1",
            step_id: "1",
            status: "succeeded",
            duration_ms: 120,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "step_completed");
        assert_eq!(json["duration_ms"], 120);
    }
}
