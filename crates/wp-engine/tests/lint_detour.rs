//! A step whose first iteration reports a lint failure should detour to
//! the auto-linter node and resume at the same step once it resolves,
//! rather than escalating or failing the run outright.

use std::cell::RefCell;
use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use wp_domain::{Config, EventKind, RunStatus};
use wp_engine::RunEngine;
use wp_session::StubTransport;
use wp_store::EventLog;
use wp_workspace::PlainWorkspace;

fn envelope(step_id: &str, flow_key: &str, status: &str, summary: &str) -> serde_json::Value {
    serde_json::json!({
        "step_id": step_id,
        "flow_key": flow_key,
        "run_id": "r1",
        "status": status,
        "summary": summary,
    })
}

#[tokio::test]
async fn lint_failure_detours_then_resumes_the_step() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = RunEngine::open(dir.path(), "r1", "ship the build", Config::default()).unwrap();
    let workspace = PlainWorkspace::new(dir.path().join("ws"));
    let cancel = CancellationToken::new();

    let calls = RefCell::new(HashMap::<(String, String), u32>::new());
    let transport_factory = move |flow_key: &str, step_id: &str| {
        let key = (flow_key.to_string(), step_id.to_string());
        let n = {
            let mut calls = calls.borrow_mut();
            let entry = calls.entry(key).or_insert(0);
            *entry += 1;
            *entry
        };
        let value = match (flow_key, step_id, n) {
            ("build", "step-1", 1) => envelope("step-1", "build", "failed", "ruff reported 3 lint errors: E501 line too long"),
            ("build", "auto-linter", _) => envelope("auto-linter", "build", "succeeded", "lint errors fixed"),
            _ => envelope(step_id, flow_key, "succeeded", "ok"),
        };
        StubTransport::structured(value)
    };

    let state = engine.run::<StubTransport, _>("build", &workspace, None, transport_factory, &cancel, None).await.unwrap();

    assert_eq!(state.status, RunStatus::Succeeded);
    assert!(state.completed_nodes.contains("step-1"));

    let events = EventLog::new(dir.path().join("r1").join("events.jsonl")).replay().unwrap();

    let mut depth = 0i32;
    let mut saw_matched_depth = false;
    for event in &events {
        match &event.kind {
            EventKind::DetourStarted { step_id, signature_id, detour_target } => {
                assert_eq!(step_id, "step-1");
                assert_eq!(signature_id, "lint_errors");
                assert_eq!(detour_target, "auto-linter");
                depth += 1;
            }
            EventKind::DetourCompleted { step_id, resolved, .. } => {
                assert_eq!(step_id, "step-1");
                assert!(resolved);
                depth -= 1;
                saw_matched_depth = depth == 0;
            }
            _ => {}
        }
    }
    assert!(saw_matched_depth, "detour_started/detour_completed pair never returned the stack to its starting depth");
}
