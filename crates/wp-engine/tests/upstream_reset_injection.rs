//! A shadow workspace reporting upstream divergence should inject the
//! built-in `reset` utility flow ahead of the default "continue" choice,
//! then hand control back to the interrupted flow once `reset` finishes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use wp_domain::{Config, EventKind, Result, RunStatus};
use wp_engine::RunEngine;
use wp_session::StubTransport;
use wp_store::EventLog;
use wp_workspace::Workspace;

/// A shadow workspace whose upstream divergence is reported exactly once —
/// standing in for a shadow branch that has fallen behind its tracking
/// branch until the injected `reset` flow rebases it.
struct DivergedOnceWorkspace {
    root: PathBuf,
    reported: AtomicBool,
}

#[async_trait]
impl Workspace for DivergedOnceWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn current_branch(&self) -> Result<String> {
        Ok("wp-run/r1".to_string())
    }

    async fn commit_all(&self, _message: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn release(&self) -> Result<()> {
        Ok(())
    }

    fn is_shadow(&self) -> bool {
        true
    }

    fn real_repo_root(&self) -> Option<&Path> {
        Some(&self.root)
    }

    async fn upstream_divergence(&self) -> Result<Option<u32>> {
        if self.reported.swap(true, Ordering::SeqCst) {
            Ok(Some(0))
        } else {
            Ok(Some(5))
        }
    }
}

fn envelope(step_id: &str, flow_key: &str) -> serde_json::Value {
    serde_json::json!({
        "step_id": step_id,
        "flow_key": flow_key,
        "run_id": "r1",
        "status": "succeeded",
        "summary": "done",
    })
}

#[tokio::test]
async fn diverged_upstream_injects_reset_then_restores_the_interrupted_flow() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = RunEngine::open(dir.path(), "r1", "ship the build", Config::default()).unwrap();
    let workspace = DivergedOnceWorkspace { root: dir.path().join("ws"), reported: AtomicBool::new(false) };
    let cancel = CancellationToken::new();

    let state = engine
        .run::<StubTransport, _>(
            "build",
            &workspace,
            None,
            |fk, step_id| StubTransport::structured(envelope(step_id, fk)),
            &cancel,
            None,
        )
        .await
        .unwrap();

    assert_eq!(state.status, RunStatus::Succeeded);
    assert!(state.interruption_stack.is_empty(), "reset's return should have popped the injection frame");

    let events = EventLog::new(dir.path().join("r1").join("events.jsonl")).replay().unwrap();

    let injected = events.iter().find_map(|e| match &e.kind {
        EventKind::UtilityFlowInjected { flow_id, return_flow_key, .. } if flow_id == "reset" => Some(return_flow_key.clone()),
        _ => None,
    });
    assert_eq!(injected, Some("build".to_string()));

    let returned = events.iter().any(|e| matches!(&e.kind, EventKind::MacroRoute { from_flow, to_flow, .. } if from_flow == "reset" && to_flow == "build"));
    assert!(returned, "no macro_route handed control back from reset to build");

    assert!(state.flow_transition_history.iter().any(|t| t.to_flow == "reset"));
    assert!(state.flow_transition_history.iter().any(|t| t.to_flow == "wisdom"), "run should still chain through to the end once reset returns");
}
