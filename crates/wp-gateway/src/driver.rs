//! Spawns and tails one run. No transport beyond `wp_session::StubTransport`
//! ships in this workspace, so every run driven through the gateway auto-acks
//! each step with a `succeeded` envelope — enough to exercise the full
//! event-sourced loop end to end without pretending to talk to a model.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use wp_domain::{Config, RunStatus};
use wp_engine::RunEngine;
use wp_session::StubTransport;
use wp_store::{RunIndex, RunSummary};
use wp_workspace::{PlainWorkspace, RealWorkspace, ShadowForkWorkspace, Workspace};

const TAIL_POLL: Duration = Duration::from_millis(150);

fn ack_envelope(run_id: &str, flow_key: &str, step_id: &str) -> serde_json::Value {
    serde_json::json!({
        "step_id": step_id,
        "flow_key": flow_key,
        "run_id": run_id,
        "status": "succeeded",
        "summary": format!("auto-acknowledged step '{step_id}' of flow '{flow_key}'"),
    })
}

/// Drive `flow_key` for `run_id` to completion (or cancellation/error),
/// updating the run index as it goes and tailing the durable event log
/// into the index's SSE broadcast channel so subscribers see new events
/// without waiting for the whole run to finish.
pub async fn drive_run(
    runs_root: PathBuf,
    run_id: String,
    flow_key: String,
    objective: String,
    repo_root: Option<String>,
    config: Config,
    index: std::sync::Arc<RunIndex>,
    cancel: CancellationToken,
    inject_slot: Arc<Mutex<Option<String>>>,
) {
    let tail_run_id = run_id.clone();
    let tail_index = index.clone();
    let tail_path = runs_root.join(&run_id).join("events.jsonl");
    let tail_cancel = cancel.clone();
    let tailer = tokio::spawn(async move { tail_events(tail_path, tail_run_id, tail_index, tail_cancel).await });

    let result =
        run_once(&runs_root, &run_id, &flow_key, &objective, repo_root.as_deref(), config, &cancel, inject_slot).await;

    let status = match &result {
        Ok(state) => state.status,
        Err(err) => {
            tracing::warn!(run_id = %run_id, %err, "run ended with an error");
            RunStatus::Failed
        }
    };
    let now = chrono::Utc::now();
    let _ = index.record(RunSummary { run_id, flow_key, status, created_at: now, updated_at: now });

    cancel.cancel(); // make sure the tailer notices the run is over even on error paths
    let _ = tailer.await;
}

async fn run_once(
    runs_root: &std::path::Path,
    run_id: &str,
    flow_key: &str,
    objective: &str,
    repo_root: Option<&str>,
    config: Config,
    cancel: &CancellationToken,
    inject_slot: Arc<Mutex<Option<String>>>,
) -> wp_domain::Result<wp_domain::RunState> {
    let mut engine = RunEngine::open(runs_root, run_id, objective, config.clone())?;

    let mut transport_factory_impl = move |fk: &str, step_id: &str| {
        let _ = fk;
        StubTransport::structured(ack_envelope(run_id, flow_key, step_id))
    };
    let transport_factory: &mut (dyn FnMut(&str, &str) -> StubTransport + Send) = &mut transport_factory_impl;

    // `deploy` steps are the one flow that must never run inside the
    // shadow fork: promotion has to land on the real checkout, not a
    // run-scoped branch nobody else will ever see.
    if let Some(repo_root) = repo_root {
        let timeout = Duration::from_secs(config.workspace.git_timeout_secs);
        let workspace = ShadowForkWorkspace::create(PathBuf::from(repo_root), run_id, timeout).await?;
        let deploy_workspace = RealWorkspace::open(PathBuf::from(repo_root), timeout);
        engine
            .run(
                flow_key,
                &workspace as &dyn Workspace,
                Some(&deploy_workspace as &dyn Workspace),
                transport_factory,
                cancel,
                Some(inject_slot),
            )
            .await
    } else {
        let workspace = PlainWorkspace::new(runs_root.join(run_id).join("workspace"));
        engine
            .run(flow_key, &workspace as &dyn Workspace, None, transport_factory, cancel, Some(inject_slot))
            .await
    }
}

/// Poll `events.jsonl` for newly appended, complete lines and republish
/// them through the index's broadcast channel, so any SSE subscriber —
/// not just the one that happened to be connected when a step finished —
/// sees the run live. Stops once the run's cancellation token trips *and*
/// no further growth is observed, so the final terminal event still gets
/// published before the tailer exits.
async fn tail_events(path: PathBuf, run_id: String, index: std::sync::Arc<RunIndex>, cancel: CancellationToken) {
    let mut offset: u64 = 0;
    loop {
        if let Ok(content) = tokio::fs::read_to_string(&path).await {
            if content.len() as u64 > offset {
                let new_bytes = &content[offset as usize..];
                let mut consumed = 0usize;
                for line in new_bytes.lines() {
                    consumed += line.len() + 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Ok(event) = serde_json::from_str::<wp_domain::Event>(line) {
                        index.publish(&run_id, event);
                    }
                }
                offset += consumed as u64;
            }
        }

        if cancel.is_cancelled() {
            // One last pass in case the final event was written after the
            // cancellation flag was observed but before this loop woke up.
            tokio::time::sleep(TAIL_POLL).await;
            if let Ok(content) = tokio::fs::read_to_string(&path).await {
                if content.len() as u64 > offset {
                    for line in content[offset as usize..].lines() {
                        if let Ok(event) = serde_json::from_str::<wp_domain::Event>(line) {
                            index.publish(&run_id, event);
                        }
                    }
                }
            }
            return;
        }

        tokio::time::sleep(TAIL_POLL).await;
    }
}
