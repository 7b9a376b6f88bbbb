//! `/runs` — run lifecycle endpoints. Every handler here is a thin
//! adapter: state is read by replaying the durable event log through
//! `RunEngine::state()`, and the registry is consulted only for the
//! process-local question "is a task in this process currently driving
//! this run" that the event log can't answer on its own.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use wp_domain::{generate_run_id, RunStatus};
use wp_engine::RunEngine;
use wp_store::RunSummary;

use crate::error::ApiError;
use crate::registry::StopIntent;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    #[serde(alias = "flow_id")]
    pub flow_key: String,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub repo_root: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateRunResponse {
    pub run_id: String,
    pub flow_key: String,
    pub status: RunStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub events_url: String,
}

pub async fn create_run(State(state): State<AppState>, Json(req): Json<CreateRunRequest>) -> impl IntoResponse {
    if req.flow_key.trim().is_empty() {
        return ApiError::bad_request("flow_key is required").into_response();
    }
    let run_id = req.run_id.clone().unwrap_or_else(|| generate_run_id(&req.flow_key));
    let objective = req.objective.clone().unwrap_or_else(|| format!("run flow '{}'", req.flow_key));

    let (cancel, inject_slot) = state.registry.register(&run_id, &req.flow_key);
    let now = chrono::Utc::now();
    if let Err(err) =
        state.index.record(RunSummary { run_id: run_id.clone(), flow_key: req.flow_key.clone(), status: RunStatus::Pending, created_at: now, updated_at: now })
    {
        return ApiError::from(err).into_response();
    }

    let runs_root = state.runs_root.clone();
    let flow_key = req.flow_key.clone();
    let config = (*state.config).clone();
    let index = state.index.clone();
    let registry = state.registry.clone();
    let driver_run_id = run_id.clone();

    tokio::spawn(async move {
        crate::driver::drive_run(runs_root, driver_run_id.clone(), flow_key, objective, req.repo_root, config, index, cancel, inject_slot)
            .await;
        registry.remove(&driver_run_id);
    });

    let events_url = format!("/api/runs/{run_id}/events");
    (
        StatusCode::CREATED,
        Json(CreateRunResponse { run_id, flow_key: req.flow_key, status: RunStatus::Pending, created_at: now, events_url }),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn list_runs(State(state): State<AppState>, Query(q): Query<ListRunsQuery>) -> impl IntoResponse {
    let status = q.status.as_deref().and_then(parse_status);
    let limit = q.limit.min(200);
    let (runs, total) = state.index.list(status, limit, q.offset);
    Json(serde_json::json!({ "runs": runs, "total": total, "limit": limit, "offset": q.offset }))
}

fn parse_status(s: &str) -> Option<RunStatus> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
}

/// ETag: the first 16 hex characters of the SHA-256 of the run's
/// comparable state, canonically serialized.
fn etag_for(state: &wp_domain::RunState) -> wp_domain::Result<String> {
    #[derive(Serialize)]
    struct Comparable<'a> {
        run_id: &'a str,
        status: RunStatus,
        step_index: u32,
        current_step_id: &'a Option<String>,
    }
    let comparable = state.comparable();
    let canonical = serde_json::to_vec(&Comparable {
        run_id: &comparable.run_id,
        status: comparable.status,
        step_index: comparable.step_index,
        current_step_id: &comparable.current_step_id,
    })?;
    let digest = Sha256::digest(&canonical);
    Ok(hex::encode(&digest[..8]))
}

fn load_state(state: &AppState, run_id: &str) -> wp_domain::Result<wp_domain::RunState> {
    state.index.get(run_id).ok_or_else(|| wp_domain::Error::NotFound(format!("run '{run_id}'")))?;
    let engine = RunEngine::open(&state.runs_root, run_id, "", (*state.config).clone())?;
    engine.state()
}

pub async fn get_run(State(state): State<AppState>, Path(run_id): Path<String>, headers: HeaderMap) -> impl IntoResponse {
    let run_state = match load_state(&state, &run_id) {
        Ok(s) => s,
        Err(err) => return ApiError::from(err).into_response(),
    };
    let etag = match etag_for(&run_state) {
        Ok(e) => e,
        Err(err) => return ApiError::from(err).into_response(),
    };

    if let Some(inm) = headers.get(axum::http::header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        if inm.trim_matches('"') == etag {
            return StatusCode::NOT_MODIFIED.into_response();
        }
    }

    let mut response = Json(run_state).into_response();
    response.headers_mut().insert(
        axum::http::header::ETAG,
        axum::http::HeaderValue::from_str(&format!("\"{etag}\"")).expect("hex etag is valid header text"),
    );
    response
}

fn check_if_match(state: &AppState, run_id: &str, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(im) = headers.get(axum::http::header::IF_MATCH).and_then(|v| v.to_str().ok()) else {
        return Ok(());
    };
    let current = load_state(state, run_id)?;
    let etag = etag_for(&current)?;
    if im.trim_matches('"') == etag {
        Ok(())
    } else {
        Err(ApiError::precondition_failed("If-Match precondition failed: run state has moved on"))
    }
}

pub async fn pause_run(State(state): State<AppState>, Path(run_id): Path<String>, headers: HeaderMap) -> impl IntoResponse {
    stop_run(state, run_id, headers, StopIntent::Paused).await
}

pub async fn interrupt_run(State(state): State<AppState>, Path(run_id): Path<String>, headers: HeaderMap) -> impl IntoResponse {
    stop_run(state, run_id, headers, StopIntent::Interrupted).await
}

pub async fn cancel_run(State(state): State<AppState>, Path(run_id): Path<String>, headers: HeaderMap) -> impl IntoResponse {
    stop_run(state, run_id, headers, StopIntent::Canceled).await
}

async fn stop_run(state: AppState, run_id: String, headers: HeaderMap, intent: StopIntent) -> axum::response::Response {
    if let Err(err) = check_if_match(&state, &run_id, &headers) {
        return err.into_response();
    }
    if state.registry.stop(&run_id, intent) {
        Json(serde_json::json!({ "run_id": run_id, "accepted": true })).into_response()
    } else {
        ApiError::not_found(format!("run '{run_id}' is not running in this process")).into_response()
    }
}

/// Resuming a stopped run re-opens its `RunEngine` against the same run
/// id and calls `run()` again — the checkpoint/resume protocol is
/// what makes this pick up at the right step, not anything this handler
/// does itself.
pub async fn resume_run(State(state): State<AppState>, Path(run_id): Path<String>) -> impl IntoResponse {
    let flow_key = match state.index.get(&run_id) {
        Some(summary) if !summary.status.is_terminal() || summary.status == RunStatus::Stopped => summary.flow_key,
        Some(_) => return ApiError::conflict("run has already reached a terminal, non-resumable state").into_response(),
        None => return ApiError::not_found(format!("run '{run_id}'")).into_response(),
    };

    if state.registry.is_running(&run_id) {
        return ApiError::conflict("run already has an active task in this process").into_response();
    }

    let (cancel, inject_slot) = state.registry.register(&run_id, &flow_key);
    let runs_root = state.runs_root.clone();
    let config = (*state.config).clone();
    let index = state.index.clone();
    let registry = state.registry.clone();
    let resumed_run_id = run_id.clone();
    let objective = format!("resume flow '{flow_key}'");

    tokio::spawn(async move {
        crate::driver::drive_run(runs_root, resumed_run_id.clone(), flow_key, objective, None, config, index, cancel, inject_slot).await;
        registry.remove(&resumed_run_id);
    });

    Json(serde_json::json!({ "run_id": run_id, "resumed": true })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct InjectRequest {
    pub flow_key: String,
}

/// The flow-graph editor and arbitrary node injection are out of scope;
/// the one injection surface this gateway exposes is queuing one of
/// the built-in utility flows (currently just `reset`) into the run's
/// own in-flight task, at its next step boundary. This never spawns a
/// second task against the run id — a run's event stream has exactly one
/// writer at a time, and `RunEngine::run` already refuses to drive a
/// run that's reached a terminal state.
pub async fn inject_flow(State(state): State<AppState>, Path(run_id): Path<String>, Json(req): Json<InjectRequest>) -> impl IntoResponse {
    if req.flow_key != "reset" {
        return ApiError::bad_request("only the built-in 'reset' utility flow can be injected").into_response();
    }

    if state.registry.request_injection(&run_id, &req.flow_key) {
        Json(serde_json::json!({ "run_id": run_id, "queued": "reset" })).into_response()
    } else {
        ApiError::not_found(format!("run '{run_id}' has no active task in this process to inject into")).into_response()
    }
}

pub async fn run_events_sse(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<SseEvent, std::convert::Infallible>>> {
    let events_path = state.runs_root.join(&run_id).join("events.jsonl");
    let last_event_id: u64 = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let index = state.index.clone();
    let stream = async_stream::stream! {
        // Catch-up: replay everything already on disk past the resume
        // offset, computing real byte offsets as we go.
        let mut offset = 0u64;
        if let Ok(content) = tokio::fs::read_to_string(&events_path).await {
            for line in content.lines() {
                let line_end = offset + line.len() as u64 + 1;
                if line_end > last_event_id && !line.trim().is_empty() {
                    if let Ok(event) = serde_json::from_str::<wp_domain::Event>(line) {
                        yield Ok(sse_event_for(line_end, &event));
                    }
                }
                offset = line_end;
            }
        }

        // Live tail: subscribe after catch-up so at most a handful of
        // events already covered by catch-up are ever duplicated, never
        // lost, a standard caveat of best-effort broadcast resume.
        let mut rx = index.subscribe(&run_id);
        loop {
            match rx.recv().await {
                Ok(event) => {
                    offset += 1;
                    yield Ok(sse_event_for(offset, &event));
                    if event_is_terminal(&event) {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
        index.cleanup_channel(&run_id);
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_event_for(offset: u64, event: &wp_domain::Event) -> SseEvent {
    SseEvent::default()
        .id(offset.to_string())
        .event(event.kind.name())
        .data(serde_json::to_string(event).unwrap_or_default())
}

fn event_is_terminal(event: &wp_domain::Event) -> bool {
    matches!(
        event.kind,
        wp_domain::EventKind::RunCompleted | wp_domain::EventKind::RunFailed { .. } | wp_domain::EventKind::RunStopped { .. }
    )
}
