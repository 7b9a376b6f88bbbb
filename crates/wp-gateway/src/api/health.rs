//! Unauthenticated liveness/readiness probes.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Ready once the runs root is a writable directory — the one dependency
/// every other endpoint needs.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match std::fs::metadata(&state.runs_root) {
        Ok(meta) if meta.is_dir() => Json(serde_json::json!({ "status": "ready" })).into_response(),
        _ => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "not_ready", "reason": "runs root unavailable" })),
        )
            .into_response(),
    }
}
