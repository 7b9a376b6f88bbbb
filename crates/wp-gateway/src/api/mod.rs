//! Route tree: a public router for health probes, and a protected one for
//! everything that touches run state.

pub mod health;
pub mod runs;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let public = Router::new().route("/healthz", get(health::healthz)).route("/readyz", get(health::readyz));

    let protected = Router::new()
        .route("/runs", post(runs::create_run).get(runs::list_runs))
        .route("/runs/:run_id", get(runs::get_run).delete(runs::cancel_run))
        .route("/runs/:run_id/events", get(runs::run_events_sse))
        .route("/runs/:run_id/pause", post(runs::pause_run))
        .route("/runs/:run_id/resume", post(runs::resume_run))
        .route("/runs/:run_id/interrupt", post(runs::interrupt_run))
        .route("/runs/:run_id/inject", post(runs::inject_flow))
        .route_layer(middleware::from_fn_with_state(state.clone(), crate::auth::require_api_token));

    Router::new().merge(public).merge(protected).with_state(state)
}
