//! HTTP + SSE control plane for the workflow orchestration kernel: the
//! only boundary a caller outside this workspace is expected to talk to.
//! Everything here is a thin adapter over `wp-engine` — no orchestration
//! logic lives in this crate, only request parsing, auth, and the
//! long-lived run registry a server process needs that a library crate
//! has no business owning.

pub mod api;
pub mod auth;
pub mod driver;
pub mod error;
pub mod registry;
pub mod state;

pub use error::ApiError;
pub use state::AppState;
