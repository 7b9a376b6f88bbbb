//! Routing: detour matching, the sidequest catalog, utility flow injection,
//! the routing audit trail, the microloop exit predicate, and the
//! engine-side guard on Navigator choices.

pub mod audit;
pub mod detour;
pub mod microloop_exit;
pub mod navigator;
pub mod sidequest;
pub mod utility_flow;

pub use audit::RoutingAuditTrail;
pub use detour::{DetourMatch, DetourMatcher, DetourRule};
pub use microloop_exit::{should_exit_microloop, ExitReason, MicroloopState};
pub use navigator::{default_candidate, validate_choice, NavigatorChoice, NavigatorValidationError};
pub use sidequest::{FieldOp, FieldValue, SidequestCatalog, SidequestDefinition, Trigger, TriggerContext, TriggerMode};
pub use utility_flow::{candidate_for, detect_upstream_diverged, GitDivergence, UtilityTrigger};
