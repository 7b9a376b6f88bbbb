//! Shared types for the workflow orchestration kernel: events, run state,
//! envelopes, receipts, routing vocabulary, configuration and telemetry.
//!
//! Every other crate in the workspace depends on this one; it depends on
//! nothing in the workspace itself.

pub mod config;
pub mod envelope;
pub mod error;
pub mod event;
pub mod ids;
pub mod receipt;
pub mod routing;
pub mod run_state;
pub mod telemetry;

pub use config::Config;
pub use envelope::{HandoffEnvelope, RoutingSignal, StepStatus};
pub use error::{Error, Result};
pub use event::{Event, EventKind};
pub use ids::{generate_run_id, step_index_of};
pub use receipt::{truncate_output, NormalizedToolCall, Receipt, ToolCallSource};
pub use routing::{
    Confidence, RoutingAction, RoutingCandidate, RoutingDecision, RoutingDecisionKind, Violation,
    ViolationSeverity, ViolationType,
};
pub use run_state::{ComparableState, FlowTransition, InterruptionFrame, RunState, RunStatus};
pub use telemetry::KernelEvent;
