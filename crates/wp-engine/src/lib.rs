//! The run engine (C16): replay, checkpoint/resume, the built-in flow
//! registry, candidate-menu assembly, and the orchestrator that drives a
//! run's step loop end to end.

pub mod apply_event;
pub mod candidates;
pub mod checkpoint;
pub mod flow_graph;
pub mod orchestrator;

pub use apply_event::{apply_event, replay, verify_run_state};
pub use candidates::{build_candidates, CandidateInputs};
pub use checkpoint::{classify_partial_state, CheckpointManager, PartialStateStrategy, ResumeAction};
pub use flow_graph::{FlowGraph, FlowRegistry, FlowStep, StaticFlowGraph};
pub use orchestrator::RunEngine;
