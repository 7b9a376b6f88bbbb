//! The single source of truth for microloop termination: one pure
//! function, checked in a fixed priority order so a step can't accidentally
//! loop past a safety fuse.

use wp_domain::StepStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StatusVerified,
    MaxIterationsReached,
    NoFurtherHelp,
}

impl ExitReason {
    pub fn code(self) -> &'static str {
        match self {
            ExitReason::StatusVerified => "status_verified",
            ExitReason::MaxIterationsReached => "max_iterations_reached",
            ExitReason::NoFurtherHelp => "no_further_help",
        }
    }

    /// Confidence the kernel attaches to the exit itself, independent of the
    /// `Confidence` on whatever routing decision follows from it.
    pub fn confidence(self) -> f64 {
        match self {
            ExitReason::StatusVerified => 1.0,
            ExitReason::NoFurtherHelp => 0.8,
            ExitReason::MaxIterationsReached => 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MicroloopState {
    pub current_iteration: u32,
    pub max_iterations: u32,
    pub status: StepStatus,
    /// `None` means the critic gave no explicit guidance — treated as "yes,
    /// further iteration may help" so the loop doesn't exit prematurely.
    pub can_further_iteration_help: Option<bool>,
}

/// Checked in priority order:
/// 1. `status` is one of `success_values` → exit `status_verified`.
/// 2. `current_iteration >= max_iterations` → exit `max_iterations_reached`
///    (the safety fuse; checked before the critic's opinion, never steered
///    around by it).
/// 3. `can_further_iteration_help == Some(false)` → exit `no_further_help`.
/// 4. Otherwise keep looping.
pub fn should_exit_microloop(state: MicroloopState, success_values: &[StepStatus]) -> Option<ExitReason> {
    if success_values.contains(&state.status) {
        return Some(ExitReason::StatusVerified);
    }
    if state.current_iteration >= state.max_iterations {
        return Some(ExitReason::MaxIterationsReached);
    }
    if state.can_further_iteration_help == Some(false) {
        return Some(ExitReason::NoFurtherHelp);
    }
    None
}
