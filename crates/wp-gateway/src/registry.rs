//! Per-run cancellation handles for the process driving them.
//!
//! One `RunEngine` already serializes its own step loop; what this registry
//! adds is the HTTP-facing half of that contract — a place to park the
//! `CancellationToken` a running task is watching, so `pause`/`interrupt`/
//! `cancel` requests arriving on a different task can reach it. Shaped like
//! a session-keyed cancel map, generalized from a plain `AtomicBool` flag
//! per session to the `tokio_util` token the engine already takes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopIntent {
    Paused,
    Interrupted,
    Canceled,
}

/// A run-scoped slot a running task polls at its own step boundaries.
/// Generalized from the plain `CancellationToken` halt signal to carry a
/// payload: the flow key of a utility flow to inject next, rather than a
/// bare stop.
pub type InjectSlot = Arc<Mutex<Option<String>>>;

struct RunHandle {
    cancel: CancellationToken,
    flow_key: String,
    inject_slot: InjectSlot,
}

/// Tracks in-flight runs for this process. A run absent from the registry
/// is either not yet started, or has already reached a terminal state —
/// the registry is a liveness index, not the source of truth (that's the
/// event log `wp-store` owns).
pub struct RunRegistry {
    handles: Mutex<HashMap<String, RunHandle>>,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self { handles: Mutex::new(HashMap::new()) }
    }

    /// Register a freshly spawned run's cancellation token and injection
    /// slot. Replaces any prior entry for the same run id, which is
    /// expected on resume.
    pub fn register(&self, run_id: &str, flow_key: &str) -> (CancellationToken, InjectSlot) {
        let token = CancellationToken::new();
        let slot: InjectSlot = Arc::new(Mutex::new(None));
        self.handles.lock().insert(
            run_id.to_string(),
            RunHandle { cancel: token.clone(), flow_key: flow_key.to_string(), inject_slot: slot.clone() },
        );
        (token, slot)
    }

    /// Queue `flow_key` to be injected into `run_id`'s running task at its
    /// next step boundary. Returns `false` if no task is currently driving
    /// this run in this process — there's nothing live to inject into.
    pub fn request_injection(&self, run_id: &str, flow_key: &str) -> bool {
        if let Some(handle) = self.handles.lock().get(run_id) {
            *handle.inject_slot.lock() = Some(flow_key.to_string());
            true
        } else {
            false
        }
    }

    /// Trip the cancellation token for a running run. Returns `false` if
    /// the run isn't tracked as in-flight by this process. The engine's own
    /// `CancellationToken` carries no intent, so pause/interrupt/cancel all
    /// land as the same halt from its point of view; the distinction is
    /// kept only for the caller-facing response and log line.
    pub fn stop(&self, run_id: &str, intent: StopIntent) -> bool {
        if let Some(handle) = self.handles.lock().get(run_id) {
            tracing::debug!(run_id, ?intent, "stopping run");
            handle.cancel.cancel();
            true
        } else {
            false
        }
    }

    pub fn flow_key_of(&self, run_id: &str) -> Option<String> {
        self.handles.lock().get(run_id).map(|h| h.flow_key.clone())
    }

    pub fn is_running(&self, run_id: &str) -> bool {
        self.handles.lock().contains_key(run_id)
    }

    pub fn remove(&self, run_id: &str) {
        self.handles.lock().remove(run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_stop() {
        let registry = RunRegistry::new();
        let (token, _slot) = registry.register("r1", "build");
        assert!(!token.is_cancelled());
        assert!(registry.stop("r1", StopIntent::Canceled));
        assert!(token.is_cancelled());
    }

    #[test]
    fn stop_unknown_run_is_false() {
        let registry = RunRegistry::new();
        assert!(!registry.stop("ghost", StopIntent::Canceled));
    }

    #[test]
    fn remove_drops_liveness() {
        let registry = RunRegistry::new();
        registry.register("r1", "build");
        registry.remove("r1");
        assert!(!registry.is_running("r1"));
    }

    #[test]
    fn injection_is_queued_only_for_a_tracked_run() {
        let registry = RunRegistry::new();
        assert!(!registry.request_injection("ghost", "reset"));

        let (_token, slot) = registry.register("r1", "build");
        assert!(registry.request_injection("r1", "reset"));
        assert_eq!(slot.lock().as_deref(), Some("reset"));
    }
}
