//! The run engine: composes every other component
//! into the per-run event loop. One `RunEngine` drives one run; many runs
//! execute concurrently as separate tasks with no shared state beyond the
//! (optional) run catalog a control plane maintains outside this crate.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use wp_budget::{enforce_budget, ContextItem, Priority};
use wp_domain::{
    Config, Confidence, Error, Event, EventKind, HandoffEnvelope, NormalizedToolCall, Receipt, Result, RoutingAction,
    RoutingCandidate, RoutingDecision, RoutingDecisionKind, RunState, RunStatus, StepStatus, ViolationSeverity,
};
use wp_progress::{ProgressTracker, Recommendation};
use wp_routing::{
    default_candidate, detect_upstream_diverged, should_exit_microloop, DetourMatcher, ExitReason, GitDivergence,
    MicroloopState, RoutingAuditTrail, SidequestCatalog, TriggerContext,
};
use wp_scent::ScentTrail;
use wp_session::{StepSession, Transport};
use wp_store::{read_json, write_json_atomic, EventLog, RunLayout};
use wp_workspace::Workspace;

use crate::apply_event::{apply_event, replay, verify_run_state};
use crate::checkpoint::{CheckpointManager, ResumeAction};
use crate::flow_graph::{next_in_sequence, FlowGraph, FlowRegistry};

fn envelope_schema() -> serde_json::Value {
    serde_json::json!({
        "required": ["step_id", "flow_key", "run_id", "status", "summary"],
        "properties": {
            "step_id": {"type": "string"},
            "flow_key": {"type": "string"},
            "run_id": {"type": "string"},
            "status": {
                "type": "string",
                "enum": ["succeeded", "failed", "unverified", "verified", "blocked", "partial"]
            },
            "can_further_iteration_help": {"type": "boolean", "nullable": true},
            "summary": {"type": "string"}
        }
    })
}

fn decision_kind_for(action: RoutingAction) -> RoutingDecisionKind {
    match action {
        RoutingAction::Continue => RoutingDecisionKind::Continue,
        RoutingAction::Loop => RoutingDecisionKind::Loop,
        RoutingAction::Detour => RoutingDecisionKind::Detour,
        RoutingAction::InjectFlow => RoutingDecisionKind::InjectFlow,
        RoutingAction::Escalate => RoutingDecisionKind::Escalate,
        RoutingAction::Terminate => RoutingDecisionKind::Terminate,
    }
}

fn confidence_for_priority(priority: u8) -> Confidence {
    if priority >= 80 {
        Confidence::High
    } else if priority >= 40 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// What happened when a flow's steps ran out, stopped, or handed off —
/// the outer run loop decides what to do next from this alone.
enum FlowStepsOutcome {
    /// The flow halted on something irrecoverable (critical boundary
    /// violation, escalation, `no_further_help`, or an explicit terminate).
    Halted,
    Canceled,
    /// A utility flow was injected (or the step's own return from one
    /// completed); the run loop should switch to driving `next_flow_key`.
    Interrupted { next_flow_key: String },
    /// Every step in the flow completed; the caller decides whether to
    /// chain to the next flow in the top-level sequence.
    FlowExhausted,
}

/// If `flow_key` was itself reached via a utility-flow injection, the
/// flow key it should hand back to once it exhausts its own steps — read
/// off the top interruption frame's `return_flow_key`, the same field
/// `apply_event`'s `MacroRoute` handler checks to decide whether to
/// resume a frame instead of starting fresh. A flow that exhausts without
/// a matching frame on top of the stack (i.e. a top-level sequence flow)
/// returns `None`.
fn return_flow_key_for(state: &RunState, flow_key: &str) -> Option<String> {
    let frame = state.interruption_stack.last()?;
    if !frame.reason.starts_with("utility_flow:") {
        return None;
    }
    let return_flow_key = frame.context_snapshot.get("return_flow_key")?.as_str()?;
    if return_flow_key == flow_key {
        return None;
    }
    Some(return_flow_key.to_string())
}

pub struct RunEngine {
    run_id: String,
    layout: RunLayout,
    event_log: EventLog,
    flow_registry: FlowRegistry,
    detour_matcher: DetourMatcher,
    sidequest_catalog: SidequestCatalog,
    audit_trail: RoutingAuditTrail,
    scent: ScentTrail,
    config: Config,
    progress_trackers: HashMap<String, ProgressTracker>,
}

impl RunEngine {
    pub fn open(runs_root: impl AsRef<Path>, run_id: &str, flow_objective: &str, config: Config) -> Result<Self> {
        let layout = RunLayout::new(runs_root.as_ref(), run_id);
        layout.ensure()?;
        let event_log = EventLog::new(layout.events_path());
        let audit_trail = RoutingAuditTrail::new(layout.routing_decisions_path());
        audit_trail.warm_from_disk()?;
        let scent = ScentTrail::load(&layout.scent_trail_path())?.unwrap_or_else(|| ScentTrail::new(run_id, flow_objective));

        Ok(Self {
            run_id: run_id.to_string(),
            layout,
            event_log,
            flow_registry: FlowRegistry::built_in(),
            detour_matcher: DetourMatcher::new(3),
            sidequest_catalog: SidequestCatalog::default_catalog(),
            audit_trail,
            scent,
            config,
            progress_trackers: HashMap::new(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Replay `events.jsonl` into a fresh `RunState`, then compare it
    /// against the last-written snapshot. A drift is logged and the
    /// replayed state wins — the snapshot is an optimization, never truth.
    pub fn state(&self) -> Result<RunState> {
        let events = self.event_log.replay()?;
        let replayed = replay(&self.run_id, &events);
        if let Some(stored) = read_json::<RunState>(&self.layout.state_snapshot_path())? {
            if !verify_run_state(&replayed, &stored) {
                tracing::warn!(run_id = %self.run_id, "run_state.json drifted from replayed event log; using replayed state");
            }
        }
        Ok(replayed)
    }

    fn emit(&self, kind: EventKind) -> Result<Event> {
        let event = Event::new(&self.run_id, kind);
        self.event_log.append(&event)?;
        Ok(event)
    }

    fn emit_and_apply(&self, kind: EventKind, state: RunState) -> Result<RunState> {
        let event = self.emit(kind)?;
        let state = apply_event(state, &event);
        write_json_atomic(&self.layout.state_snapshot_path(), &state)?;
        Ok(state)
    }

    /// Assemble the Work-phase prompt: scent trail digest and the prior
    /// step's summary are budget-ranked ahead of the flow's own fixed
    /// prompt text, which is never itself subject to the budget.
    fn build_step_prompt(&self, base_prompt: &str, state: &RunState) -> String {
        let teaching_notes = self.scent.to_markdown_summary(2000);
        let previous_output =
            state.handoff_envelopes.values().max_by_key(|e| e.step_id.clone()).map(|e| e.summary.clone()).unwrap_or_default();

        let items = vec![
            ContextItem { key: "teaching_notes".into(), content: teaching_notes, priority: Priority::Critical },
            ContextItem { key: "previous_output".into(), content: previous_output, priority: Priority::High },
        ];
        let report = enforce_budget(items, self.config.budget.default_budget_tokens);

        let mut prompt = String::new();
        for item in report.loaded() {
            if item.content.is_empty() {
                continue;
            }
            prompt.push_str(&item.content);
            prompt.push_str("\n\n");
        }
        if let Some(note) = report.truncation_note() {
            prompt.push_str(&note);
            prompt.push_str("\n\n");
        }
        prompt.push_str(base_prompt);
        prompt
    }

    /// Pick the workspace a flow runs against: `deploy_workspace` (a real,
    /// non-forked checkout) for the `deploy` flow, the caller's workspace
    /// for everything else.
    fn workspace_for<'a>(flow_key: &str, default_ws: &'a dyn Workspace, deploy_ws: Option<&'a dyn Workspace>) -> &'a dyn Workspace {
        if flow_key == "deploy" {
            deploy_ws.unwrap_or(default_ws)
        } else {
            default_ws
        }
    }

    /// Drive `flow_key` to completion, chaining automatically through the
    /// top-level `signal → plan → build → gate → deploy → wisdom` sequence
    /// and through any utility flow injected along the way, until the run
    /// reaches a terminal state or is canceled. A run already in a terminal
    /// state is returned unchanged rather than re-driven — the event log is
    /// the single append-only record of one flow at a time for a run id,
    /// and driving it twice would corrupt that.
    pub async fn run<T, F>(
        &mut self,
        flow_key: &str,
        workspace: &dyn Workspace,
        deploy_workspace: Option<&dyn Workspace>,
        mut transport_factory: F,
        cancel: &CancellationToken,
        inject_slot: Option<Arc<Mutex<Option<String>>>>,
    ) -> Result<RunState>
    where
        T: Transport,
        F: for<'fk, 'sid> FnMut(&'fk str, &'sid str) -> T,
    {
        if !self.flow_registry.contains(flow_key) {
            return Err(Error::Config(format!("unknown flow '{flow_key}'")));
        }

        let mut state = self.state()?;
        if state.status.is_terminal() {
            return Ok(state);
        }
        if state.status == RunStatus::Pending {
            state = self.emit_and_apply(EventKind::RunStarted { flow_key: flow_key.to_string() }, state)?;
        }

        let mut current_flow_key = state.flow_key.clone();
        let mut resume_step_index = None;

        loop {
            let active_workspace = Self::workspace_for(&current_flow_key, workspace, deploy_workspace);
            let outcome = self
                .run_flow_steps(&current_flow_key, active_workspace, &mut transport_factory, cancel, inject_slot.as_ref(), &mut state, resume_step_index)
                .await?;

            match outcome {
                FlowStepsOutcome::Halted | FlowStepsOutcome::Canceled => return Ok(state),
                FlowStepsOutcome::Interrupted { next_flow_key } => {
                    // The injected flow's first step resumes at whatever
                    // index apply_event already restored into `state`
                    // (fresh injection: 0; return from one: the saved frame).
                    resume_step_index = Some(state.step_index);
                    current_flow_key = next_flow_key;
                }
                FlowStepsOutcome::FlowExhausted => {
                    state = self.emit_and_apply(EventKind::FlowCompleted { flow_key: current_flow_key.clone() }, state)?;

                    if let Some(return_flow_key) = return_flow_key_for(&state, &current_flow_key) {
                        // A utility flow finishing: hand back to whatever
                        // flow it was injected from rather than advancing
                        // the top-level sequence. apply_event's own
                        // resuming_from_injection branch pops the
                        // interruption frame and restores step_index.
                        state = self.emit_and_apply(
                            EventKind::MacroRoute {
                                from_flow: current_flow_key.clone(),
                                to_flow: return_flow_key.clone(),
                                reason: "utility flow completed".to_string(),
                            },
                            state,
                        )?;
                        resume_step_index = Some(state.step_index);
                        current_flow_key = return_flow_key;
                        continue;
                    }

                    match next_in_sequence(&current_flow_key) {
                        Some(next_flow) => {
                            state = self.emit_and_apply(
                                EventKind::MacroRoute {
                                    from_flow: current_flow_key.clone(),
                                    to_flow: next_flow.to_string(),
                                    reason: "flow exhausted; advancing to the next flow in sequence".to_string(),
                                },
                                state,
                            )?;
                            state = self.emit_and_apply(EventKind::FlowStarted { flow_key: next_flow.to_string() }, state)?;
                            current_flow_key = next_flow.to_string();
                            resume_step_index = Some(0);
                        }
                        None => {
                            state = self.emit_and_apply(EventKind::RunCompleted, state)?;
                            return Ok(state);
                        }
                    }
                }
            }
        }
    }

    /// Run `flow_key`'s steps from `resume_step_index` (or the on-disk
    /// checkpoint if `None`) until the flow exhausts its steps, halts,
    /// is canceled, or hands off to a utility flow.
    #[allow(clippy::too_many_arguments)]
    async fn run_flow_steps<T, F>(
        &mut self,
        flow_key: &str,
        workspace: &dyn Workspace,
        transport_factory: &mut F,
        cancel: &CancellationToken,
        inject_slot: Option<&Arc<Mutex<Option<String>>>>,
        state: &mut RunState,
        resume_step_index: Option<u32>,
    ) -> Result<FlowStepsOutcome>
    where
        T: Transport,
        F: for<'fk, 'sid> FnMut(&'fk str, &'sid str) -> T,
    {
        let flow_len = self.flow_registry.get(flow_key).ok_or_else(|| Error::Config(format!("unknown flow '{flow_key}'")))?.len();

        let mut step_index = match resume_step_index {
            Some(index) => index,
            None => {
                let checkpoint = CheckpointManager::new(&self.layout);
                match checkpoint.find_resume_point(flow_key)? {
                    ResumeAction::StartFresh => 0,
                    ResumeAction::Continue { step_index } => step_index,
                    ResumeAction::Retry { step_index } => step_index,
                }
            }
        };

        while step_index < flow_len {
            if cancel.is_cancelled() {
                *state = self.emit_and_apply(EventKind::RunStopped { reason: "canceled".to_string() }, state.clone())?;
                return Ok(FlowStepsOutcome::Canceled);
            }

            let step = self
                .flow_registry
                .get(flow_key)
                .and_then(|flow| flow.step_at(step_index))
                .expect("step_index bounded by flow_len in the loop guard")
                .clone();

            if let Some(requested_flow) = inject_slot.and_then(|slot| slot.lock().take()) {
                if self.flow_registry.contains(&requested_flow) {
                    *state = self.emit_and_apply(
                        EventKind::UtilityFlowInjected {
                            flow_id: requested_flow.clone(),
                            trigger_type: "external_injection".to_string(),
                            return_flow_key: flow_key.to_string(),
                            return_step_id: step.step_id.clone(),
                        },
                        state.clone(),
                    )?;
                    return Ok(FlowStepsOutcome::Interrupted { next_flow_key: requested_flow });
                }
                tracing::warn!(flow_key = %requested_flow, "ignoring injection request for an unknown flow");
            }

            let (envelope, exit_reason, receipt, handoff_candidate) =
                self.run_step_microloop(flow_key, &step, step_index, workspace, transport_factory, state).await?;

            write_json_atomic(&self.layout.receipt_path(flow_key, &step.step_id), &receipt)?;
            write_json_atomic(&self.layout.envelope_path(flow_key, &step.step_id), &envelope)?;

            *state = self.emit_and_apply(
                EventKind::StepCompleted {
                    flow_key: flow_key.to_string(),
                    step_id: step.step_id.clone(),
                    status: receipt.status.clone(),
                    envelope: Some(serde_json::to_value(&envelope)?),
                },
                state.clone(),
            )?;

            if let Some(candidate) = &handoff_candidate {
                match candidate.action {
                    RoutingAction::InjectFlow => {
                        let flow_id = candidate
                            .candidate_id
                            .strip_prefix("inject_flow:")
                            .unwrap_or(&candidate.candidate_id)
                            .to_string();
                        *state = self.emit_and_apply(
                            EventKind::UtilityFlowInjected {
                                flow_id: flow_id.clone(),
                                trigger_type: "upstream_diverged".to_string(),
                                return_flow_key: flow_key.to_string(),
                                return_step_id: step.step_id.clone(),
                            },
                            state.clone(),
                        )?;
                        return Ok(FlowStepsOutcome::Interrupted { next_flow_key: flow_id });
                    }
                    RoutingAction::Escalate => {
                        *state = self.emit_and_apply(
                            EventKind::FlowPaused { flow_key: flow_key.to_string(), reason: candidate.reason.clone() },
                            state.clone(),
                        )?;
                        return Ok(FlowStepsOutcome::Halted);
                    }
                    RoutingAction::Terminate => {
                        *state = self.emit_and_apply(EventKind::RunFailed { reason: candidate.reason.clone() }, state.clone())?;
                        return Ok(FlowStepsOutcome::Halted);
                    }
                    _ => {}
                }
            }

            if exit_reason == Some(ExitReason::NoFurtherHelp) && envelope.status != StepStatus::Succeeded {
                *state = self.emit_and_apply(EventKind::RunFailed { reason: "no further iteration would help".to_string() }, state.clone())?;
                return Ok(FlowStepsOutcome::Halted);
            }

            step_index = state.step_index;
        }

        Ok(FlowStepsOutcome::FlowExhausted)
    }

    /// Run one step's Work → Finalize → Route cycle repeatedly until the
    /// microloop exit predicate says to stop, applying boundary scans,
    /// progress tracking, and candidate-menu assembly on every iteration.
    async fn run_step_microloop<T, F>(
        &mut self,
        flow_key: &str,
        step: &crate::flow_graph::FlowStep,
        step_index: u32,
        workspace: &dyn Workspace,
        transport_factory: &mut F,
        state: &mut RunState,
    ) -> Result<(HandoffEnvelope, Option<ExitReason>, Receipt, Option<RoutingCandidate>)>
    where
        T: Transport,
        F: for<'fk, 'sid> FnMut(&'fk str, &'sid str) -> T,
    {
        let mut iteration: u32 = 0;

        loop {
            iteration += 1;

            *state = self.emit_and_apply(
                EventKind::StepStarted { flow_key: flow_key.to_string(), step_id: step.step_id.clone(), step_index },
                state.clone(),
            )?;

            let prompt = self.build_step_prompt(&step.prompt, state);
            let transport = transport_factory(flow_key, &step.step_id);
            let mut session = StepSession::new(&self.run_id, flow_key, &step.step_id, transport);
            let started_at = chrono::Utc::now();
            let timer = Instant::now();

            let work_output = session.work(&prompt, None).await?;
            let envelope: HandoffEnvelope = session.finalize(&envelope_schema(), &prompt).await?;
            let transport_signal = session.route().await.unwrap_or(None);
            if let Some(signal) = &transport_signal {
                tracing::debug!(step_id = %step.step_id, ?signal, "transport offered a routing signal");
            }

            let critical = self.scan_boundary(&step.step_id, workspace, state).await?;
            if critical {
                let receipt = self.build_receipt(flow_key, step, &envelope, &work_output, &session, started_at, timer);
                // A CRITICAL boundary violation halts the run unconditionally —
                // the envelope's own status is irrelevant; the agent can report
                // success while having written into the real repo checkout.
                let candidate = RoutingCandidate {
                    candidate_id: "boundary_scanner:critical".to_string(),
                    action: RoutingAction::Terminate,
                    target_node: None,
                    reason: "a critical boundary violation was detected".to_string(),
                    priority: 100,
                    source: "boundary_scanner".to_string(),
                    evidence_pointers: vec![format!("step_id:{}", step.step_id)],
                    is_default: false,
                };
                return Ok((envelope, Some(ExitReason::NoFurtherHelp), receipt, Some(candidate)));
            }

            workspace.commit_all(&format!("{flow_key}/{}", step.step_id)).await?;

            let written = workspace.written_paths().await.unwrap_or_default();
            let tracker = self
                .progress_trackers
                .entry(step.step_id.clone())
                .or_insert_with(|| ProgressTracker::new(self.config.budget.stall_threshold));
            if matches!(envelope.status, StepStatus::Succeeded | StepStatus::Verified) {
                tracker.record_success(iteration);
            } else {
                tracker.record_iteration(&envelope.summary);
            }
            let stalled = tracker.is_stalled();
            let escalate_on_stall = tracker.recommendation() == Recommendation::Escalate;
            let stall_count = tracker.stall_count();

            let utility_trigger = self.detect_utility_trigger(workspace).await?;

            let sidequest_ctx = TriggerContext {
                stall_signals_is_stalled: stalled,
                iteration,
                changed_paths: written.iter().map(|p| p.display().to_string()).collect(),
                ..Default::default()
            };
            let forensics = matches!(envelope.status, StepStatus::Failed | StepStatus::Blocked).then(|| envelope.summary.as_str());

            let mut candidates = crate::candidates::build_candidates(
                crate::candidates::CandidateInputs {
                    step_id: &step.step_id,
                    forensics,
                    sidequest_ctx: &sidequest_ctx,
                    utility_trigger: utility_trigger.as_ref(),
                },
                &mut self.detour_matcher,
                &self.sidequest_catalog,
                &self.run_id,
            );
            if escalate_on_stall {
                candidates.push(RoutingCandidate {
                    candidate_id: "stall_tracker_escalation".to_string(),
                    action: RoutingAction::Escalate,
                    target_node: None,
                    reason: "progress tracker recorded a sustained stall with no velocity".to_string(),
                    priority: 90,
                    source: "progress_tracker".to_string(),
                    evidence_pointers: vec![format!("stall_count:{stall_count}")],
                    is_default: false,
                });
            }

            let exit_reason = should_exit_microloop(
                MicroloopState {
                    current_iteration: iteration,
                    max_iterations: self.config.runs.max_microloop_iterations,
                    status: envelope.status,
                    can_further_iteration_help: envelope.can_further_iteration_help,
                },
                &[StepStatus::Succeeded, StepStatus::Verified],
            );

            let chosen =
                candidates.iter().filter(|c| !c.is_default).max_by_key(|c| c.priority).cloned().or_else(|| default_candidate(&candidates).cloned());

            if let Some(candidate) = chosen.as_ref().filter(|c| c.action != RoutingAction::Continue) {
                self.record_decision(flow_key, &step.step_id, candidate, iteration, exit_reason)?;
                if candidate.source == "sidequest_catalog" {
                    self.sidequest_catalog.record_use(&self.run_id, &candidate.candidate_id);
                }
            }

            self.scent.add_decision(&step.step_id, &envelope.summary);
            self.scent.save(&self.layout.scent_trail_path())?;

            let action = chosen.as_ref().map(|c| c.action).unwrap_or(RoutingAction::Continue);

            match action {
                RoutingAction::Detour => {
                    let candidate = chosen.expect("Detour action always carries its candidate");
                    let signature_id = candidate.candidate_id.strip_prefix("detour:").unwrap_or(&candidate.candidate_id).to_string();
                    let detour_target = candidate.target_node.clone().unwrap_or_else(|| "unresolved-detour".to_string());

                    *state = self.emit_and_apply(
                        EventKind::DetourStarted { step_id: step.step_id.clone(), signature_id: signature_id.clone(), detour_target: detour_target.clone() },
                        state.clone(),
                    )?;

                    let resolved = self.run_injected_node(flow_key, &detour_target, transport_factory).await?;

                    *state = self.emit_and_apply(
                        EventKind::DetourCompleted { step_id: step.step_id.clone(), signature_id, resolved },
                        state.clone(),
                    )?;
                    continue;
                }
                RoutingAction::InjectFlow | RoutingAction::Escalate | RoutingAction::Terminate | RoutingAction::Continue | RoutingAction::Loop => {
                    if matches!(action, RoutingAction::InjectFlow | RoutingAction::Escalate | RoutingAction::Terminate) || exit_reason.is_some() {
                        let receipt = self.build_receipt(flow_key, step, &envelope, &work_output, &session, started_at, timer);
                        let handoff_candidate =
                            chosen.filter(|c| matches!(c.action, RoutingAction::InjectFlow | RoutingAction::Escalate | RoutingAction::Terminate));
                        return Ok((envelope, exit_reason, receipt, handoff_candidate));
                    }
                    continue;
                }
            }
        }
    }

    /// Scan the step's worked-on workspace for boundary violations. Returns
    /// whether any CRITICAL violation was found — the caller treats that as
    /// an immediate halt, never something routing can route around.
    async fn scan_boundary(&self, step_id: &str, workspace: &dyn Workspace, state: &mut RunState) -> Result<bool> {
        let mut violations = Vec::new();

        let branch = workspace.current_branch().await.unwrap_or_default();
        if let Some(v) = wp_workspace::boundary::scan_branch(step_id, &branch) {
            violations.push(v);
        }

        let written = workspace.written_paths().await.unwrap_or_default();
        if !written.is_empty() {
            let real_repo_root = workspace.real_repo_root().map(Path::to_path_buf).unwrap_or_else(|| workspace.root().to_path_buf());
            violations.extend(wp_workspace::boundary::scan_written_paths(step_id, workspace.root(), &real_repo_root, &written));
        }

        if workspace.is_shadow() && workspace.base_branch_moved().await.unwrap_or(false) {
            violations.push(wp_workspace::boundary::real_repo_moved_violation(step_id));
        }

        let mut critical = false;
        for violation in violations {
            critical |= violation.severity == ViolationSeverity::Critical;
            *state = self.emit_and_apply(
                EventKind::BoundaryViolation { step_id: step_id.to_string(), violation: serde_json::to_value(&violation)? },
                state.clone(),
            )?;
        }
        Ok(critical)
    }

    /// The `upstream_diverged` utility-flow trigger, evaluated from the
    /// workspace's own divergence report — meaningful only for a workspace
    /// that shadows a real repo at all.
    async fn detect_utility_trigger(&self, workspace: &dyn Workspace) -> Result<Option<wp_routing::UtilityTrigger>> {
        if !workspace.is_shadow() {
            return Ok(None);
        }
        let behind_count = workspace.upstream_divergence().await.unwrap_or(None).unwrap_or(0);
        detect_upstream_diverged(
            workspace.real_repo_root().is_some(),
            self.config.runs.strict_repo_root,
            GitDivergence { diverged: behind_count > 0, behind_count },
        )
    }

    /// Run a transient, non-checkpointed node (a detour target) to
    /// completion and report whether it resolved what it was sent to fix.
    async fn run_injected_node<T, F>(&self, flow_key: &str, node_id: &str, transport_factory: &mut F) -> Result<bool>
    where
        T: Transport,
        F: for<'fk, 'sid> FnMut(&'fk str, &'sid str) -> T,
    {
        let prompt = format!("Resolve the failure that triggered the detour to '{node_id}', then report status.");
        let transport = transport_factory(flow_key, node_id);
        let mut session = StepSession::new(&self.run_id, flow_key, node_id, transport);
        session.work(&prompt, None).await?;
        let envelope: HandoffEnvelope = session.finalize(&envelope_schema(), &prompt).await?;
        Ok(matches!(envelope.status, StepStatus::Succeeded | StepStatus::Verified))
    }

    fn build_receipt<T: Transport>(
        &self,
        flow_key: &str,
        step: &crate::flow_graph::FlowStep,
        envelope: &HandoffEnvelope,
        work_output: &wp_session::WorkOutput,
        session: &StepSession<T>,
        started_at: chrono::DateTime<chrono::Utc>,
        timer: Instant,
    ) -> Receipt {
        Receipt {
            step_id: step.step_id.clone(),
            flow_key: flow_key.to_string(),
            run_id: self.run_id.clone(),
            agent_key: format!("{flow_key}:{}", step.step_id),
            status: format!("{:?}", envelope.status).to_lowercase(),
            started_at,
            completed_at: chrono::Utc::now(),
            tool_calls: work_output.events.iter().filter_map(|e| serde_json::from_value::<NormalizedToolCall>(e.clone()).ok()).collect(),
            transport_source: if session.capabilities().output_format { "structured" } else { "microloop" }.to_string(),
            duration_ms: timer.elapsed().as_millis() as u64,
        }
    }

    fn record_decision(
        &self,
        flow_key: &str,
        step_id: &str,
        candidate: &RoutingCandidate,
        iteration: u32,
        exit_reason: Option<ExitReason>,
    ) -> Result<()> {
        self.audit_trail.record(RoutingDecision {
            timestamp: chrono::Utc::now(),
            run_id: self.run_id.clone(),
            flow_key: flow_key.to_string(),
            step_id: step_id.to_string(),
            decision: decision_kind_for(candidate.action),
            reason: candidate.reason.clone(),
            confidence: confidence_for_priority(candidate.priority),
            agent_key: None,
            detour_target: candidate.target_node.clone(),
            injected_flow: (candidate.action == RoutingAction::InjectFlow)
                .then(|| candidate.candidate_id.strip_prefix("inject_flow:").unwrap_or(&candidate.candidate_id).to_string()),
            injected_nodes: Vec::new(),
            forensic_summary: exit_reason.map(|r| r.code().to_string()),
            iteration: Some(iteration),
            signature_matched: candidate.candidate_id.strip_prefix("detour:").map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wp_session::StubTransport;
    use wp_workspace::PlainWorkspace;

    fn envelope_response(step_id: &str, flow_key: &str, status: &str, summary: &str) -> String {
        serde_json::json!({
            "step_id": step_id, "flow_key": flow_key, "run_id": "r1",
            "status": status, "summary": summary
        })
        .to_string()
    }

    #[tokio::test]
    async fn fresh_run_chains_through_every_flow_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = RunEngine::open(dir.path(), "r1", "ship it", Config::default()).unwrap();
        let workspace = PlainWorkspace::new(dir.path().join("ws"));
        let cancel = CancellationToken::new();

        let state = engine
            .run::<StubTransport, _>(
                "signal",
                &workspace,
                None,
                |fk, step_id| StubTransport::structured(serde_json::from_str(&envelope_response(step_id, fk, "succeeded", "done")).unwrap()),
                &cancel,
                None,
            )
            .await
            .unwrap();

        assert_eq!(state.status, RunStatus::Succeeded);
        assert!(state.flow_transition_history.iter().any(|t| t.to_flow == "wisdom"));
    }

    #[tokio::test]
    async fn canceled_run_stops_instead_of_completing() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = RunEngine::open(dir.path(), "r1", "ship it", Config::default()).unwrap();
        let workspace = PlainWorkspace::new(dir.path().join("ws"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let state = engine
            .run::<StubTransport, _>(
                "plan",
                &workspace,
                None,
                |_, step_id| StubTransport::scripted(vec![envelope_response(step_id, "plan", "verified", "x")]),
                &cancel,
                None,
            )
            .await
            .unwrap();

        assert_eq!(state.status, RunStatus::Stopped);
    }

    #[tokio::test]
    async fn resuming_after_a_completed_step_continues_at_the_next_index() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let workspace = PlainWorkspace::new(dir.path().join("ws"));

        {
            let mut engine = RunEngine::open(dir.path(), "r1", "ship it", Config::default()).unwrap();
            engine
                .run::<StubTransport, _>(
                    "signal",
                    &workspace,
                    None,
                    |_, step_id| StubTransport::scripted(vec![envelope_response(step_id, "signal", "succeeded", "ok")]),
                    &cancel,
                    None,
                )
                .await
                .unwrap();
        }

        let engine = RunEngine::open(dir.path(), "r1", "ship it", Config::default()).unwrap();
        let state = engine.state().unwrap();
        assert_eq!(state.status, RunStatus::Succeeded);
    }

    #[tokio::test]
    async fn unknown_flow_key_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = RunEngine::open(dir.path(), "r1", "ship it", Config::default()).unwrap();
        let workspace = PlainWorkspace::new(dir.path().join("ws"));
        let cancel = CancellationToken::new();
        let result = engine.run::<StubTransport, _>("not-a-flow", &workspace, None, |_, _| StubTransport::scripted(vec![]), &cancel, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn a_terminal_run_is_returned_unchanged_rather_than_redriven() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let workspace = PlainWorkspace::new(dir.path().join("ws"));

        let mut engine = RunEngine::open(dir.path(), "r1", "ship it", Config::default()).unwrap();
        engine
            .run::<StubTransport, _>(
                "signal",
                &workspace,
                None,
                |fk, step_id| StubTransport::structured(serde_json::from_str(&envelope_response(step_id, fk, "succeeded", "done")).unwrap()),
                &cancel,
                None,
            )
            .await
            .unwrap();

        let before = engine.state().unwrap();
        let after = engine
            .run::<StubTransport, _>("signal", &workspace, None, |_, _| StubTransport::scripted(vec![]), &cancel, None)
            .await
            .unwrap();
        assert_eq!(before.comparable(), after.comparable());
    }
}
