//! Sidequest catalog: a declarative registry of trigger-conditioned
//! routing candidates, evaluated against a run's observable signals to
//! build the bounded menu offered to the Navigator.

use std::collections::HashMap;
use wp_domain::{RoutingAction, RoutingCandidate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Equals,
    NotEquals,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Num(f64),
    Bool(bool),
}

#[derive(Debug, Clone)]
pub enum Trigger {
    FieldCheck { field: String, op: FieldOp, value: FieldValue },
    Stall,
    PathPattern { glob: String },
    IterationCount { gte: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    Any,
    All,
}

#[derive(Debug, Clone, Default)]
pub struct TriggerContext {
    pub fields: HashMap<String, FieldValue>,
    pub stall_signals_is_stalled: bool,
    pub changed_paths: Vec<String>,
    pub iteration: u32,
}

fn matches_field(op: FieldOp, actual: &FieldValue, expected: &FieldValue) -> bool {
    match op {
        FieldOp::Equals => actual == expected,
        FieldOp::NotEquals => actual != expected,
        FieldOp::Contains => match (actual, expected) {
            (FieldValue::Str(a), FieldValue::Str(b)) => a.contains(b.as_str()),
            _ => false,
        },
        FieldOp::Gt | FieldOp::Lt | FieldOp::Gte | FieldOp::Lte => match (actual, expected) {
            (FieldValue::Num(a), FieldValue::Num(b)) => match op {
                FieldOp::Gt => a > b,
                FieldOp::Lt => a < b,
                FieldOp::Gte => a >= b,
                FieldOp::Lte => a <= b,
                _ => unreachable!(),
            },
            _ => false,
        },
    }
}

fn glob_matches(glob: &str, path: &str) -> bool {
    match glob.split_once('*') {
        None => glob == path,
        Some((prefix, suffix)) => path.starts_with(prefix) && path.ends_with(suffix),
    }
}

fn trigger_fires(trigger: &Trigger, ctx: &TriggerContext) -> bool {
    match trigger {
        Trigger::FieldCheck { field, op, value } => {
            ctx.fields.get(field).is_some_and(|actual| matches_field(*op, actual, value))
        }
        Trigger::Stall => ctx.stall_signals_is_stalled,
        Trigger::PathPattern { glob } => ctx.changed_paths.iter().any(|p| glob_matches(glob, p)),
        Trigger::IterationCount { gte } => ctx.iteration >= *gte,
    }
}

pub struct SidequestDefinition {
    pub id: &'static str,
    pub action: RoutingAction,
    pub target_node: Option<&'static str>,
    pub reason: &'static str,
    pub priority: u8,
    pub triggers: Vec<Trigger>,
    pub trigger_mode: TriggerMode,
    pub max_uses_per_run: u32,
}

impl SidequestDefinition {
    fn applies(&self, ctx: &TriggerContext) -> bool {
        match self.trigger_mode {
            TriggerMode::Any => self.triggers.iter().any(|t| trigger_fires(t, ctx)),
            TriggerMode::All => self.triggers.iter().all(|t| trigger_fires(t, ctx)),
        }
    }
}

pub struct SidequestCatalog {
    entries: Vec<SidequestDefinition>,
    uses: HashMap<(String, String), u32>,
}

impl SidequestCatalog {
    pub fn default_catalog() -> Self {
        Self {
            uses: HashMap::new(),
            entries: vec![
                SidequestDefinition {
                    id: "security_review",
                    action: RoutingAction::Escalate,
                    target_node: None,
                    reason: "step touched security-sensitive paths and needs human review",
                    priority: 95,
                    triggers: vec![Trigger::PathPattern { glob: "*secrets*".into() }, Trigger::PathPattern { glob: "*.pem".into() }],
                    trigger_mode: TriggerMode::Any,
                    max_uses_per_run: 10,
                },
                SidequestDefinition {
                    id: "stall_escalation",
                    action: RoutingAction::Escalate,
                    target_node: None,
                    reason: "repeated identical failures with no progress",
                    priority: 85,
                    triggers: vec![Trigger::Stall],
                    trigger_mode: TriggerMode::Any,
                    max_uses_per_run: 1,
                },
                SidequestDefinition {
                    id: "deep_iteration_checkin",
                    action: RoutingAction::Loop,
                    target_node: None,
                    reason: "many iterations without verification; confirm continued value",
                    priority: 40,
                    triggers: vec![Trigger::IterationCount { gte: 5 }],
                    trigger_mode: TriggerMode::Any,
                    max_uses_per_run: 3,
                },
            ],
        }
        .with_empty_uses()
    }

    fn with_empty_uses(self) -> Self {
        Self { uses: HashMap::new(), ..self }
    }

    /// Sidequests whose triggers satisfy their `trigger_mode` for `ctx` and
    /// haven't exhausted `max_uses_per_run`, sorted by priority descending —
    /// the bounded menu handed to the Navigator.
    pub fn evaluate_triggers(&self, run_id: &str, ctx: &TriggerContext) -> Vec<RoutingCandidate> {
        let mut applicable: Vec<&SidequestDefinition> = self
            .entries
            .iter()
            .filter(|sq| {
                let used = self.uses.get(&(run_id.to_string(), sq.id.to_string())).copied().unwrap_or(0);
                used < sq.max_uses_per_run && sq.applies(ctx)
            })
            .collect();
        applicable.sort_by(|a, b| b.priority.cmp(&a.priority));

        applicable
            .into_iter()
            .map(|sq| RoutingCandidate {
                candidate_id: sq.id.to_string(),
                action: sq.action,
                target_node: sq.target_node.map(str::to_string),
                reason: sq.reason.to_string(),
                priority: sq.priority,
                source: "sidequest_catalog".to_string(),
                evidence_pointers: Vec::new(),
                is_default: false,
            })
            .collect()
    }

    /// Record that a sidequest was chosen and applied, counting against its
    /// `max_uses_per_run` limit.
    pub fn record_use(&mut self, run_id: &str, id: &str) {
        *self.uses.entry((run_id.to_string(), id.to_string())).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_path_triggers_escalation() {
        let catalog = SidequestCatalog::default_catalog();
        let ctx = TriggerContext { changed_paths: vec!["config/secrets.yaml".into()], ..Default::default() };
        let candidates = catalog.evaluate_triggers("r1", &ctx);
        assert!(candidates.iter().any(|c| c.candidate_id == "security_review"));
    }

    #[test]
    fn clean_run_offers_nothing() {
        let catalog = SidequestCatalog::default_catalog();
        let candidates = catalog.evaluate_triggers("r1", &TriggerContext::default());
        assert!(candidates.is_empty());
    }

    #[test]
    fn results_are_sorted_by_priority_descending() {
        let catalog = SidequestCatalog::default_catalog();
        let ctx = TriggerContext {
            stall_signals_is_stalled: true,
            changed_paths: vec!["x.pem".into()],
            ..Default::default()
        };
        let candidates = catalog.evaluate_triggers("r1", &ctx);
        assert_eq!(candidates[0].candidate_id, "security_review");
        assert_eq!(candidates[1].candidate_id, "stall_escalation");
    }

    #[test]
    fn exhausting_max_uses_per_run_removes_it_from_the_menu() {
        let mut catalog = SidequestCatalog::default_catalog();
        catalog.record_use("r1", "stall_escalation");
        let ctx = TriggerContext { stall_signals_is_stalled: true, ..Default::default() };
        let candidates = catalog.evaluate_triggers("r1", &ctx);
        assert!(!candidates.iter().any(|c| c.candidate_id == "stall_escalation"));
    }

    #[test]
    fn usage_is_scoped_per_run() {
        let mut catalog = SidequestCatalog::default_catalog();
        catalog.record_use("r1", "stall_escalation");
        let ctx = TriggerContext { stall_signals_is_stalled: true, ..Default::default() };
        let candidates = catalog.evaluate_triggers("r2", &ctx);
        assert!(candidates.iter().any(|c| c.candidate_id == "stall_escalation"));
    }
}
