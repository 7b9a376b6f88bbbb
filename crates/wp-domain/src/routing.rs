//! Shared routing vocabulary: candidates, decisions, confidence, violations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingAction {
    Continue,
    Loop,
    Detour,
    InjectFlow,
    Escalate,
    Terminate,
}

/// One candidate in the bounded menu offered to the Navigator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingCandidate {
    pub candidate_id: String,
    pub action: RoutingAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_node: Option<String>,
    pub reason: String,
    pub priority: u8,
    pub source: String,
    #[serde(default)]
    pub evidence_pointers: Vec<String>,
    pub is_default: bool,
}

/// The single vocabulary used everywhere a routing decision is recorded:
/// the audit trail, the engine's applied action, and the mapping of
/// Navigator intents. Settles on one closed enum instead of two competing
/// decision vocabularies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingDecisionKind {
    Continue,
    Loop,
    Detour,
    InjectFlow,
    InjectNodes,
    Escalate,
    Terminate,
    ExtendGraph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// A single logged routing decision. `CONTINUE` on the golden path
/// is constructed but never logged by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub flow_key: String,
    pub step_id: String,
    pub decision: RoutingDecisionKind,
    pub reason: String,
    pub confidence: Confidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detour_target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub injected_flow: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub injected_nodes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forensic_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_matched: Option<String>,
}

/// Normalize the source's string-or-bool `can_further_iteration_help` field.
/// `None` means "assume help is possible".
pub fn normalize_tribool(value: Option<&str>) -> Option<bool> {
    match value.map(|s| s.trim().to_ascii_lowercase()) {
        Some(s) if s == "yes" || s == "true" => Some(true),
        Some(s) if s == "no" || s == "false" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationSeverity {
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationType {
    WriteOutsideWorkspace,
    RealRepoModification,
    MainBranchMutation,
    SecretExposure,
    ForceOperation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    pub severity: ViolationSeverity,
    pub path: String,
    pub operation: String,
    pub detail: String,
    pub step_id: String,
    pub timestamp: DateTime<Utc>,
    pub remediation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tribool_normalizes_yes_no_variants() {
        assert_eq!(normalize_tribool(Some("yes")), Some(true));
        assert_eq!(normalize_tribool(Some("TRUE")), Some(true));
        assert_eq!(normalize_tribool(Some("no")), Some(false));
        assert_eq!(normalize_tribool(Some("False")), Some(false));
        assert_eq!(normalize_tribool(None), None);
        assert_eq!(normalize_tribool(Some("maybe")), None);
    }

    #[test]
    fn utility_candidate_is_never_default() {
        let candidate = RoutingCandidate {
            candidate_id: "inject_flow:reset".into(),
            action: RoutingAction::InjectFlow,
            target_node: Some("reset-1".into()),
            reason: "upstream diverged".into(),
            priority: 90,
            source: "utility_flow_detector".into(),
            evidence_pointers: vec!["trigger:upstream_diverged".into()],
            is_default: false,
        };
        assert!(!candidate.is_default);
    }
}
