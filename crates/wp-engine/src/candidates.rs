//! Candidate-menu assembly: the bounded set of
//! routing options offered to the exit predicate / Navigator for one step,
//! combining the deterministic default, a detour match, the sidequest
//! catalog, and any utility-flow trigger. Nothing here invents an option
//! the individual subsystems didn't already produce.

use wp_domain::{RoutingAction, RoutingCandidate};
use wp_routing::{candidate_for, DetourMatcher, SidequestCatalog, TriggerContext, UtilityTrigger};

pub struct CandidateInputs<'a> {
    pub step_id: &'a str,
    pub forensics: Option<&'a str>,
    pub sidequest_ctx: &'a TriggerContext,
    pub utility_trigger: Option<&'a UtilityTrigger>,
}

/// Always includes one `continue` candidate marked `is_default`, so a
/// Navigator failure or an empty everything-else menu still has a safe
/// fallback.
pub fn build_candidates(
    inputs: CandidateInputs,
    detour_matcher: &mut DetourMatcher,
    sidequest_catalog: &SidequestCatalog,
    run_id: &str,
) -> Vec<RoutingCandidate> {
    let mut candidates = vec![RoutingCandidate {
        candidate_id: "continue".to_string(),
        action: RoutingAction::Continue,
        target_node: None,
        reason: "deterministic default: proceed to the next step".to_string(),
        priority: 10,
        source: "deterministic".to_string(),
        evidence_pointers: Vec::new(),
        is_default: true,
    }];

    if let Some(forensics) = inputs.forensics {
        if let Some(detour) = detour_matcher.match_forensics(inputs.step_id, forensics) {
            candidates.push(RoutingCandidate {
                candidate_id: format!("detour:{}", detour.signature),
                action: RoutingAction::Detour,
                target_node: Some(detour.target_node.clone()),
                reason: format!("matched failure signature '{}'", detour.signature),
                priority: 80,
                source: "detour_matcher".to_string(),
                evidence_pointers: vec![format!("matched_text:{}", detour.matched_text)],
                is_default: false,
            });
        }
    }

    candidates.extend(sidequest_catalog.evaluate_triggers(run_id, inputs.sidequest_ctx));

    if let Some(trigger) = inputs.utility_trigger {
        candidates.push(candidate_for(trigger));
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_step_offers_only_the_default_candidate() {
        let mut detours = DetourMatcher::new(3);
        let sidequests = SidequestCatalog::default_catalog();
        let ctx = TriggerContext::default();
        let candidates = build_candidates(
            CandidateInputs { step_id: "step-0", forensics: None, sidequest_ctx: &ctx, utility_trigger: None },
            &mut detours,
            &sidequests,
            "r1",
        );
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].is_default);
    }

    #[test]
    fn matched_forensics_add_a_detour_candidate() {
        let mut detours = DetourMatcher::new(3);
        let sidequests = SidequestCatalog::default_catalog();
        let ctx = TriggerContext::default();
        let candidates = build_candidates(
            CandidateInputs {
                step_id: "step-0",
                forensics: Some("ruff reported 3 lint errors"),
                sidequest_ctx: &ctx,
                utility_trigger: None,
            },
            &mut detours,
            &sidequests,
            "r1",
        );
        assert!(candidates.iter().any(|c| c.candidate_id == "detour:lint_errors"));
        // exactly one candidate stays marked default even with more on the menu.
        assert_eq!(candidates.iter().filter(|c| c.is_default).count(), 1);
    }
}
