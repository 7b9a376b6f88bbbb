//! Utility flow injector: whole-flow injection when a run-level
//! trigger fires (e.g. the shadow-fork branch fell behind its upstream),
//! rather than a single detour step.

use wp_domain::{Error, Result, RoutingAction, RoutingCandidate};

#[derive(Debug, Clone, Copy, Default)]
pub struct GitDivergence {
    pub diverged: bool,
    pub behind_count: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct UtilityTrigger {
    pub trigger_type: &'static str,
    pub flow_id: &'static str,
    pub first_node_id: &'static str,
    pub priority: u8,
    pub behind_count: u32,
}

/// Evaluate the built-in `upstream_diverged` trigger against observed git
/// status. `repo_root_present` controls the strict-mode precondition: a
/// caller with no resolvable `repo_root` and `strict_repo_root` set gets an
/// error rather than silently skipping the check; without strict mode,
/// missing repo context is a safe no-trigger rather than a failure.
pub fn detect_upstream_diverged(
    repo_root_present: bool,
    strict_repo_root: bool,
    git_status: GitDivergence,
) -> Result<Option<UtilityTrigger>> {
    if !repo_root_present {
        return if strict_repo_root {
            Err(Error::Config("STRICT_REPO_ROOT is set but no repo_root could be resolved".to_string()))
        } else {
            Ok(None)
        };
    }

    if git_status.diverged || git_status.behind_count > 0 {
        Ok(Some(UtilityTrigger {
            trigger_type: "upstream_diverged",
            flow_id: "reset",
            first_node_id: "reset-1",
            priority: 90,
            behind_count: git_status.behind_count,
        }))
    } else {
        Ok(None)
    }
}

/// Build the `inject_flow:<id>` candidate for a detected trigger. Utility
/// candidates are always appended to the menu and never marked default.
pub fn candidate_for(trigger: &UtilityTrigger) -> RoutingCandidate {
    RoutingCandidate {
        candidate_id: format!("inject_flow:{}", trigger.flow_id),
        action: RoutingAction::InjectFlow,
        target_node: Some(trigger.first_node_id.to_string()),
        reason: format!(
            "{} detected ({} commit(s) behind upstream)",
            trigger.trigger_type, trigger.behind_count
        ),
        priority: trigger.priority,
        source: "utility_flow_detector".to_string(),
        evidence_pointers: vec![
            format!("trigger:{}", trigger.trigger_type),
            format!("git_status:behind_count={}", trigger.behind_count),
        ],
        is_default: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_upstream_does_not_trigger() {
        let trigger = detect_upstream_diverged(true, false, GitDivergence::default()).unwrap();
        assert!(trigger.is_none());
    }

    #[test]
    fn behind_count_triggers_reset_flow() {
        let trigger = detect_upstream_diverged(true, false, GitDivergence { diverged: false, behind_count: 3 })
            .unwrap()
            .unwrap();
        assert_eq!(trigger.flow_id, "reset");
        let candidate = candidate_for(&trigger);
        assert_eq!(candidate.candidate_id, "inject_flow:reset");
        assert!(!candidate.is_default);
    }

    #[test]
    fn missing_repo_root_without_strict_mode_is_a_safe_no_trigger() {
        let trigger = detect_upstream_diverged(false, false, GitDivergence { diverged: true, behind_count: 1 }).unwrap();
        assert!(trigger.is_none());
    }

    #[test]
    fn missing_repo_root_with_strict_mode_errors() {
        let result = detect_upstream_diverged(false, true, GitDivergence::default());
        assert!(result.is_err());
    }
}
