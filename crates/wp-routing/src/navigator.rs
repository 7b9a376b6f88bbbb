//! Navigator integration: the Navigator is advisory — it picks from
//! a bounded menu of candidates the kernel already built, it never invents
//! a new one. This module is the engine-side guard that enforces that.

use wp_domain::RoutingCandidate;

#[derive(Debug, Clone)]
pub struct NavigatorChoice {
    pub candidate_id: String,
    pub rationale: String,
}

#[derive(Debug)]
pub enum NavigatorValidationError {
    /// The Navigator named a `candidate_id` absent from the offered menu.
    UnknownCandidate { candidate_id: String },
    /// The menu offered nothing to choose from.
    EmptyMenu,
}

impl std::fmt::Display for NavigatorValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NavigatorValidationError::UnknownCandidate { candidate_id } => {
                write!(f, "navigator chose unknown candidate '{candidate_id}'; it is not in the offered menu")
            }
            NavigatorValidationError::EmptyMenu => write!(f, "no candidates were offered to the navigator"),
        }
    }
}

/// Validate a Navigator's choice against the menu it was actually offered,
/// returning the chosen candidate by reference. The engine must call this
/// before acting on a Navigator's choice — never trust the choice blindly.
pub fn validate_choice<'a>(
    menu: &'a [RoutingCandidate],
    choice: &NavigatorChoice,
) -> Result<&'a RoutingCandidate, NavigatorValidationError> {
    if menu.is_empty() {
        return Err(NavigatorValidationError::EmptyMenu);
    }
    menu.iter().find(|c| c.candidate_id == choice.candidate_id).ok_or_else(|| {
        NavigatorValidationError::UnknownCandidate { candidate_id: choice.candidate_id.clone() }
    })
}

/// The menu's own default candidate, used when no Navigator is attached or
/// the Navigator fails to respond — the kernel always has a safe fallback.
pub fn default_candidate(menu: &[RoutingCandidate]) -> Option<&RoutingCandidate> {
    menu.iter().find(|c| c.is_default).or_else(|| menu.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wp_domain::RoutingAction;

    fn candidate(id: &str, is_default: bool) -> RoutingCandidate {
        RoutingCandidate {
            candidate_id: id.into(),
            action: RoutingAction::Continue,
            target_node: None,
            reason: "test".into(),
            priority: 50,
            source: "test".into(),
            evidence_pointers: Vec::new(),
            is_default,
        }
    }

    #[test]
    fn chosen_candidate_in_menu_validates() {
        let menu = vec![candidate("a", true), candidate("b", false)];
        let choice = NavigatorChoice { candidate_id: "b".into(), rationale: "because".into() };
        let chosen = validate_choice(&menu, &choice).unwrap();
        assert_eq!(chosen.candidate_id, "b");
    }

    #[test]
    fn fabricated_candidate_is_rejected() {
        let menu = vec![candidate("a", true)];
        let choice = NavigatorChoice { candidate_id: "z".into(), rationale: "".into() };
        assert!(matches!(validate_choice(&menu, &choice), Err(NavigatorValidationError::UnknownCandidate { .. })));
    }

    #[test]
    fn empty_menu_is_rejected_before_lookup() {
        let choice = NavigatorChoice { candidate_id: "a".into(), rationale: "".into() };
        assert!(matches!(validate_choice(&[], &choice), Err(NavigatorValidationError::EmptyMenu)));
    }

    #[test]
    fn default_candidate_falls_back_to_first_when_none_marked_default() {
        let menu = vec![candidate("a", false), candidate("b", false)];
        assert_eq!(default_candidate(&menu).unwrap().candidate_id, "a");
    }

    #[test]
    fn default_candidate_prefers_the_marked_default() {
        let menu = vec![candidate("a", false), candidate("b", true)];
        assert_eq!(default_candidate(&menu).unwrap().candidate_id, "b");
    }
}
