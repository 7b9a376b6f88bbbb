//! Detour matcher: maps a recognized failure signature in a step's
//! forensic output to a pre-built detour step, instead of asking an agent
//! to improvise a fix for a problem the kernel has already seen.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use wp_domain::Confidence;

#[derive(Debug, Clone)]
pub struct DetourRule {
    pub signature: &'static str,
    pub pattern: Regex,
    pub target_node: &'static str,
    pub confidence: Confidence,
}

fn rule(signature: &'static str, pattern: &str, target_node: &'static str, confidence: Confidence) -> DetourRule {
    DetourRule { signature, pattern: Regex::new(pattern).expect("detour pattern is valid"), target_node, confidence }
}

fn rules() -> &'static [DetourRule] {
    static RULES: OnceLock<Vec<DetourRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            rule(
                "lint_errors",
                r"(?i)\b(lint|eslint|clippy|ruff)\b.*\b(error|warning)s?\b",
                "auto-linter",
                Confidence::High,
            ),
            rule(
                "missing_import",
                r"(?i)(ModuleNotFoundError|cannot find (crate|module|value|function)|unresolved import|ImportError)",
                "import-fixer",
                Confidence::High,
            ),
            rule(
                "type_mismatch",
                r"(?i)(type mismatch|mismatched types|expected .* found|TypeError:)",
                "type-annotator",
                Confidence::Medium,
            ),
            rule(
                "test_fixture_missing",
                r"(?i)(fixture .* not found|no such fixture|missing test fixture)",
                "test-setup",
                Confidence::Medium,
            ),
            rule(
                "upstream_diverged",
                r"(?i)(upstream.*diverged|non-fast-forward|behind .* upstream)",
                "reset",
                Confidence::High,
            ),
        ]
    })
}

#[derive(Debug, Clone)]
pub struct DetourMatch {
    pub signature: String,
    pub target_node: String,
    pub confidence: Confidence,
    pub matched_text: String,
    pub attempt_number: u32,
    pub max_attempts: u32,
    /// The step to resume once the detour completes.
    pub return_to: String,
}

pub struct DetourMatcher {
    attempts: HashMap<(String, String), u32>,
    max_attempts_per_signature: u32,
}

impl DetourMatcher {
    pub fn new(max_attempts_per_signature: u32) -> Self {
        Self { attempts: HashMap::new(), max_attempts_per_signature }
    }

    /// Find the first matching rule for this step's forensic text. Returns
    /// `None` once a (step_id, signature) pair has already been detoured
    /// `max_attempts_per_signature` times, so a recurring failure escalates
    /// instead of looping through the same detour forever.
    pub fn match_forensics(&mut self, step_id: &str, forensics: &str) -> Option<DetourMatch> {
        for rule in rules() {
            if let Some(found) = rule.pattern.find(forensics) {
                let key = (step_id.to_string(), rule.signature.to_string());
                let count = self.attempts.entry(key).or_insert(0);
                if *count >= self.max_attempts_per_signature {
                    tracing::warn!(step_id, signature = rule.signature, attempts = *count, "detour attempt budget exhausted");
                    return None;
                }
                *count += 1;
                return Some(DetourMatch {
                    signature: rule.signature.to_string(),
                    target_node: rule.target_node.to_string(),
                    confidence: rule.confidence,
                    matched_text: found.as_str().to_string(),
                    attempt_number: *count,
                    max_attempts: self.max_attempts_per_signature,
                    return_to: step_id.to_string(),
                });
            }
        }
        None
    }

    pub fn attempts_for(&self, step_id: &str, signature: &str) -> u32 {
        self.attempts.get(&(step_id.to_string(), signature.to_string())).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_lint_errors() {
        let mut matcher = DetourMatcher::new(3);
        let m = matcher.match_forensics("step-1", "ruff found 4 lint errors in src/main.rs").unwrap();
        assert_eq!(m.signature, "lint_errors");
        assert_eq!(m.target_node, "auto-linter");
    }

    #[test]
    fn matches_upstream_diverged() {
        let mut matcher = DetourMatcher::new(3);
        let m = matcher.match_forensics("step-2", "branch has diverged from upstream").unwrap();
        assert_eq!(m.target_node, "reset");
        assert_eq!(m.confidence, Confidence::High);
    }

    #[test]
    fn unrecognized_text_does_not_match() {
        let mut matcher = DetourMatcher::new(3);
        assert!(matcher.match_forensics("step-1", "the server responded with 200 OK").is_none());
    }

    #[test]
    fn exhausting_attempts_for_a_signature_stops_matching() {
        let mut matcher = DetourMatcher::new(2);
        assert!(matcher.match_forensics("step-1", "missing import: ModuleNotFoundError").is_some());
        assert!(matcher.match_forensics("step-1", "missing import: ModuleNotFoundError").is_some());
        assert!(matcher.match_forensics("step-1", "missing import: ModuleNotFoundError").is_none());
    }

    #[test]
    fn attempts_are_scoped_per_step() {
        let mut matcher = DetourMatcher::new(1);
        assert!(matcher.match_forensics("step-1", "TypeError: mismatched types").is_some());
        assert!(matcher.match_forensics("step-2", "TypeError: mismatched types").is_some());
    }
}
