//! The Elephant Protocol: progress is the derivative, not the budget.
//! Identical consecutive error signatures mean zero velocity — stalled.
//! Changing signatures mean the microloop is still making progress, however
//! slowly.

use serde::{Deserialize, Serialize};

use crate::signature::compute_error_signature;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StallInfo {
    pub is_stalled: bool,
    pub repeated_signature: Option<String>,
    pub repeat_count: u32,
    pub iterations_recorded: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Continue,
    Investigate,
    Escalate,
}

pub struct ProgressTracker {
    stall_threshold: u32,
    signatures: Vec<String>,
}

impl ProgressTracker {
    pub fn new(stall_threshold: u32) -> Self {
        Self { stall_threshold, signatures: Vec::new() }
    }

    /// Record one iteration's raw error/output text, normalizing it to a
    /// signature before storing.
    pub fn record_iteration(&mut self, raw_output: &str) -> String {
        let signature = compute_error_signature(raw_output);
        self.signatures.push(signature.clone());
        signature
    }

    /// Record a successful iteration. Stores a signature distinct from any
    /// error signature it could collide with, so a prior stall streak is
    /// broken the moment progress actually lands.
    pub fn record_success(&mut self, iteration: u32) -> String {
        let signature = format!("SUCCESS_{iteration}");
        self.signatures.push(signature.clone());
        signature
    }

    /// Stalled when the most recent `stall_threshold` signatures are all
    /// identical. Fewer recorded iterations than the threshold is never a
    /// stall.
    pub fn is_stalled(&self) -> bool {
        let threshold = self.stall_threshold as usize;
        if self.signatures.len() < threshold || threshold == 0 {
            return false;
        }
        let tail = &self.signatures[self.signatures.len() - threshold..];
        tail.windows(2).all(|pair| pair[0] == pair[1])
    }

    /// How many trailing iterations share the current (most recent)
    /// signature — used against the `2 * stall_threshold` escalation
    /// trigger independent of `is_stalled`'s fixed window.
    pub fn stall_count(&self) -> u32 {
        match self.signatures.last() {
            None => 0,
            Some(last) => self.signatures.iter().rev().take_while(|s| *s == last).count() as u32,
        }
    }

    /// Fraction of unique signatures within the trailing window of
    /// `min(len, stall_threshold)` iterations — the velocity is a *recent*
    /// measure, not a whole-run average, so an old burst of variety doesn't
    /// mask a stall that set in later.
    pub fn velocity(&self) -> f64 {
        if self.signatures.is_empty() {
            return 1.0;
        }
        let window = (self.stall_threshold as usize).min(self.signatures.len()).max(1);
        let tail = &self.signatures[self.signatures.len() - window..];
        let unique: std::collections::HashSet<&String> = tail.iter().collect();
        unique.len() as f64 / window as f64
    }

    pub fn stall_info(&self) -> StallInfo {
        let (repeated_signature, repeat_count) = if self.signatures.is_empty() {
            (None, 0)
        } else {
            let last = self.signatures.last().unwrap();
            let count = self.signatures.iter().rev().take_while(|s| *s == last).count() as u32;
            (Some(last.clone()), count)
        };
        StallInfo {
            is_stalled: self.is_stalled(),
            repeated_signature,
            repeat_count,
            iterations_recorded: self.signatures.len() as u32,
        }
    }

    /// `continue` on the golden path, `investigate` once stalled, `escalate`
    /// once the stall has run twice as long as the threshold that first
    /// flagged it.
    pub fn recommendation(&self) -> Recommendation {
        if self.stall_count() >= 2 * self.stall_threshold {
            Recommendation::Escalate
        } else if self.is_stalled() {
            Recommendation::Investigate
        } else {
            Recommendation::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_stalled_with_too_few_iterations() {
        let mut tracker = ProgressTracker::new(3);
        tracker.record_iteration("err A");
        tracker.record_iteration("err A");
        assert!(!tracker.is_stalled());
    }

    #[test]
    fn stalled_after_threshold_identical_signatures() {
        let mut tracker = ProgressTracker::new(3);
        for _ in 0..3 {
            tracker.record_iteration("TypeError: same thing");
        }
        assert!(tracker.is_stalled());
        assert_eq!(tracker.recommendation(), Recommendation::Investigate);
    }

    #[test]
    fn changing_errors_are_not_stalled() {
        let mut tracker = ProgressTracker::new(3);
        tracker.record_iteration("err A");
        tracker.record_iteration("err B");
        tracker.record_iteration("err C");
        assert!(!tracker.is_stalled());
        assert_eq!(tracker.velocity(), 1.0);
        assert_eq!(tracker.recommendation(), Recommendation::Continue);
    }

    #[test]
    fn velocity_is_windowed_to_the_threshold_not_the_whole_history() {
        let mut tracker = ProgressTracker::new(2);
        tracker.record_iteration("err A");
        tracker.record_iteration("err B");
        tracker.record_iteration("err C");
        tracker.record_iteration("err C");
        // window is the last 2: [C, C] -> 1 unique / 2 = 0.5, not 3/4 over the whole history.
        assert_eq!(tracker.velocity(), 0.5);
    }

    #[test]
    fn stall_info_reports_repeat_count() {
        let mut tracker = ProgressTracker::new(2);
        tracker.record_iteration("err A");
        tracker.record_iteration("err A");
        let info = tracker.stall_info();
        assert!(info.is_stalled);
        assert_eq!(info.repeat_count, 2);
    }

    #[test]
    fn escalates_once_stall_runs_twice_the_threshold() {
        let mut tracker = ProgressTracker::new(2);
        for _ in 0..4 {
            tracker.record_iteration("same error every time");
        }
        assert_eq!(tracker.recommendation(), Recommendation::Escalate);
    }

    #[test]
    fn a_recorded_success_breaks_the_stall() {
        let mut tracker = ProgressTracker::new(2);
        tracker.record_iteration("same error");
        tracker.record_iteration("same error");
        assert!(tracker.is_stalled());
        tracker.record_success(3);
        assert!(!tracker.is_stalled());
        assert_eq!(tracker.recommendation(), Recommendation::Continue);
    }
}
