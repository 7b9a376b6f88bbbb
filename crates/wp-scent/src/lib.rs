//! Scent trail: a run-scoped, mostly-append-only record of
//! decisions, assumptions, open questions and conflicts, so later steps
//! don't re-litigate settled questions and an operator can answer "how did
//! we get here". Decisions, open questions, and conflicts are append-only;
//! assumptions mutate only their `status`.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wp_domain::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub step_id: String,
    pub summary: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssumptionStatus {
    Active,
    Validated,
    Invalidated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assumption {
    pub id: String,
    pub step_id: String,
    pub summary: String,
    pub status: AssumptionStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenQuestion {
    pub id: String,
    pub step_id: String,
    pub question: String,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub step_id: String,
    pub description: String,
    pub resolved: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScentTrail {
    pub run_id: String,
    pub flow_objective: String,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub assumptions_in_effect: Vec<Assumption>,
    #[serde(default)]
    pub open_questions: Vec<OpenQuestion>,
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
}

/// Words whose presence alongside topic overlap suggest a new decision
/// disagrees with a prior one rather than merely restating it.
const NEGATION_VOCABULARY: &[&str] = &["not", "no", "don't", "won't", "instead", "rather", "reject"];

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn word_overlap(a: &str, b: &str) -> bool {
    let words_a: std::collections::HashSet<String> =
        a.to_ascii_lowercase().split_whitespace().map(str::to_string).collect();
    b.to_ascii_lowercase().split_whitespace().any(|w| words_a.contains(w))
}

impl ScentTrail {
    pub fn new(run_id: impl Into<String>, flow_objective: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            flow_objective: flow_objective.into(),
            decisions: Vec::new(),
            assumptions_in_effect: Vec::new(),
            open_questions: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn add_decision(&mut self, step_id: impl Into<String>, summary: impl Into<String>) -> &Decision {
        let decision = Decision { id: new_id(), step_id: step_id.into(), summary: summary.into(), at: Utc::now() };
        self.decisions.push(decision);
        self.decisions.last().unwrap()
    }

    /// Advisory, not blocking: prior decisions whose summary shares a
    /// word with `summary` *and* contains a negation-vocabulary term,
    /// suggesting disagreement. The caller decides whether to actually
    /// record a [`Conflict`] via [`Self::add_conflict`].
    pub fn potential_conflicts(&self, summary: &str) -> Vec<&Decision> {
        self.decisions
            .iter()
            .filter(|d| {
                word_overlap(&d.summary, summary)
                    && NEGATION_VOCABULARY.iter().any(|neg| {
                        summary.to_ascii_lowercase().split_whitespace().any(|w| w == *neg)
                            || d.summary.to_ascii_lowercase().split_whitespace().any(|w| w == *neg)
                    })
            })
            .collect()
    }

    pub fn add_assumption(&mut self, step_id: impl Into<String>, summary: impl Into<String>) -> String {
        let id = new_id();
        self.assumptions_in_effect.push(Assumption {
            id: id.clone(),
            step_id: step_id.into(),
            summary: summary.into(),
            status: AssumptionStatus::Active,
            at: Utc::now(),
        });
        id
    }

    pub fn validate_assumption(&mut self, id: &str) -> Result<()> {
        self.set_assumption_status(id, AssumptionStatus::Validated)
    }

    pub fn invalidate_assumption(&mut self, id: &str) -> Result<()> {
        self.set_assumption_status(id, AssumptionStatus::Invalidated)
    }

    fn set_assumption_status(&mut self, id: &str, status: AssumptionStatus) -> Result<()> {
        let assumption = self
            .assumptions_in_effect
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::NotFound(format!("assumption '{id}' not found")))?;
        assumption.status = status;
        Ok(())
    }

    pub fn add_open_question(&mut self, step_id: impl Into<String>, question: impl Into<String>) -> String {
        let id = new_id();
        self.open_questions.push(OpenQuestion {
            id: id.clone(),
            step_id: step_id.into(),
            question: question.into(),
            resolved: false,
            resolution: None,
            at: Utc::now(),
        });
        id
    }

    pub fn resolve_open_question(&mut self, id: &str, resolution: impl Into<String>) -> Result<()> {
        let question = self
            .open_questions
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or_else(|| Error::NotFound(format!("open question '{id}' not found")))?;
        question.resolved = true;
        question.resolution = Some(resolution.into());
        Ok(())
    }

    pub fn add_conflict(&mut self, step_id: impl Into<String>, description: impl Into<String>) -> String {
        let id = new_id();
        self.conflicts.push(Conflict { id: id.clone(), step_id: step_id.into(), description: description.into(), resolved: false, at: Utc::now() });
        id
    }

    pub fn resolve_conflict(&mut self, id: &str) -> Result<()> {
        let conflict = self
            .conflicts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("conflict '{id}' not found")))?;
        conflict.resolved = true;
        Ok(())
    }

    /// A compact markdown digest for injection into the next step's context
    /// pack. `max_chars` bounds it roughly (it's fed into [`wp_budget`]'s
    /// own tokenizer upstream, so this is a coarse pre-trim, not the final
    /// word).
    pub fn to_markdown_summary(&self, max_chars: usize) -> String {
        let mut out = format!("## Scent trail for {}\n\nObjective: {}\n\n", self.run_id, self.flow_objective);

        if !self.decisions.is_empty() {
            out.push_str("### Decisions\n");
            for d in &self.decisions {
                out.push_str(&format!("- {}\n", d.summary));
            }
        }

        let active: Vec<&Assumption> = self.assumptions_in_effect.iter().filter(|a| a.status == AssumptionStatus::Active).collect();
        if !active.is_empty() {
            out.push_str("\n### Active assumptions\n");
            for a in active {
                out.push_str(&format!("- {}\n", a.summary));
            }
        }

        let open: Vec<&OpenQuestion> = self.open_questions.iter().filter(|q| !q.resolved).collect();
        if !open.is_empty() {
            out.push_str("\n### Open questions\n");
            for q in open {
                out.push_str(&format!("- {}\n", q.question));
            }
        }

        let unresolved: Vec<&Conflict> = self.conflicts.iter().filter(|c| !c.resolved).collect();
        if !unresolved.is_empty() {
            out.push_str("\n### Unresolved conflicts\n");
            for c in unresolved {
                out.push_str(&format!("- {}\n", c.description));
            }
        }

        if out.len() <= max_chars {
            return out;
        }
        let mut boundary = max_chars.min(out.len());
        while boundary > 0 && !out.is_char_boundary(boundary) {
            boundary -= 1;
        }
        format!("{}\n\n... [TRUNCATED]", &out[..boundary])
    }
}
