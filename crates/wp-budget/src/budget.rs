//! Priority-ranked context budget enforcement: every piece of
//! context a step's Work phase would receive is tagged with a priority
//! tier, and the tier decides what happens when the total would exceed the
//! run's token budget — CRITICAL is never dropped, HIGH may be truncated to
//! fit, MEDIUM and LOW are all-or-nothing.

use serde::{Deserialize, Serialize};

use crate::tokenizer::{ApproxTokenizer, Tokenizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    pub key: String,
    pub content: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetedItem {
    pub key: String,
    pub content: String,
    pub priority: Priority,
    pub truncated: bool,
    pub dropped: bool,
    pub estimated_tokens: u64,
    pub original_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetReport {
    pub budget_tokens: u64,
    pub used_tokens: u64,
    pub overflowed: bool,
    pub items: Vec<BudgetedItem>,
}

impl BudgetReport {
    pub fn loaded(&self) -> impl Iterator<Item = &BudgetedItem> {
        self.items.iter().filter(|i| !i.dropped)
    }

    pub fn dropped(&self) -> impl Iterator<Item = &BudgetedItem> {
        self.items.iter().filter(|i| i.dropped)
    }

    pub fn truncated_count(&self) -> usize {
        self.items.iter().filter(|i| i.truncated).count()
    }

    /// The note surfaced to the agent when anything was dropped or
    /// truncated: `"[CONTEXT_TRUNCATED] Included X of Y items (D dropped,
    /// T truncated, budget: U/B tokens)"`. `None` when nothing overflowed.
    pub fn truncation_note(&self) -> Option<String> {
        if !self.overflowed {
            return None;
        }
        let total = self.items.len();
        let dropped = self.dropped().count();
        let truncated = self.truncated_count();
        let included = total - dropped;
        Some(format!(
            "[CONTEXT_TRUNCATED] Included {included} of {total} items ({dropped} dropped, {truncated} truncated, budget: {}/{} tokens)",
            self.used_tokens, self.budget_tokens
        ))
    }

    /// Overflow record written to `budget_logs/overflow_events.jsonl`.
    pub fn overflow_record(&self) -> serde_json::Value {
        serde_json::json!({
            "requested": self.items.iter().map(|i| i.original_tokens).sum::<u64>(),
            "allowed": self.budget_tokens,
            "loaded": self.loaded().map(|i| serde_json::json!({
                "item": i.key,
                "tokens": i.estimated_tokens,
                "original_tokens": i.original_tokens,
                "priority": i.priority,
                "truncated": i.truncated,
            })).collect::<Vec<_>>(),
            "dropped": self.dropped().map(|i| serde_json::json!({
                "item": i.key,
                "tokens": i.original_tokens,
                "priority": i.priority,
            })).collect::<Vec<_>>(),
        })
    }
}

fn dropped_item(key: String, priority: Priority, original_tokens: u64) -> BudgetedItem {
    BudgetedItem { key, content: String::new(), priority, truncated: false, dropped: true, estimated_tokens: 0, original_tokens }
}

fn included_item(key: String, content: String, priority: Priority, tokens: u64, original_tokens: u64, truncated: bool) -> BudgetedItem {
    BudgetedItem { key, content, priority, truncated, dropped: false, estimated_tokens: tokens, original_tokens }
}

/// Truncate `content` to roughly `budget_tokens` tokens (token ≈ 4 chars),
/// preferring to cut at the last word boundary when that loses no more than
/// 20% of the estimated character budget, then append the truncation
/// marker.
fn truncate_preserving_head(content: &str, budget_tokens: u64) -> String {
    let estimate_chars = (budget_tokens * 4) as usize;
    let mut boundary = estimate_chars.min(content.len());
    while boundary > 0 && !content.is_char_boundary(boundary) {
        boundary -= 1;
    }

    if let Some(word_boundary) = content[..boundary].rfind(char::is_whitespace) {
        if estimate_chars == 0 || word_boundary as f64 >= estimate_chars as f64 * 0.8 {
            boundary = word_boundary;
        }
    }

    format!("{}\n\n... [TRUNCATED]", &content[..boundary])
}

/// Fit `items` into `budget_tokens` per the priority rules:
///
/// - `CRITICAL` is always included in full, even if it alone exceeds the
///   budget.
/// - `HIGH` is included in full if it fits; truncated to the remaining
///   budget if at least 100 tokens remain; dropped otherwise.
/// - `MEDIUM` is included in full if it fits, dropped otherwise — never
///   truncated.
/// - `LOW` is included only if it fits *and* at least 10% of the total
///   budget remains, so a nearly-exhausted budget never spends its last
///   slivers on the lowest tier.
pub fn enforce_budget(items: Vec<ContextItem>, budget_tokens: u64) -> BudgetReport {
    enforce_budget_with(items, budget_tokens, &ApproxTokenizer)
}

pub fn enforce_budget_with(mut items: Vec<ContextItem>, budget_tokens: u64, tokenizer: &dyn Tokenizer) -> BudgetReport {
    items.sort_by(|a, b| b.priority.cmp(&a.priority));

    let mut used: u64 = 0;
    let mut overflowed = false;
    let mut out = Vec::with_capacity(items.len());
    let low_floor = budget_tokens / 10;

    for item in items {
        let tokens = tokenizer.estimate_tokens(&item.content);
        let remaining = budget_tokens.saturating_sub(used);

        match item.priority {
            Priority::Critical => {
                used += tokens;
                out.push(included_item(item.key, item.content, item.priority, tokens, tokens, false));
                if tokens > remaining {
                    overflowed = true;
                }
            }
            Priority::High => {
                if tokens <= remaining {
                    used += tokens;
                    out.push(included_item(item.key, item.content, item.priority, tokens, tokens, false));
                } else {
                    overflowed = true;
                    if remaining >= 100 {
                        let truncated = truncate_preserving_head(&item.content, remaining);
                        let truncated_tokens = tokenizer.estimate_tokens(&truncated);
                        used += truncated_tokens;
                        out.push(included_item(item.key, truncated, item.priority, truncated_tokens, tokens, true));
                    } else {
                        out.push(dropped_item(item.key, item.priority, tokens));
                    }
                }
            }
            Priority::Medium => {
                if tokens <= remaining {
                    used += tokens;
                    out.push(included_item(item.key, item.content, item.priority, tokens, tokens, false));
                } else {
                    overflowed = true;
                    out.push(dropped_item(item.key, item.priority, tokens));
                }
            }
            Priority::Low => {
                if tokens <= remaining && remaining >= low_floor {
                    used += tokens;
                    out.push(included_item(item.key, item.content, item.priority, tokens, tokens, false));
                } else {
                    overflowed = true;
                    out.push(dropped_item(item.key, item.priority, tokens));
                }
            }
        }
    }

    BudgetReport { budget_tokens, used_tokens: used, overflowed, items: out }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(key: &str, content: &str, priority: Priority) -> ContextItem {
        ContextItem { key: key.into(), content: content.into(), priority }
    }

    #[test]
    fn everything_fits_when_under_budget() {
        let items = vec![item("a", "hello", Priority::Low), item("b", "world", Priority::Critical)];
        let report = enforce_budget(items, 1000);
        assert!(!report.overflowed);
        assert!(report.items.iter().all(|i| !i.truncated && !i.dropped));
    }

    #[test]
    fn critical_is_included_even_when_it_alone_exceeds_budget() {
        let items = vec![item("teaching_notes", &"x".repeat(4800), Priority::Critical)];
        let report = enforce_budget(items, 1000);
        let teaching = report.items.iter().find(|i| i.key == "teaching_notes").unwrap();
        assert!(!teaching.dropped);
        assert!(!teaching.truncated);
        assert_eq!(teaching.estimated_tokens, 1200);
        assert!(report.overflowed);
    }

    #[test]
    fn scenario_budget_1000_with_four_tiers() {
        // scenario 4: teaching_notes=1200 CRITICAL, previous=500 HIGH,
        // artifact=400 MEDIUM, history=400 LOW, budget=1000.
        let items = vec![
            item("teaching_notes", &"x".repeat(4800), Priority::Critical),
            item("previous_output", &"y".repeat(2000), Priority::High),
            item("artifacts", &"z".repeat(1600), Priority::Medium),
            item("history", &"w".repeat(1600), Priority::Low),
        ];
        let report = enforce_budget(items, 1000);
        assert!(report.overflowed);

        let teaching = report.items.iter().find(|i| i.key == "teaching_notes").unwrap();
        assert!(!teaching.dropped);
        assert_eq!(teaching.estimated_tokens, 1200);

        // budget already exhausted by the critical item: remaining is 0,
        // so HIGH is dropped (remaining < 100), MEDIUM and LOW are dropped.
        let previous = report.items.iter().find(|i| i.key == "previous_output").unwrap();
        assert!(previous.dropped);
        let artifact = report.items.iter().find(|i| i.key == "artifacts").unwrap();
        assert!(artifact.dropped);
        let history = report.items.iter().find(|i| i.key == "history").unwrap();
        assert!(history.dropped);

        let note = report.truncation_note().unwrap();
        assert!(note.starts_with("[CONTEXT_TRUNCATED] Included 1 of 4 items"));
        assert!(note.contains("3 dropped"));
    }

    #[test]
    fn high_priority_truncates_when_enough_room_remains() {
        let items = vec![item("only", &"word ".repeat(200), Priority::High)];
        let report = enforce_budget(items, 150);
        let only = &report.items[0];
        assert!(only.truncated);
        assert!(!only.dropped);
        assert!(only.content.ends_with("... [TRUNCATED]"));
    }

    #[test]
    fn high_priority_drops_when_under_100_tokens_remain() {
        let items = vec![
            item("filler", &"c".repeat(3960), Priority::Critical),
            item("big", &"word ".repeat(1000), Priority::High),
        ];
        let report = enforce_budget(items, 1000);
        let big = report.items.iter().find(|i| i.key == "big").unwrap();
        assert!(big.dropped);
    }

    #[test]
    fn medium_priority_never_truncates() {
        let items = vec![
            item("filler", &"c".repeat(3600), Priority::Critical),
            item("medium", &"word ".repeat(200), Priority::Medium),
        ];
        let report = enforce_budget(items, 1000);
        let medium = report.items.iter().find(|i| i.key == "medium").unwrap();
        assert!(medium.dropped);
        assert!(!medium.truncated);
    }

    #[test]
    fn low_priority_requires_ten_percent_headroom() {
        let items = vec![
            item("filler", &"c".repeat(3640), Priority::Critical), // 910 tokens used of 1000
            item("low", &"l".repeat(200), Priority::Low),          // 50 tokens, fits in 90 remaining
        ];
        let report = enforce_budget(items, 1000);
        // 90 remaining < 10% of 1000 (100), so LOW is dropped even though it fits.
        let low = report.items.iter().find(|i| i.key == "low").unwrap();
        assert!(low.dropped);
    }

    #[test]
    fn tier_order_is_preserved_within_priority() {
        let items = vec![item("second", "x", Priority::High), item("first", "y", Priority::Critical)];
        let report = enforce_budget(items, 1000);
        assert_eq!(report.items[0].key, "first");
        assert_eq!(report.items[1].key, "second");
    }
}
