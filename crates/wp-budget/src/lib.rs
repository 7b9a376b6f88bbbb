//! Priority-ranked context budget enforcement and the token estimator it
//! runs on.

pub mod budget;
pub mod tokenizer;
pub mod truncation;

pub use budget::{enforce_budget, enforce_budget_with, BudgetReport, BudgetedItem, ContextItem, Priority};
pub use tokenizer::{ApproxTokenizer, Tokenizer};
pub use truncation::truncate_with_marker;
