//! Structured-output extraction: pull a JSON object out of free-form
//! transport text, validate it against a schema subset, and build a
//! reprompt when validation fails.

pub mod json_extract;
pub mod microloop;
pub mod reprompt;
pub mod schema;

pub use json_extract::extract_json_object;
pub use microloop::{extract_with_microloop, ExtractionResult};
pub use reprompt::build_reprompt;
pub use schema::{validate, ValidationError};
