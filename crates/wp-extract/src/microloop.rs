//! The validation microloop: query, extract, validate, reprompt-and-retry
//! until a schema-valid object comes back or attempts are exhausted.

use serde_json::Value;

use crate::json_extract::extract_json_object;
use crate::reprompt::build_reprompt;
use crate::schema::{validate, ValidationError};

#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub value: Option<Value>,
    pub attempts: u32,
    pub errors: Vec<ValidationError>,
    /// One entry per attempt, in order, so a caller can inspect the whole
    /// back-and-forth rather than only the last response.
    pub raw_responses: Vec<String>,
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }
}

/// Run the query/extract/validate/reprompt loop. `query` is called with the
/// prompt to send and returns the transport's raw text response.
pub async fn extract_with_microloop<F>(
    prompt: &str,
    schema: &Value,
    max_attempts: u32,
    mut query: F,
) -> ExtractionResult
where
    F: AsyncFnMut(String) -> String,
{
    let mut current_prompt = prompt.to_string();
    let mut raw_responses = Vec::new();
    let mut last_errors = Vec::new();

    for attempt in 1..=max_attempts {
        let response = query(current_prompt.clone()).await;
        raw_responses.push(response.clone());

        let parsed = match extract_json_object(&response) {
            Ok(value) => value,
            Err(message) => {
                last_errors = vec![ValidationError { path: "$".into(), message }];
                if attempt < max_attempts {
                    current_prompt = build_reprompt(schema, &last_errors, &response);
                }
                continue;
            }
        };

        let errors = validate(&parsed, schema);
        if errors.is_empty() {
            return ExtractionResult { value: Some(parsed), attempts: attempt, errors: Vec::new(), raw_responses };
        }

        last_errors = errors;
        if attempt < max_attempts {
            current_prompt = build_reprompt(schema, &last_errors, &response);
        }
    }

    ExtractionResult { value: None, attempts: max_attempts, errors: last_errors, raw_responses }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let schema = json!({"required": ["status"], "properties": {"status": {"type": "string"}}});
        let result = extract_with_microloop("prompt", &schema, 3, async |_| "{\"status\": \"ok\"}".to_string()).await;
        assert!(result.is_success());
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn recovers_on_second_attempt_after_reprompt() {
        let schema = json!({"required": ["status"], "properties": {"status": {"type": "string"}}});
        let calls = RefCell::new(0);
        let result = extract_with_microloop("prompt", &schema, 3, async |_| {
            let mut count = calls.borrow_mut();
            *count += 1;
            if *count == 1 { "not json at all".to_string() } else { "{\"status\": \"ok\"}".to_string() }
        })
        .await;
        assert!(result.is_success());
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn exhausting_attempts_reports_last_errors() {
        let schema = json!({"required": ["status"], "properties": {"status": {"type": "string"}}});
        let result = extract_with_microloop("prompt", &schema, 2, async |_| "still not json".to_string()).await;
        assert!(!result.is_success());
        assert_eq!(result.attempts, 2);
        assert!(!result.errors.is_empty());
    }
}
