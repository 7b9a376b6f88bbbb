//! Build a reprompt that tells a transport exactly what was wrong with its
//! last structured-output attempt, so the retry has a shot at succeeding.

use serde_json::Value;

use crate::schema::ValidationError;

const MAX_RESPONSE_PREVIEW: usize = 500;

pub fn build_reprompt(schema: &Value, errors: &[ValidationError], previous_response: &str) -> String {
    let error_lines: String = errors.iter().map(|e| format!("  - {e}\n")).collect();

    let mut boundary = MAX_RESPONSE_PREVIEW.min(previous_response.len());
    while boundary > 0 && !previous_response.is_char_boundary(boundary) {
        boundary -= 1;
    }
    let mut preview = previous_response[..boundary].to_string();
    if previous_response.len() > boundary {
        preview.push_str("...");
    }

    let required = schema.get("required").and_then(Value::as_array);
    let properties = schema.get("properties").and_then(Value::as_object);
    let field_hints: String = required
        .map(|fields| {
            fields
                .iter()
                .filter_map(Value::as_str)
                .map(|name| {
                    let prop = properties.and_then(|p| p.get(name));
                    let mut hint = format!("  - {name}");
                    if let Some(ty) = prop.and_then(|p| p.get("type")).and_then(Value::as_str) {
                        hint.push_str(&format!(" ({ty})"));
                    }
                    if let Some(values) = prop.and_then(|p| p.get("enum")) {
                        hint.push_str(&format!(" - one of: {values}"));
                    }
                    hint.push('\n');
                    hint
                })
                .collect()
        })
        .unwrap_or_default();
    let field_hints = if field_hints.is_empty() { "  (see schema)\n".to_string() } else { field_hints };

    format!(
        "Your previous response had validation errors:\n\n{error_lines}\n\
Previous response (invalid):\n```\n{preview}\n```\n\n\
Please provide a valid JSON response that matches the required schema.\n\n\
Required fields:\n{field_hints}\n\
IMPORTANT: Respond with ONLY valid JSON. Do not include any explanation, \
markdown fences, or other text. Just the raw JSON object starting with {{ and ending with }}."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reprompt_includes_error_and_required_fields() {
        let schema = json!({"required": ["summary"], "properties": {"summary": {"type": "string"}}});
        let errors = vec![ValidationError { path: "$.summary".into(), message: "missing".into() }];
        let reprompt = build_reprompt(&schema, &errors, "{}");
        assert!(reprompt.contains("$.summary"));
        assert!(reprompt.contains("summary (string)"));
    }

    #[test]
    fn long_previous_response_is_truncated() {
        let schema = json!({});
        let long = "x".repeat(1000);
        let reprompt = build_reprompt(&schema, &[], &long);
        assert!(reprompt.contains("..."));
    }
}
