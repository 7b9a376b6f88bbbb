//! Pull a JSON object out of free-form transport text, trying the most
//! specific shape first (a fenced code block) down to the most permissive
//! (scanning for balanced braces anywhere in the text).

use regex::Regex;
use std::sync::OnceLock;

fn json_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").unwrap())
}

fn generic_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```\s*(.*?)\s*```").unwrap())
}

const CODE_MARKERS: &[&str] = &["def ", "class ", "function ", "import ", "const ", "let ", "var "];

/// Scan `text` for substrings with balanced `{` `}` braces, honoring string
/// quoting and backslash escapes, in order of appearance.
fn find_json_candidates(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut candidates = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{' {
            let start = i;
            let mut depth: i32 = 0;
            let mut in_string = false;
            let mut escape_next = false;
            let mut j = i;
            let mut closed_at = None;

            while j < bytes.len() {
                let c = bytes[j];
                if escape_next {
                    escape_next = false;
                } else if c == b'\\' {
                    escape_next = true;
                } else if c == b'"' {
                    in_string = !in_string;
                } else if !in_string {
                    if c == b'{' {
                        depth += 1;
                    } else if c == b'}' {
                        depth -= 1;
                        if depth == 0 {
                            closed_at = Some(j);
                            break;
                        }
                    }
                }
                j += 1;
            }

            if let Some(end) = closed_at {
                candidates.push(&text[start..=end]);
                i = end;
            }
        }
        i += 1;
    }
    candidates
}

/// Extract a JSON object from `text`, trying in order: a ```json fence, a
/// generic fence that doesn't look like source code, the first balanced
/// `{...}` block, then the whole trimmed text. Returns the parse error
/// message from the last-tried strategy on total failure.
pub fn extract_json_object(text: &str) -> Result<serde_json::Value, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("empty response received".into());
    }

    if let Some(captures) = json_fence().captures(trimmed) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(captures[1].trim()) {
            if value.is_object() {
                return Ok(value);
            }
        }
    }

    if let Some(captures) = generic_fence().captures(trimmed) {
        let candidate = captures[1].trim();
        let looks_like_code = CODE_MARKERS.iter().any(|marker| candidate.starts_with(marker));
        if !looks_like_code {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
                if value.is_object() {
                    return Ok(value);
                }
            }
        }
    }

    for candidate in find_json_candidates(trimmed) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
            if value.is_object() {
                return Ok(value);
            }
        }
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(value) if value.is_object() => Ok(value),
            Ok(value) => Err(format!("expected a JSON object, got {}", value_kind(&value))),
            Err(err) => Err(format!("invalid JSON: {err}")),
        };
    }

    Err("no valid JSON object found in response".into())
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
