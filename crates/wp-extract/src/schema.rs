//! A JSON-Schema subset validator: required fields, type checks, enum
//! constraints, and one level of nested object/array recursion. Not a
//! Draft-07-complete implementation — it covers what handoff envelope
//! schemas actually use.

use std::fmt;

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// Validate `data` against `schema`. Returns an empty vec when `data` is
/// valid. Unknown fields are ignored (`additionalProperties` is not
/// enforced), matching the forgiving-by-default source validator.
pub fn validate(data: &Value, schema: &Value) -> Vec<ValidationError> {
    validate_at("$", data, schema)
}

fn validate_at(path: &str, data: &Value, schema: &Value) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let Some(object) = data.as_object() else {
        errors.push(ValidationError { path: path.to_string(), message: format!("expected object, got {}", kind(data)) });
        return errors;
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required {
            if let Some(name) = field.as_str() {
                if !object.contains_key(name) {
                    errors.push(ValidationError {
                        path: format!("{path}.{name}"),
                        message: format!("required field '{name}' is missing"),
                    });
                }
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);

    for (field_name, value) in object {
        let Some(properties) = properties else { continue };
        let Some(prop_schema) = properties.get(field_name) else { continue };
        let field_path = format!("{path}.{field_name}");

        if value.is_null() {
            let nullable = prop_schema.get("nullable").and_then(Value::as_bool).unwrap_or(false);
            let prop_type = prop_schema.get("type").and_then(Value::as_str);
            if prop_type == Some("null") || nullable || prop_type.is_none() {
                continue;
            }
            errors.push(ValidationError {
                path: field_path,
                message: format!("value cannot be null (expected type '{}')", prop_type.unwrap_or("?")),
            });
            continue;
        }

        if let Some(allowed) = prop_schema.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                errors.push(ValidationError { path: field_path.clone(), message: format!("value {value} is not in the allowed enum") });
            }
        }

        if let Some(expected_type) = prop_schema.get("type").and_then(Value::as_str) {
            if !type_matches(expected_type, value) {
                errors.push(ValidationError {
                    path: field_path.clone(),
                    message: format!("expected type '{expected_type}', got {}", kind(value)),
                });
                continue;
            }
            if expected_type == "object" {
                errors.extend(validate_at(&field_path, value, prop_schema));
            }
            if expected_type == "array" {
                if let (Some(items_schema), Some(array)) = (prop_schema.get("items"), value.as_array()) {
                    for (i, item) in array.iter().enumerate() {
                        if items_schema.get("type").and_then(Value::as_str) == Some("object") {
                            errors.extend(validate_at(&format!("{field_path}[{i}]"), item, items_schema));
                        }
                        if let Some(allowed) = items_schema.get("enum").and_then(Value::as_array) {
                            if !allowed.contains(item) {
                                errors.push(ValidationError {
                                    path: format!("{field_path}[{i}]"),
                                    message: format!("value {item} is not in the allowed enum"),
                                });
                            }
                        }
                    }
                }
            }
        }

        errors.extend(validate_constraints(&field_path, value, prop_schema));
    }

    errors
}

/// `minLength`/`maxLength`/`pattern` for strings, inclusive/exclusive
/// numeric bounds for numbers — the constraint keywords that sit alongside
/// `type` rather than replacing it.
fn validate_constraints(path: &str, value: &Value, prop_schema: &Value) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(s) = value.as_str() {
        if let Some(min) = prop_schema.get("minLength").and_then(Value::as_u64) {
            if (s.chars().count() as u64) < min {
                errors.push(ValidationError { path: path.to_string(), message: format!("length is below minLength {min}") });
            }
        }
        if let Some(max) = prop_schema.get("maxLength").and_then(Value::as_u64) {
            if (s.chars().count() as u64) > max {
                errors.push(ValidationError { path: path.to_string(), message: format!("length exceeds maxLength {max}") });
            }
        }
        if let Some(pattern) = prop_schema.get("pattern").and_then(Value::as_str) {
            match regex::Regex::new(pattern) {
                Ok(re) if !re.is_match(s) => {
                    errors.push(ValidationError { path: path.to_string(), message: format!("value does not match pattern '{pattern}'") });
                }
                Ok(_) => {}
                Err(err) => errors.push(ValidationError { path: path.to_string(), message: format!("invalid pattern '{pattern}': {err}") }),
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = prop_schema.get("minimum").and_then(Value::as_f64) {
            if n < min {
                errors.push(ValidationError { path: path.to_string(), message: format!("value {n} is below minimum {min}") });
            }
        }
        if let Some(max) = prop_schema.get("maximum").and_then(Value::as_f64) {
            if n > max {
                errors.push(ValidationError { path: path.to_string(), message: format!("value {n} exceeds maximum {max}") });
            }
        }
        if let Some(min) = prop_schema.get("exclusiveMinimum").and_then(Value::as_f64) {
            if n <= min {
                errors.push(ValidationError { path: path.to_string(), message: format!("value {n} must exceed exclusiveMinimum {min}") });
            }
        }
        if let Some(max) = prop_schema.get("exclusiveMaximum").and_then(Value::as_f64) {
            if n >= max {
                errors.push(ValidationError { path: path.to_string(), message: format!("value {n} must be below exclusiveMaximum {max}") });
            }
        }
    }

    errors
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
