//! Durable per-step receipts — the checkpoint marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport-agnostic record of one tool invocation inside a step's Work
/// phase. A single format regardless of which transport executed the step,
/// so receipts are comparable across transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedToolCall {
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<String>,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default)]
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    pub source: ToolCallSource,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallSource {
    Sdk,
    CliObserved,
    KernelExecuted,
    Stub,
}

const DEFAULT_TRUNCATE_CHARS: usize = 2000;

/// Truncate a tool output to a maximum number of characters, preserving a
/// head slice and noting how much was cut.
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    if output.is_empty() {
        return String::new();
    }
    if output.len() <= max_chars {
        return output.to_string();
    }
    let marker = format!("... [truncated, {} chars total]", output.len());
    if marker.len() >= max_chars {
        return marker;
    }
    let available = max_chars - marker.len();
    let mut boundary = available.min(output.len());
    while boundary > 0 && !output.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!("{}{}", &output[..boundary], marker)
}

impl NormalizedToolCall {
    pub fn new(
        tool_name: impl Into<String>,
        tool_input: serde_json::Value,
        source: ToolCallSource,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_input,
            tool_output: None,
            success: true,
            duration_ms: 0,
            blocked: false,
            blocked_reason: None,
            source,
            timestamp: Utc::now(),
        }
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.tool_output = Some(truncate_output(output, DEFAULT_TRUNCATE_CHARS));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub step_id: String,
    pub flow_key: String,
    pub run_id: String,
    pub agent_key: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub tool_calls: Vec<NormalizedToolCall>,
    pub transport_source: String,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_truncation_when_under_limit() {
        assert_eq!(truncate_output("hello", 100), "hello");
    }

    #[test]
    fn truncates_and_reports_total_length() {
        let long = "x".repeat(5000);
        let truncated = truncate_output(&long, 100);
        assert!(truncated.len() <= 100);
        assert!(truncated.contains("5000 chars total"));
    }

    #[test]
    fn tool_call_round_trips_through_json() {
        let call = NormalizedToolCall::new(
            "Bash",
            serde_json::json!({"command": "ls -la"}),
            ToolCallSource::Sdk,
        )
        .with_output("total 42");
        let json = serde_json::to_string(&call).unwrap();
        let back: NormalizedToolCall = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tool_name, call.tool_name);
        assert_eq!(back.tool_output, call.tool_output);
        assert_eq!(back.source, ToolCallSource::Sdk);
    }
}
