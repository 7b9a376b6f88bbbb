//! Run/step/flow identifiers.

use chrono::Utc;

/// Mint a new `RunId` of the form `"{flow}-{YYYYMMDDHHMMSS}-{8 hex}"`.
pub fn generate_run_id(flow_key: &str) -> String {
    let ts = Utc::now().format("%Y%m%d%H%M%S");
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{flow_key}-{ts}-{}", &hex[..8])
}

/// Extract the numeric suffix from a step id of the form `"step-N"`.
///
/// Falls back to a bare integer parse, then to `0` if neither applies.
pub fn step_index_of(step_id: &str) -> u32 {
    if let Some(rest) = step_id.strip_prefix("step-") {
        if let Ok(n) = rest.parse() {
            return n;
        }
    }
    step_id.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_has_three_dash_separated_parts() {
        let id = generate_run_id("build");
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts[0], "build");
        assert_eq!(parts.last().unwrap().len(), 8);
    }

    #[test]
    fn step_index_parses_step_prefixed_form() {
        assert_eq!(step_index_of("step-3"), 3);
        assert_eq!(step_index_of("7"), 7);
        assert_eq!(step_index_of("not-a-number"), 0);
    }
}
