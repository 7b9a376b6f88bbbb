//! Normalize error output into a stable signature: strip the noise
//! (timestamps, line numbers, absolute paths) that would otherwise make two
//! occurrences of the same underlying error look different iteration to
//! iteration.

use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

fn timestamp_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?").unwrap())
}

fn line_number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":\d+(:\d+)?\b").unwrap())
}

fn path_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(/[\w.\-]+)+/?").unwrap())
}

fn hex_address_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"0x[0-9a-fA-F]+").unwrap())
}

fn uuid_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap())
}

fn run_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\brun-[A-Za-z0-9-]+").unwrap())
}

fn pid_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bpid \d+").unwrap())
}

fn attempt_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\battempt \d+").unwrap())
}

fn iteration_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\biteration \d+").unwrap())
}

/// The first 16 hex characters of the SHA-256 of the normalized text.
const SIGNATURE_LEN: usize = 16;

/// Strip timestamps, line:column markers, absolute paths, hex addresses,
/// UUIDs, run ids, pids, and attempt/iteration counters, collapse
/// whitespace, and hash the result. Two error outputs differing only in
/// those incidental details normalize to the same signature.
pub fn compute_error_signature(raw_output: &str) -> String {
    let mut text = raw_output.to_ascii_lowercase();
    text = text.trim().to_string();
    text = timestamp_pattern().replace_all(&text, "<ts>").into_owned();
    text = uuid_pattern().replace_all(&text, "<uuid>").into_owned();
    text = run_id_pattern().replace_all(&text, "<run>").into_owned();
    text = pid_pattern().replace_all(&text, "pid <n>").into_owned();
    text = attempt_pattern().replace_all(&text, "attempt <n>").into_owned();
    text = iteration_pattern().replace_all(&text, "iteration <n>").into_owned();
    text = hex_address_pattern().replace_all(&text, "<addr>").into_owned();
    text = path_pattern().replace_all(&text, "<path>").into_owned();
    text = line_number_pattern().replace_all(&text, ":<line>").into_owned();
    let normalized: String = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())[..SIGNATURE_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_and_line_numbers_normalize_to_same_signature() {
        let a = "2026-01-01T10:00:00Z error at /home/user/src/main.rs:42:7 TypeError";
        let b = "2026-01-02T11:05:33Z error at /home/user/src/main.rs:58:2 TypeError";
        assert_eq!(compute_error_signature(a), compute_error_signature(b));
    }

    #[test]
    fn genuinely_different_errors_normalize_differently() {
        let a = "TypeError: foo has no attribute 'bar'";
        let b = "ValueError: invalid literal for int()";
        assert_ne!(compute_error_signature(a), compute_error_signature(b));
    }

    #[test]
    fn signature_is_stable_and_hex_encoded() {
        let sig = compute_error_signature("some error");
        assert_eq!(sig.len(), 16);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn run_ids_pids_and_counters_normalize_away() {
        let a = "worker pid 1234 run-abc123 failed on attempt 2, iteration 5";
        let b = "worker pid 9999 run-xyz789 failed on attempt 9, iteration 1";
        assert_eq!(compute_error_signature(a), compute_error_signature(b));
    }
}
