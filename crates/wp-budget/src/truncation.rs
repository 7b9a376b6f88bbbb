//! UTF-8-safe string truncation, the single primitive every priority tier
//! in [`crate::budget`] trims with.

/// Truncate `content` to at most `max_chars` bytes at a valid UTF-8
/// boundary, appending a marker when truncation occurred.
pub fn truncate_with_marker(content: &str, max_chars: usize, marker: &str) -> (String, bool) {
    if content.len() <= max_chars {
        return (content.to_string(), false);
    }
    let mut boundary = max_chars.min(content.len());
    while boundary > 0 && !content.is_char_boundary(boundary) {
        boundary -= 1;
    }
    let mut result = content[..boundary].to_string();
    result.push_str(marker);
    (result, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_truncation_when_under_limit() {
        let (result, truncated) = truncate_with_marker("hello world", 100, "\n[TRUNCATED]\n");
        assert_eq!(result, "hello world");
        assert!(!truncated);
    }

    #[test]
    fn truncates_at_limit() {
        let (result, truncated) = truncate_with_marker("abcdefghij", 5, "\n[TRUNCATED]\n");
        assert!(truncated);
        assert!(result.starts_with("abcde"));
        assert!(result.contains("[TRUNCATED]"));
    }

    #[test]
    fn never_splits_a_multibyte_character() {
        let content = "a\u{1F600}b";
        let (result, _) = truncate_with_marker(content, 2, "");
        assert!(std::str::from_utf8(result.as_bytes()).is_ok());
        assert_eq!(result, "a");
    }
}
