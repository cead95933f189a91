//! Output truncation utilities for tool results
//!
//! Limits are counted in characters so multi-byte text is never split.

/// Result of a truncation operation
pub struct TruncationResult {
    pub text: String,
    pub was_truncated: bool,
    pub chars_shown: usize,
    pub chars_total: usize,
}

impl TruncationResult {
    /// Format a truncation notice for appending to output
    pub fn notice(&self) -> Option<String> {
        if !self.was_truncated {
            return None;
        }
        Some(format!(
            "\n\n[Output truncated at {} characters]",
            self.chars_shown
        ))
    }

    /// Truncated text with the notice appended when anything was dropped
    pub fn into_marked(self) -> String {
        match self.notice() {
            Some(notice) => self.text + &notice,
            None => self.text,
        }
    }
}

/// Head-truncate: keep the first `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> TruncationResult {
    match text.char_indices().nth(max_chars) {
        None => {
            let chars_total = text.chars().count();
            TruncationResult {
                text: text.to_string(),
                was_truncated: false,
                chars_shown: chars_total,
                chars_total,
            }
        }
        Some((cutoff, _)) => TruncationResult {
            text: text[..cutoff].to_string(),
            was_truncated: true,
            chars_shown: max_chars,
            chars_total: text.chars().count(),
        },
    }
}

/// Shorten text for previews, appending `...` when clipped
pub fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cutoff, _)) => format!("{}...", &text[..cutoff]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_truncation_needed() {
        let result = truncate_chars("short", 100);
        assert!(!result.was_truncated);
        assert_eq!(result.text, "short");
        assert_eq!(result.chars_total, 5);
        assert!(result.notice().is_none());
    }

    #[test]
    fn test_exact_limit_is_not_truncated() {
        let result = truncate_chars("abcde", 5);
        assert!(!result.was_truncated);
    }

    #[test]
    fn test_truncate_with_notice() {
        let text = "x".repeat(120);
        let result = truncate_chars(&text, 100);
        assert!(result.was_truncated);
        assert_eq!(result.chars_total, 120);
        let marked = result.into_marked();
        assert!(marked.starts_with(&"x".repeat(100)));
        assert!(marked.ends_with("\n\n[Output truncated at 100 characters]"));
    }

    #[test]
    fn test_multibyte_boundaries() {
        let result = truncate_chars("héllo wörld", 4);
        assert_eq!(result.text, "héll");
        assert_eq!(clip("ñañaña", 2), "ña...");
    }
}
