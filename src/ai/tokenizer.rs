//! Token Estimation
//!
//! Deterministic character-based token estimation for prose. Provider
//! tokenizers differ, so the estimate is intentionally conservative and
//! fixed (4 characters per token) rather than model-specific: budgeting
//! and tests both need exact, reproducible counts.

use crate::constants::tokens::{CHARS_PER_TOKEN, ELLIPSIS, OUTPUT_SAFETY_MULTIPLIER, TOKENS_PER_WORD};

/// Pure token arithmetic. No state, no side effects.
pub struct TokenEstimator;

impl TokenEstimator {
    /// Approximate token count: character count / 4, rounded up
    pub fn estimate(text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }

    /// Whether `text` fits a model's context window with room reserved
    /// for the output
    pub fn fits_in_context(text: &str, context_window: usize, reserved_output: usize) -> bool {
        Self::estimate(text) + reserved_output <= context_window
    }

    /// Truncate to at most `max_tokens`, cutting at a word boundary and
    /// appending an ellipsis marker.
    ///
    /// Text already within the limit is returned unchanged, so the
    /// operation is idempotent.
    pub fn truncate_to_limit(text: &str, max_tokens: usize) -> String {
        if Self::estimate(text) <= max_tokens {
            return text.to_string();
        }
        let budget_chars = (max_tokens * CHARS_PER_TOKEN).saturating_sub(ELLIPSIS.len());
        if budget_chars == 0 {
            return String::new();
        }

        let prefix: String = text.chars().take(budget_chars).collect();
        // Cut back to the last word boundary; a single unbroken word is
        // hard-cut at the budget instead.
        let cut = match prefix.rfind(char::is_whitespace) {
            Some(idx) if idx > 0 => idx,
            _ => prefix.len(),
        };
        let mut result = prefix[..cut].trim_end().to_string();
        result.push_str(ELLIPSIS);
        result
    }

    /// Output token ceiling for a chapter target word count
    pub fn output_ceiling(target_words: u32) -> u32 {
        (target_words as f64 * TOKENS_PER_WORD * OUTPUT_SAFETY_MULTIPLIER).ceil() as u32
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_estimate_exact() {
        assert_eq!(TokenEstimator::estimate(""), 0);
        assert_eq!(TokenEstimator::estimate("abcd"), 1);
        assert_eq!(TokenEstimator::estimate("abcde"), 2);
        assert_eq!(TokenEstimator::estimate(&"x".repeat(400)), 100);
    }

    #[test]
    fn test_estimate_counts_chars_not_bytes() {
        // four multibyte chars estimate the same as four ASCII chars
        assert_eq!(TokenEstimator::estimate("日本語だ"), 1);
    }

    #[test]
    fn test_fits_in_context() {
        let text = "x".repeat(400); // 100 tokens
        assert!(TokenEstimator::fits_in_context(&text, 150, 50));
        assert!(!TokenEstimator::fits_in_context(&text, 149, 50));
    }

    #[test]
    fn test_truncate_under_limit_unchanged() {
        let text = "a short sentence";
        assert_eq!(TokenEstimator::truncate_to_limit(text, 100), text);
    }

    #[test]
    fn test_truncate_cuts_at_word_boundary() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let out = TokenEstimator::truncate_to_limit(text, 5);
        assert!(out.ends_with(ELLIPSIS));
        let body = out.trim_end_matches(ELLIPSIS);
        // every kept word is whole
        assert!(text.starts_with(body));
        assert!(!body.ends_with(char::is_whitespace));
        assert!(TokenEstimator::estimate(&out) <= 5);
    }

    #[test]
    fn test_truncate_single_long_word() {
        let text = "x".repeat(1000);
        let out = TokenEstimator::truncate_to_limit(&text, 10);
        assert!(out.ends_with(ELLIPSIS));
        assert!(TokenEstimator::estimate(&out) <= 10);
    }

    #[test]
    fn test_truncate_zero_budget() {
        assert_eq!(TokenEstimator::truncate_to_limit("hello world", 0), "");
    }

    #[test]
    fn test_output_ceiling() {
        // 3000 words * 1.3 * 1.2 = 4680
        assert_eq!(TokenEstimator::output_ceiling(3000), 4680);
    }

    proptest! {
        #[test]
        fn prop_truncate_respects_limit(text in ".{0,2000}", max in 1usize..200) {
            let out = TokenEstimator::truncate_to_limit(&text, max);
            prop_assert!(TokenEstimator::estimate(&out) <= max);
        }

        #[test]
        fn prop_truncate_idempotent(text in ".{0,2000}", max in 1usize..200) {
            let once = TokenEstimator::truncate_to_limit(&text, max);
            let twice = TokenEstimator::truncate_to_limit(&once, max);
            prop_assert_eq!(once, twice);
        }
    }
}
