//! Generated Chapter Types
//!
//! A chapter moves through its own small lifecycle within a session:
//! drafted, optionally revised, then finalized on approval. Finalized
//! chapters are never mutated again; the continuity tracker and the
//! story-so-far summary both read from finalized content only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Chapter Status
// =============================================================================

/// Per-chapter status within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    /// Not yet attempted
    Pending,
    /// A generation attempt is in flight
    InProgress,
    /// Generated and passed checks, awaiting or given approval
    Completed,
    /// Revision attempts exhausted without passing checks
    NeedsReview,
    /// Generation failed with a non-retryable error
    Failed,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::NeedsReview => "needs_review",
            Self::Failed => "failed",
        }
    }

    /// Terminal per-chapter states. The next chapter's pipeline may only
    /// start once the current chapter reaches one of these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::NeedsReview | Self::Failed)
    }
}

// =============================================================================
// Generated Chapter
// =============================================================================

/// The product of one chapter pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedChapter {
    pub number: u32,
    pub title: String,
    pub content: String,
    pub word_count: u32,

    /// Overall quality score from the latest evaluation (0-100)
    pub quality_score: Option<f64>,

    /// Issues still open after the revision loop
    #[serde(default)]
    pub unresolved_issues: Vec<String>,

    pub status: ChapterStatus,
    pub approved: bool,

    /// Generation attempts consumed (initial + revisions)
    pub attempts: u32,

    /// Cost of all provider calls for this chapter, USD
    pub cost_usd: f64,

    pub generated_at: Option<DateTime<Utc>>,
}

impl GeneratedChapter {
    pub fn pending(number: u32, title: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            content: String::new(),
            word_count: 0,
            quality_score: None,
            unresolved_issues: Vec::new(),
            status: ChapterStatus::Pending,
            approved: false,
            attempts: 0,
            cost_usd: 0.0,
            generated_at: None,
        }
    }

    /// Whole-word count of the chapter content
    pub fn count_words(content: &str) -> u32 {
        content.split_whitespace().count() as u32
    }

    /// Record a completed generation attempt
    pub fn record_attempt(&mut self, content: String, cost_usd: f64) {
        self.word_count = Self::count_words(&content);
        self.content = content;
        self.cost_usd += cost_usd;
        self.attempts += 1;
        self.generated_at = Some(Utc::now());
    }

    /// Finalize on approval. Content is immutable from here on.
    pub fn approve(&mut self) {
        self.approved = true;
        self.status = ChapterStatus::Completed;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(ChapterStatus::Completed.is_terminal());
        assert!(ChapterStatus::NeedsReview.is_terminal());
        assert!(ChapterStatus::Failed.is_terminal());
        assert!(!ChapterStatus::Pending.is_terminal());
        assert!(!ChapterStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_record_attempt_accumulates_cost() {
        let mut ch = GeneratedChapter::pending(1, "One");
        ch.record_attempt("first draft text".to_string(), 0.05);
        ch.record_attempt("second revised draft text".to_string(), 0.03);
        assert_eq!(ch.attempts, 2);
        assert!((ch.cost_usd - 0.08).abs() < 1e-9);
        assert_eq!(ch.word_count, 4);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(GeneratedChapter::count_words("one  two\nthree"), 3);
        assert_eq!(GeneratedChapter::count_words(""), 0);
    }

    #[test]
    fn test_approve_finalizes() {
        let mut ch = GeneratedChapter::pending(1, "One");
        ch.record_attempt("text".to_string(), 0.0);
        ch.approve();
        assert!(ch.approved);
        assert_eq!(ch.status, ChapterStatus::Completed);
    }
}
