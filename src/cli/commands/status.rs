//! `status` Command
//!
//! Prints the state of a session straight from its latest checkpoint,
//! so it works whether or not a generation process is running.

use std::sync::Arc;

use crate::cli::output::Output;
use crate::cli::util;
use crate::config::{Config, ConfigLoader};
use crate::session::{CheckpointManager, FileStore};
use crate::types::{ChapterStatus, NovelError, Result};

pub struct StatusOptions {
    pub session: Option<String>,
}

pub async fn run(config: Config, options: StatusOptions) -> Result<()> {
    let output = Output::new();
    let session_id = util::resolve_session_id(options.session)?;

    let store = Arc::new(FileStore::new(ConfigLoader::checkpoint_dir(&config)));
    let manager = CheckpointManager::new(store);
    let session = manager
        .restore(&session_id)
        .await?
        .ok_or_else(|| NovelError::Session(format!("no checkpoint for session {session_id}")))?;

    output.header(&format!("Session {session_id}"));
    output.info(&format!("Status: {}", session.status));
    if let Some(message) = &session.error_message {
        output.error(message);
    }

    output.section("Chapters");
    println!(
        "{:>4}  {:<30} {:<12} {:>7} {:>6} {:>8}",
        "#", "Title", "Status", "Words", "Score", "Cost"
    );
    for chapter in &session.chapters {
        let score = chapter
            .quality_score
            .map(|s| format!("{s:.0}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>4}  {:<30} {:<12} {:>7} {:>6} {:>8}",
            chapter.number,
            truncate(&chapter.title, 30),
            status_label(chapter.status),
            chapter.word_count,
            score,
            format!("${:.2}", chapter.cost_usd),
        );
    }

    output.section("Totals");
    output.info(&format!(
        "{} of {} chapters complete, {} words, ${:.2}",
        session.completed_count(),
        session.chapters.len(),
        session.total_words,
        session.total_cost_usd,
    ));

    let needs_review = session
        .chapters
        .iter()
        .filter(|c| c.status == ChapterStatus::NeedsReview)
        .count();
    if needs_review > 0 {
        output.warning(&format!(
            "{needs_review} chapter(s) below the quality threshold await review"
        ));
    }
    Ok(())
}

fn status_label(status: ChapterStatus) -> &'static str {
    match status {
        ChapterStatus::Pending => "pending",
        ChapterStatus::InProgress => "in progress",
        ChapterStatus::Completed => "completed",
        ChapterStatus::NeedsReview => "needs review",
        ChapterStatus::Failed => "failed",
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_preserves_short_titles() {
        assert_eq!(truncate("Short", 30), "Short");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }
}
