//! Console Output
//!
//! Styled terminal output plus a renderer for session progress events.

use console::style;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::session::ProgressUpdate;
use crate::types::GenerationPhase;

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

/// Consume progress events and render them as single console lines
/// until the sending side closes
pub async fn render_progress(mut rx: UnboundedReceiver<ProgressUpdate>) {
    while let Some(update) = rx.recv().await {
        let chapter = update
            .current_chapter
            .map(|n| format!("ch {n}"))
            .unwrap_or_else(|| "session".to_string());
        let eta = update
            .estimated_remaining_secs
            .map(format_duration)
            .unwrap_or_else(|| "--".to_string());
        println!(
            "{} {} {} · {} words · ${:.2} · eta {}",
            style(format!("[{:>3.0}%]", update.overall_pct)).cyan(),
            style(phase_label(update.phase)).bold(),
            chapter,
            update.words_generated,
            update.cost_so_far_usd,
            eta,
        );
    }
}

fn phase_label(phase: GenerationPhase) -> &'static str {
    match phase {
        GenerationPhase::Initializing => "init      ",
        GenerationPhase::BuildingContext => "context   ",
        GenerationPhase::Generating => "generate  ",
        GenerationPhase::QualityCheck => "quality   ",
        GenerationPhase::ContinuityVerification => "continuity",
        GenerationPhase::Revising => "revise    ",
        GenerationPhase::Finalizing => "finalize  ",
        GenerationPhase::Completed => "done      ",
    }
}

fn format_duration(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

// =============================================================================
// Tests
// =============================================================================
