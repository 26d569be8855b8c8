//! `generate` Command
//!
//! Drives a full book generation run: load the blueprint, start a
//! session, stream progress to the console, and export the finished
//! chapters. Ctrl-C requests a pause, which is honored between
//! chapters, so an interrupted run can be resumed later.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::ai::QualityMode;
use crate::cli::output::{self, Output};
use crate::cli::util;
use crate::config::{Config, ConfigLoader};
use crate::session::{ProgressSink, SessionOrchestrator};
use crate::types::{ChapterStatus, Result, SessionStatus};

pub struct GenerateOptions {
    pub blueprint: PathBuf,
    pub mode: Option<QualityMode>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

pub async fn run(mut config: Config, options: GenerateOptions) -> Result<()> {
    if let Some(provider) = options.provider {
        config.llm.provider = provider;
    }
    if let Some(model) = options.model {
        config.llm.model = Some(model);
    }
    if let Some(mode) = options.mode {
        config.generation.mode = mode;
    }

    let output = Output::new();
    let blueprint = util::load_blueprint(&options.blueprint)?;
    output.header(&format!("Generating \"{}\"", blueprint.title));
    output.info(&format!(
        "{} chapters, {} target words, {} provider, {} mode",
        blueprint.chapter_count(),
        blueprint.target_word_count,
        config.llm.provider,
        config.generation.mode,
    ));

    let (sink, rx) = ProgressSink::channel();
    let renderer = tokio::spawn(output::render_progress(rx));
    let orchestrator = Arc::new(util::build_orchestrator(&config, sink)?);

    let session_id = orchestrator
        .start(blueprint, config.session_options())
        .await?;
    util::remember_session(&session_id)?;
    output.info(&format!("Session {session_id}"));

    drive(orchestrator, &session_id, renderer).await
}

/// Run the session to its next stopping point and report the outcome.
/// Shared with `resume`.
pub(crate) async fn drive(
    orchestrator: Arc<SessionOrchestrator>,
    session_id: &str,
    renderer: JoinHandle<()>,
) -> Result<()> {
    let output = Output::new();

    // Ctrl-C pauses between chapters instead of killing the run
    let interrupt = {
        let orchestrator = orchestrator.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, pausing after the current chapter");
                let _ = orchestrator.pause(&session_id);
            }
        })
    };

    let status = orchestrator.run(session_id).await;
    interrupt.abort();

    let status = match status {
        Ok(status) => status,
        Err(e) => {
            drop(orchestrator);
            let _ = renderer.await;
            return Err(e);
        }
    };

    let session = orchestrator.snapshot(session_id).await?;
    let stats = orchestrator.statistics(session_id).await?;
    drop(orchestrator);
    let _ = renderer.await;

    match status {
        SessionStatus::Complete => {
            let exported = export_chapters(&session)?;
            output.success(&format!(
                "Book complete: {} chapters, {} words, ${:.2}",
                session.completed_count(),
                session.total_words,
                session.total_cost_usd,
            ));
            output.info(&format!(
                "{} API calls, {:.0} words/min",
                stats.api_calls, stats.words_per_minute,
            ));
            output.info(&format!("Chapters written to {}", exported.display()));
        }
        SessionStatus::Paused => {
            let needs_review = session
                .chapters
                .iter()
                .filter(|c| c.status == ChapterStatus::NeedsReview)
                .count();
            if needs_review > 0 {
                output.warning(&format!(
                    "{needs_review} chapter(s) need review; see: novelweave status"
                ));
            }
            output.info(&format!(
                "Paused after {} of {} chapters; continue with: novelweave resume",
                session.completed_count(),
                session.chapters.len(),
            ));
        }
        SessionStatus::Cancelled => {
            output.warning("Session cancelled");
        }
        other => {
            output.info(&format!("Session ended as {other}"));
        }
    }
    Ok(())
}

/// Write finalized chapters as markdown files under the project dir
fn export_chapters(session: &crate::types::GenerationSession) -> Result<PathBuf> {
    let dir = ConfigLoader::project_dir().join("chapters");
    fs::create_dir_all(&dir)?;
    for chapter in session.completed_chapters() {
        let path = dir.join(format!("chapter_{:02}.md", chapter.number));
        fs::write(&path, format!("# {}\n\n{}\n", chapter.title, chapter.content))?;
    }
    Ok(dir)
}
