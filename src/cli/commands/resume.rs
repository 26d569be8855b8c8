//! `resume` Command
//!
//! Restores a paused or interrupted session from its latest checkpoint
//! and continues generation from the first pending chapter.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::commands::generate;
use crate::cli::output::{self, Output};
use crate::cli::util;
use crate::config::Config;
use crate::session::ProgressSink;
use crate::types::Result;

pub struct ResumeOptions {
    pub blueprint: PathBuf,
    pub session: Option<String>,
}

pub async fn run(config: Config, options: ResumeOptions) -> Result<()> {
    let output = Output::new();
    let session_id = util::resolve_session_id(options.session)?;
    let blueprint = util::load_blueprint(&options.blueprint)?;
    output.header(&format!("Resuming \"{}\"", blueprint.title));
    output.info(&format!("Session {session_id}"));

    let (sink, rx) = ProgressSink::channel();
    let renderer = tokio::spawn(output::render_progress(rx));
    let orchestrator = Arc::new(util::build_orchestrator(&config, sink)?);

    orchestrator
        .resume_from_checkpoint(blueprint, &session_id, config.session_options())
        .await?;
    util::remember_session(&session_id)?;

    generate::drive(orchestrator, &session_id, renderer).await
}
