//! `init` Command

use crate::cli::output::Output;
use crate::config::{Config, ConfigLoader};
use crate::types::Result;

pub fn run() -> Result<()> {
    let output = Output::new();
    if ConfigLoader::is_project_initialized() {
        output.info("Project already initialized");
        return Ok(());
    }
    let dir = ConfigLoader::init_project(&Config::default())?;
    output.success(&format!("Initialized project in {}", dir.display()));
    output.info("Edit .novelweave/config.toml, then run: novelweave generate <blueprint.yaml>");
    Ok(())
}
