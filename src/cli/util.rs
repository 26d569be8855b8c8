//! CLI Plumbing
//!
//! Shared helpers for the commands: building the orchestrator from
//! configuration, loading blueprints, and remembering the most recent
//! session so `resume` and `status` work without an explicit id.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ai::{ProviderConfig, ProviderKind, create_provider};
use crate::config::{Config, ConfigLoader};
use crate::session::{FileStore, ProgressSink, SessionOrchestrator};
use crate::types::{Blueprint, NovelError, Result};

/// Build an orchestrator wired to the configured provider and the
/// project checkpoint store
pub fn build_orchestrator(config: &Config, progress: ProgressSink) -> Result<SessionOrchestrator> {
    let provider_config = ProviderConfig {
        provider: config.llm.provider.clone(),
        api_key: None, // resolved from the environment by the provider
        api_base: config.llm.api_base.clone(),
        timeout_secs: config.llm.timeout_secs,
    };
    let provider = create_provider(&provider_config)?;
    let kind = ProviderKind::parse(&config.llm.provider).ok_or_else(|| {
        NovelError::Config(format!("Unknown provider: {}", config.llm.provider))
    })?;
    let store = Arc::new(FileStore::new(ConfigLoader::checkpoint_dir(config)));
    Ok(SessionOrchestrator::new(provider, kind, store).with_progress(progress))
}

/// Load and validate a blueprint from a YAML file
pub fn load_blueprint(path: &Path) -> Result<Blueprint> {
    let text = fs::read_to_string(path).map_err(|e| {
        NovelError::Blueprint(format!("cannot read blueprint {}: {e}", path.display()))
    })?;
    let blueprint: Blueprint = serde_yaml::from_str(&text)?;
    blueprint.validate()?;
    Ok(blueprint)
}

// =============================================================================
// Latest Session Pointer
// =============================================================================

fn latest_session_path() -> PathBuf {
    ConfigLoader::project_dir().join("latest-session")
}

pub fn remember_session(session_id: &str) -> Result<()> {
    fs::create_dir_all(ConfigLoader::project_dir())?;
    fs::write(latest_session_path(), session_id)?;
    Ok(())
}

/// The explicit id if given, otherwise the most recently started session
pub fn resolve_session_id(explicit: Option<String>) -> Result<String> {
    if let Some(id) = explicit {
        return Ok(id);
    }
    let path = latest_session_path();
    let id = fs::read_to_string(&path).map_err(|_| {
        NovelError::Session(
            "no session id given and no previous session found; pass --session".to_string(),
        )
    })?;
    let id = id.trim().to_string();
    if id.is_empty() {
        return Err(NovelError::Session("recorded session id is empty".to_string()));
    }
    Ok(id)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_blueprint_rejects_missing_file() {
        assert!(load_blueprint(Path::new("/nonexistent/book.yaml")).is_err());
    }

    #[test]
    fn test_load_blueprint_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.yaml");
        // valid YAML, invalid blueprint: the POV character is unknown
        fs::write(
            &path,
            r#"
title: "Test Book"
premise: "A premise."
genre: "fantasy"
target_word_count: 1000
acts:
  - number: 1
    title: "Act One"
    chapters:
      - number: 1
        title: "Chapter 1"
        summary: "Things happen."
        target_word_count: 1000
        pov_character: "Ghost"
characters: []
locations: []
style:
  pov: third_limited
  tense: past
"#,
        )
        .unwrap();
        assert!(load_blueprint(&path).is_err());
    }
}
