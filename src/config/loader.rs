//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/novelweave/config.toml)
//! 3. Project config (.novelweave/config.toml)
//! 4. Environment variables (NOVELWEAVE_* prefix)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::{debug, info};

use super::types::Config;
use crate::types::{NovelError, Result};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        // e.g. NOVELWEAVE_LLM_PROVIDER -> llm.provider
        figment = figment.merge(Env::prefixed("NOVELWEAVE_").split('_').lowercase(true));

        let config: Config = figment
            .extract()
            .map_err(|e| NovelError::Config(format!("Configuration error: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| NovelError::Config(format!("Configuration error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Global config directory (~/.config/novelweave/)
    pub fn global_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "novelweave").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Global config file path
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Project config file path
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".novelweave/config.toml")
    }

    /// Project data directory
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".novelweave")
    }

    /// Checkpoint directory for the current project
    pub fn checkpoint_dir(config: &Config) -> PathBuf {
        Self::project_dir().join(&config.session.checkpoint_dir)
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize the project layout and a default config file
    pub fn init_project(config: &Config) -> Result<PathBuf> {
        let project_dir = Self::project_dir();
        fs::create_dir_all(&project_dir)?;
        fs::create_dir_all(Self::checkpoint_dir(config))?;
        fs::create_dir_all(project_dir.join("chapters"))?;

        let config_path = project_dir.join("config.toml");
        if !config_path.exists() {
            fs::write(&config_path, Self::default_project_config()?)?;
            info!("Created project config: {}", config_path.display());
        }
        Ok(project_dir)
    }

    /// Check if the project layout exists
    pub fn is_project_initialized() -> bool {
        Self::project_dir().exists()
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Default project config content, serialized from the actual
    /// defaults so the scaffold cannot drift from the schema
    fn default_project_config() -> Result<String> {
        let body = toml::to_string_pretty(&Config::default())
            .map_err(|e| NovelError::Config(e.to_string()))?;
        Ok(format!(
            "# NovelWeave Project Configuration\n\
             # Project-specific settings that override global defaults.\n\
             # API keys are read from the environment (OPENAI_API_KEY, ANTHROPIC_API_KEY).\n\
             \n{body}"
        ))
    }
}

// =============================================================================
// Tests
// =============================================================================
