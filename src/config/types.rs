//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/novelweave/) and project (.novelweave/)
//! level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ai::QualityMode;
use crate::constants::{context as caps, generation as tuning};
use crate::generation::ContextOptions;
use crate::session::SessionOptions;
use crate::types::{NovelError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// LLM provider settings
    pub llm: LlmConfig,

    /// Generation pipeline settings
    pub generation: GenerationConfig,

    /// Context assembly settings
    pub context: ContextConfig,

    /// Session persistence settings
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            generation: GenerationConfig::default(),
            context: ContextConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `NovelError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if self.llm.timeout_secs == 0 {
            return Err(NovelError::Config(
                "llm timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.generation.max_attempts == 0 {
            return Err(NovelError::Config(
                "generation max_attempts must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.generation.quality_threshold) {
            return Err(NovelError::Config(format!(
                "generation quality_threshold must be between 0 and 100, got {}",
                self.generation.quality_threshold
            )));
        }
        if self.context.max_tokens < 1_000 {
            return Err(NovelError::Config(format!(
                "context max_tokens must be at least 1000, got {}",
                self.context.max_tokens
            )));
        }
        Ok(())
    }

    /// Per-session options derived from this configuration
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            mode: self.generation.mode,
            model_override: self.llm.model.clone(),
            max_attempts: self.generation.max_attempts,
            quality_threshold: self.generation.quality_threshold,
            context: ContextOptions {
                max_tokens: self.context.max_tokens,
                top_principals: self.context.top_principals,
                recent_summaries: self.context.recent_summaries,
            },
        }
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("openai" or "anthropic")
    pub provider: String,

    /// Explicit model id, bypassing the quality-mode catalog
    pub model: Option<String>,

    /// Override for the provider API base URL
    pub api_base: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            api_base: None,
            timeout_secs: 300,
        }
    }
}

// =============================================================================
// Generation Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Quality mode selecting the model tier and pass count
    pub mode: QualityMode,

    /// Generation attempts per chapter (initial + revisions)
    pub max_attempts: u32,

    /// Overall quality score a chapter must reach (0-100)
    pub quality_threshold: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            mode: QualityMode::Standard,
            max_attempts: tuning::DEFAULT_MAX_ATTEMPTS,
            quality_threshold: tuning::DEFAULT_QUALITY_THRESHOLD,
        }
    }
}

// =============================================================================
// Context Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Total token budget for an assembled context
    pub max_tokens: usize,

    /// Protagonists/antagonists packed beyond linked characters
    pub top_principals: usize,

    /// Previous chapter summaries feeding the story so far
    pub recent_summaries: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: caps::DEFAULT_MAX_TOKENS,
            top_principals: caps::TOP_PRINCIPALS,
            recent_summaries: caps::RECENT_CHAPTER_SUMMARIES,
        }
    }
}

// =============================================================================
// Session Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Checkpoint directory (relative to .novelweave/)
    pub checkpoint_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("checkpoints"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
