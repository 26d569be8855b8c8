//! LLM Provider Abstraction
//!
//! Defines the LlmProvider trait for prose generation. All providers
//! return `ProviderResponse` with token usage metrics for cost tracking,
//! and may additionally expose a streaming variant.
//!
//! ## Modules
//!
//! - `openai`: OpenAI-compatible chat completions backend (SSE streaming)
//! - `anthropic`: Anthropic Messages backend (buffered)

mod anthropic;
mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

// Re-export error types from centralized location
pub use crate::types::{ErrorCategory, ErrorClassifier, LlmError};

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::types::{NovelError, Result};

// =============================================================================
// Generation Request
// =============================================================================

/// One provider call. The executor builds these; providers only
/// translate them to their wire format.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// System instruction (writing persona, editing mode, style rules)
    pub system: String,
    /// Assembled context plus chapter instructions
    pub prompt: String,
    /// Concrete model id resolved by the model catalog
    pub model: String,
    /// Output token ceiling
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f64,
}

// =============================================================================
// Provider Response with Usage Metrics
// =============================================================================

/// Complete provider response including content and usage metrics
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Generated prose
    pub content: String,
    /// Token usage metrics
    pub usage: TokenUsage,
    /// Why the model stopped
    pub finish_reason: FinishReason,
    /// Response timing
    pub timing: ResponseTiming,
    /// Provider and model info
    pub metadata: ResponseMetadata,
}

/// Token usage metrics for cost tracking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens (prompt)
    pub input_tokens: u64,
    /// Output tokens (response)
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens used (input + output)
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Sum usage across passes of a multi-pass pipeline
    pub fn merge(&self, other: &TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
        }
    }
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of output
    Stop,
    /// Output token ceiling reached
    Length,
    /// Provider safety filter intervened
    ContentFilter,
    Unknown,
}

impl FinishReason {
    /// Map provider wire values to the common set
    pub fn parse(s: &str) -> Self {
        match s {
            "stop" | "end_turn" | "stop_sequence" => Self::Stop,
            "length" | "max_tokens" => Self::Length,
            "content_filter" | "refusal" => Self::ContentFilter,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
            Self::Unknown => "unknown",
        }
    }
}

/// Response timing metrics
#[derive(Debug, Clone, Default)]
pub struct ResponseTiming {
    /// Total response time in milliseconds (wall clock)
    pub total_ms: u64,
}

impl ResponseTiming {
    pub fn from_duration(duration: std::time::Duration) -> Self {
        Self {
            total_ms: duration.as_millis() as u64,
        }
    }
}

/// Response metadata
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    /// Model used
    pub model: String,
    /// Provider name
    pub provider: String,
}

// =============================================================================
// Streaming
// =============================================================================

/// One streamed increment of generated prose.
///
/// The terminal chunk carries `is_final = true` plus the finish reason
/// and usage when the provider reports them.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub delta: String,
    pub is_final: bool,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: text.into(),
            is_final: false,
            finish_reason: None,
            usage: None,
        }
    }

    pub fn terminal(finish_reason: FinishReason, usage: Option<TokenUsage>) -> Self {
        Self {
            delta: String::new(),
            is_final: true,
            finish_reason: Some(finish_reason),
            usage,
        }
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Shared LLM provider type for concurrent access across sessions.
pub type SharedProvider = Arc<dyn LlmProvider>;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for LLM providers
///
/// Note: API keys are handled securely - they are never serialized to
/// output and are redacted in debug output. Each provider converts the
/// key to SecretString internally for runtime protection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type: "openai", "anthropic"
    pub provider: String,
    /// API key
    /// Never serialized to output for security
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            api_key: None,
            api_base: None,
            timeout_secs: 300,
        }
    }
}

// =============================================================================
// LLM Provider Trait
// =============================================================================

/// LLM Provider trait for prose generation with usage metrics
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a complete response in one buffered call.
    ///
    /// All providers must populate usage metrics for cost tracking.
    async fn generate(&self, request: &GenerationRequest) -> Result<ProviderResponse>;

    /// Generate as a stream of chunks.
    ///
    /// Providers without native streaming must not implement this;
    /// callers check `supports_streaming` and fall back to `generate`.
    async fn generate_streaming(&self, request: &GenerationRequest) -> Result<ChunkStream> {
        let _ = request;
        Err(NovelError::LlmApi(format!(
            "provider '{}' does not support streaming",
            self.name()
        )))
    }

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Whether credentials are present for this provider
    fn is_configured(&self) -> bool;

    /// Whether `generate_streaming` is available
    fn supports_streaming(&self) -> bool {
        false
    }
}

/// Create a shared provider from configuration
pub fn create_provider(config: &ProviderConfig) -> Result<SharedProvider> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config.clone())?)),
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(config.clone())?)),
        _ => Err(NovelError::Config(format!(
            "Unknown provider: {}. Supported: openai, anthropic",
            config.provider
        ))),
    }
}

// =============================================================================
// Test Support
// =============================================================================


// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_merge() {
        let a = TokenUsage::new(1000, 2000);
        let b = TokenUsage::new(500, 1500);
        let merged = a.merge(&b);
        assert_eq!(merged.input_tokens, 1500);
        assert_eq!(merged.output_tokens, 3500);
        assert_eq!(merged.total(), 5000);
    }

    #[test]
    fn test_finish_reason_parse() {
        assert_eq!(FinishReason::parse("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::parse("end_turn"), FinishReason::Stop);
        assert_eq!(FinishReason::parse("max_tokens"), FinishReason::Length);
        assert_eq!(FinishReason::parse("length"), FinishReason::Length);
        assert_eq!(FinishReason::parse("weird"), FinishReason::Unknown);
    }

    #[test]
    fn test_provider_config_debug_redacts_key() {
        let config = ProviderConfig {
            provider: "openai".to_string(),
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_create_provider_unknown() {
        let config = ProviderConfig {
            provider: "nope".to_string(),
            ..Default::default()
        };
        assert!(create_provider(&config).is_err());
    }

    #[tokio::test]
    async fn test_mock_provider_scripted_failure() {
        use testutil::MockProvider;
        let provider = MockProvider::scripted(vec![
            Err(NovelError::LlmApi("boom".to_string())),
            Ok("recovered".to_string()),
        ]);
        let request = GenerationRequest {
            system: String::new(),
            prompt: "p".to_string(),
            model: "m".to_string(),
            max_tokens: 100,
            temperature: 0.7,
        };
        assert!(provider.generate(&request).await.is_err());
        let response = provider.generate(&request).await.unwrap();
        assert_eq!(response.content, "recovered");
        assert_eq!(provider.call_count(), 2);
    }
}
