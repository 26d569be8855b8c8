//! Anthropic API Provider
//!
//! Prose generation through the Anthropic Messages API. Buffered only;
//! callers that want streaming fall back to a single buffered call.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    FinishReason, GenerationRequest, LlmProvider, ProviderConfig, ProviderResponse,
    ResponseMetadata, ResponseTiming, TokenUsage,
};
use crate::types::{ErrorClassifier, NovelError, Result};

const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Anthropic API Provider with secure API key handling
pub struct AnthropicProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or_else(|| {
                NovelError::Config(
                    "Anthropic API key not found. Set ANTHROPIC_API_KEY env var or provide in config"
                        .to_string(),
                )
            })?;

        let api_base = config
            .api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NovelError::LlmApi(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base,
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<ProviderResponse> {
        info!(model = %request.model, temperature = request.temperature, "Generating with Anthropic");

        let body = MessagesRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
        };

        let start_time = Instant::now();
        let url = format!("{}/messages", self.api_base);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| NovelError::LlmApi(format!("Anthropic request failed: {e}")))?;
        let elapsed = start_time.elapsed();

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(NovelError::Llm(ErrorClassifier::classify_http_status(
                status, &text, "anthropic",
            )));
        }

        let response_body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| NovelError::LlmApi(format!("Failed to parse Anthropic response: {e}")))?;

        let content = response_body
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        if content.is_empty() {
            return Err(NovelError::LlmApi(
                "No text content in Anthropic response".to_string(),
            ));
        }

        let usage = TokenUsage::new(
            response_body.usage.input_tokens,
            response_body.usage.output_tokens,
        );
        let finish_reason = response_body
            .stop_reason
            .as_deref()
            .map(FinishReason::parse)
            .unwrap_or(FinishReason::Unknown);

        debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Received response from Anthropic"
        );

        Ok(ProviderResponse {
            content,
            usage,
            finish_reason,
            timing: ResponseTiming::from_duration(elapsed),
            metadata: ResponseMetadata {
                model: request.model.clone(),
                provider: "anthropic".to_string(),
            },
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.expose_secret().is_empty()
    }
}

// =============================================================================
// API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: ApiUsage,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u64,
    output_tokens: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_config_error() {
        if std::env::var("ANTHROPIC_API_KEY").is_ok() {
            return;
        }
        let config = ProviderConfig {
            provider: "anthropic".to_string(),
            api_key: None,
            ..Default::default()
        };
        assert!(matches!(
            AnthropicProvider::new(config),
            Err(NovelError::Config(_))
        ));
    }

    #[test]
    fn test_buffered_only() {
        // streaming support is intentionally absent; the executor falls
        // back to one buffered call and yields it as a single chunk
        let config = ProviderConfig {
            provider: "anthropic".to_string(),
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        let provider = AnthropicProvider::new(config).unwrap();
        assert!(!provider.supports_streaming());
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "content": [{"type": "text", "text": "The rain had not stopped."}],
            "usage": {"input_tokens": 120, "output_tokens": 8},
            "stop_reason": "end_turn"
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.content[0].text.as_deref(), Some("The rain had not stopped."));
        assert_eq!(parsed.usage.input_tokens, 120);
        assert_eq!(FinishReason::parse(parsed.stop_reason.as_deref().unwrap()), FinishReason::Stop);
    }
}
