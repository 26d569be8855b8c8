//! OpenAI API Provider
//!
//! Prose generation through OpenAI's Chat Completions API, buffered or
//! streamed over SSE. Returns ProviderResponse with token usage metrics
//! for cost tracking.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    ChunkStream, FinishReason, GenerationRequest, LlmProvider, ProviderConfig, ProviderResponse,
    ResponseMetadata, ResponseTiming, StreamChunk, TokenUsage,
};
use crate::types::{ErrorClassifier, NovelError, Result};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI API Provider with secure API key handling
pub struct OpenAiProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                NovelError::Config(
                    "OpenAI API key not found. Set OPENAI_API_KEY env var or provide in config"
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

    fn build_body(&self, request: &GenerationRequest, stream: bool) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: request.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.prompt.clone(),
                },
            ],
            temperature: request.temperature,
            max_tokens: Some(request.max_tokens),
            stream,
            stream_options: stream.then(|| StreamOptions {
                include_usage: true,
            }),
        }
    }

    async fn post_completion(&self, body: &ChatCompletionRequest) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.api_base);
        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| NovelError::LlmApi(format!("OpenAI request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(NovelError::Llm(ErrorClassifier::classify_http_status(
                status, &text, "openai",
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<ProviderResponse> {
        info!(model = %request.model, temperature = request.temperature, "Generating with OpenAI");

        let start_time = Instant::now();
        let body = self.build_body(request, false);
        let response = self.post_completion(&body).await?;
        let elapsed = start_time.elapsed();

        let response_body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| NovelError::LlmApi(format!("Failed to parse OpenAI response: {e}")))?;

        let usage = response_body
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let choice = response_body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| NovelError::LlmApi("No choices in OpenAI response".to_string()))?;

        let content = choice
            .message
            .and_then(|m| m.content)
            .ok_or_else(|| NovelError::LlmApi("No content in OpenAI response".to_string()))?;

        let finish_reason = choice
            .finish_reason
            .as_deref()
            .map(FinishReason::parse)
            .unwrap_or(FinishReason::Unknown);

        debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Received response from OpenAI"
        );

        Ok(ProviderResponse {
            content,
            usage,
            finish_reason,
            timing: ResponseTiming::from_duration(elapsed),
            metadata: ResponseMetadata {
                model: request.model.clone(),
                provider: "openai".to_string(),
            },
        })
    }

    async fn generate_streaming(&self, request: &GenerationRequest) -> Result<ChunkStream> {
        info!(model = %request.model, "Streaming generation with OpenAI");

        let body = self.build_body(request, true);
        let response = self.post_completion(&body).await?;
        Ok(sse_chunk_stream(response.bytes_stream()))
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.expose_secret().is_empty()
    }

    fn supports_streaming(&self) -> bool {
        true
    }
}

// =============================================================================
// SSE Decoding
// =============================================================================

struct SseState<S> {
    inner: S,
    buf: String,
    pending: VecDeque<StreamChunk>,
    finish_reason: Option<FinishReason>,
    usage: Option<TokenUsage>,
    finished: bool,
}

impl<S> SseState<S> {
    /// Split complete `data:` lines out of the buffer into chunks
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            let line = line.trim();
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            if data == "[DONE]" {
                self.pending.push_back(StreamChunk::terminal(
                    self.finish_reason.unwrap_or(FinishReason::Unknown),
                    self.usage,
                ));
                self.finished = true;
                return;
            }
            let Ok(event) = serde_json::from_str::<StreamEvent>(data) else {
                debug!("Skipping unparseable stream event");
                continue;
            };
            if let Some(usage) = event.usage {
                self.usage = Some(TokenUsage::new(usage.prompt_tokens, usage.completion_tokens));
            }
            for choice in event.choices {
                if let Some(reason) = choice.finish_reason.as_deref() {
                    self.finish_reason = Some(FinishReason::parse(reason));
                }
                if let Some(text) = choice.delta.and_then(|d| d.content) {
                    if !text.is_empty() {
                        self.pending.push_back(StreamChunk::delta(text));
                    }
                }
            }
        }
    }
}

/// Decode an SSE byte stream into prose chunks, forwarding finish
/// reason and usage on the terminal chunk.
fn sse_chunk_stream<S, B>(byte_stream: S) -> ChunkStream
where
    S: futures::Stream<Item = std::result::Result<B, reqwest::Error>> + Send + Unpin + 'static,
    B: AsRef<[u8]>,
{
    let state = SseState {
        inner: byte_stream,
        buf: String::new(),
        pending: VecDeque::new(),
        finish_reason: None,
        usage: None,
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(chunk) = st.pending.pop_front() {
                return Some((Ok(chunk), st));
            }
            if st.finished {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(bytes)) => {
                    st.buf.push_str(&String::from_utf8_lossy(bytes.as_ref()));
                    st.drain_lines();
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((
                        Err(NovelError::LlmApi(format!("OpenAI stream failed: {e}"))),
                        st,
                    ));
                }
                None => {
                    // Stream ended without [DONE]; close out with what we have
                    st.pending.push_back(StreamChunk::terminal(
                        st.finish_reason.unwrap_or(FinishReason::Unknown),
                        st.usage,
                    ));
                    st.finished = true;
                }
            }
        }
    }))
}

// =============================================================================
// API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sse_bytes(events: &[&str]) -> Vec<std::result::Result<Vec<u8>, reqwest::Error>> {
        events
            .iter()
            .map(|e| Ok(format!("data: {e}\n\n").into_bytes()))
            .collect()
    }

    #[tokio::test]
    async fn test_sse_stream_decodes_deltas_and_terminal() {
        let events = sse_bytes(&[
            r#"{"choices":[{"delta":{"content":"Once upon"},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{"content":" a time"},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":4}}"#,
            "[DONE]",
        ]);
        let stream = sse_chunk_stream(futures::stream::iter(events));
        let chunks: Vec<_> = stream.collect::<Vec<_>>().await;

        let chunks: Vec<StreamChunk> = chunks.into_iter().map(|c| c.unwrap()).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].delta, "Once upon");
        assert_eq!(chunks[1].delta, " a time");
        assert!(chunks[2].is_final);
        assert_eq!(chunks[2].finish_reason, Some(FinishReason::Stop));
        assert_eq!(chunks[2].usage, Some(TokenUsage::new(10, 4)));
    }

    #[tokio::test]
    async fn test_sse_stream_handles_split_lines() {
        let events: Vec<std::result::Result<Vec<u8>, reqwest::Error>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"con".to_vec()),
            Ok(b"tent\":\"hello\"},\"finish_reason\":null}]}\n\ndata: [DONE]\n\n".to_vec()),
        ];
        let stream = sse_chunk_stream(futures::stream::iter(events));
        let chunks: Vec<StreamChunk> = stream.map(|c| c.unwrap()).collect::<Vec<_>>().await;
        assert_eq!(chunks[0].delta, "hello");
        assert!(chunks[1].is_final);
    }

    #[test]
    fn test_missing_key_is_config_error() {
        // guard against ambient credentials leaking into the test
        if std::env::var("OPENAI_API_KEY").is_ok() {
            return;
        }
        let config = ProviderConfig {
            provider: "openai".to_string(),
            api_key: None,
            ..Default::default()
        };
        assert!(matches!(
            OpenAiProvider::new(config),
            Err(NovelError::Config(_))
        ));
    }
}
