//! AI Integration Layer
//!
//! LLM provider backends, token estimation, model selection, pricing,
//! and per-session usage metrics.

pub mod metrics;
pub mod pricing;
pub mod provider;
pub mod tokenizer;

pub use metrics::{MetricsCollector, MetricsSummary, SharedMetrics, create_shared_metrics};
pub use pricing::{ModelCatalog, ModelPricing, PricingTable, ProviderKind, QualityMode};
pub use provider::{
    AnthropicProvider, ChunkStream, ErrorCategory, ErrorClassifier, FinishReason,
    GenerationRequest, LlmError, LlmProvider, OpenAiProvider, ProviderConfig, ProviderResponse,
    ResponseMetadata, ResponseTiming, SharedProvider, StreamChunk, TokenUsage, create_provider,
};
pub use tokenizer::TokenEstimator;
