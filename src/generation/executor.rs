//! Generation Execution
//!
//! Turns an assembled context into chapter prose through one or more
//! provider calls. Fast and Standard modes make a single call; Premium
//! makes a draft call followed by a refinement call at lower temperature
//! with an explicit editing instruction, summing usage and cost across
//! both passes.
//!
//! A failed refinement degrades to the draft with a warning instead of
//! failing the chapter. Cancellation is checked between the two passes.
//! Every completed call is recorded in the session metrics immediately,
//! so an abort after the draft still bills the draft.

use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::ai::metrics::SharedMetrics;
use crate::ai::pricing::{ModelCatalog, PricingTable, ProviderKind, QualityMode};
use crate::ai::provider::{
    ChunkStream, FinishReason, GenerationRequest, ProviderResponse, SharedProvider, StreamChunk,
    TokenUsage,
};
use crate::ai::tokenizer::TokenEstimator;
use crate::constants::generation as tuning;
use crate::generation::context::GenerationContext;
use crate::generation::prompts;
use crate::session::control::ControlHandle;
use crate::types::{NovelError, Result};

// =============================================================================
// Generation Result
// =============================================================================

/// The outcome of one chapter generation attempt, all passes included
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub content: String,
    pub word_count: u32,
    /// Usage summed across passes
    pub usage: TokenUsage,
    /// Cost summed across passes, USD
    pub cost_usd: f64,
    /// Provider calls that contributed to the content
    pub passes: u32,
    pub finish_reason: FinishReason,
    /// True when the premium refinement pass failed and the draft was
    /// returned instead
    pub refinement_degraded: bool,
    pub model: String,
}

// =============================================================================
// Generation Executor
// =============================================================================

pub struct GenerationExecutor {
    provider: SharedProvider,
    provider_kind: ProviderKind,
    catalog: ModelCatalog,
    pricing: PricingTable,
    metrics: SharedMetrics,
}

impl GenerationExecutor {
    pub fn new(
        provider: SharedProvider,
        provider_kind: ProviderKind,
        catalog: ModelCatalog,
        pricing: PricingTable,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            provider,
            provider_kind,
            catalog,
            pricing,
            metrics,
        }
    }

    /// Resolve the model for this mode, honoring an explicit override
    pub fn resolve_model(&self, mode: QualityMode, model_override: Option<&str>) -> Result<String> {
        if let Some(model) = model_override {
            return Ok(model.to_string());
        }
        self.catalog
            .select(self.provider_kind, mode)
            .map(str::to_string)
            .ok_or_else(|| {
                NovelError::Config(format!(
                    "no model configured for provider '{}' in {} mode",
                    self.provider_kind, mode
                ))
            })
    }

    /// Generate a chapter from its assembled context
    pub async fn generate(
        &self,
        context: &GenerationContext,
        mode: QualityMode,
        model_override: Option<&str>,
        control: &ControlHandle,
    ) -> Result<GenerationResult> {
        let user_prompt = prompts::draft_user_prompt(context);
        self.run(context, mode, user_prompt, model_override, control)
            .await
    }

    /// Regenerate a chapter against ranked revision instructions,
    /// optionally preserving named elements verbatim
    pub async fn generate_revision(
        &self,
        context: &GenerationContext,
        mode: QualityMode,
        previous_content: &str,
        instructions: &[String],
        preserve: &[String],
        model_override: Option<&str>,
        control: &ControlHandle,
    ) -> Result<GenerationResult> {
        let user_prompt =
            prompts::revision_user_prompt(context, previous_content, instructions, preserve);
        self.run(context, mode, user_prompt, model_override, control)
            .await
    }

    /// Generate as a stream of chunks.
    ///
    /// Providers without native streaming fall back to one buffered call
    /// whose content is yielded as a single chunk followed by a terminal
    /// chunk carrying the finish reason and usage. Streaming always runs
    /// a single pass; premium refinement is a buffered-only concern.
    pub async fn generate_streaming(
        &self,
        context: &GenerationContext,
        mode: QualityMode,
        model_override: Option<&str>,
    ) -> Result<ChunkStream> {
        let model = self.resolve_model(mode, model_override)?;
        let request = self.build_request(
            prompts::draft_system_prompt(),
            prompts::draft_user_prompt(context),
            &model,
            context.target_word_count,
            tuning::DRAFT_TEMPERATURE,
        );

        if self.provider.supports_streaming() {
            return self.provider.generate_streaming(&request).await;
        }

        debug!(
            provider = self.provider.name(),
            "Provider lacks streaming, using buffered fallback"
        );
        let response = self.call_with_retry(&request).await?;
        self.record(&model, &response);
        let chunks: Vec<Result<StreamChunk>> = vec![
            Ok(StreamChunk::delta(response.content)),
            Ok(StreamChunk::terminal(
                response.finish_reason,
                Some(response.usage),
            )),
        ];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    // -------------------------------------------------------------------------
    // Pipeline
    // -------------------------------------------------------------------------

    async fn run(
        &self,
        context: &GenerationContext,
        mode: QualityMode,
        user_prompt: String,
        model_override: Option<&str>,
        control: &ControlHandle,
    ) -> Result<GenerationResult> {
        let model = self.resolve_model(mode, model_override)?;
        let request = self.build_request(
            prompts::draft_system_prompt(),
            user_prompt,
            &model,
            context.target_word_count,
            tuning::DRAFT_TEMPERATURE,
        );

        info!(
            chapter = context.chapter_number,
            %model,
            mode = %mode,
            "Generating chapter"
        );
        let draft = self.call_with_retry(&request).await?;
        self.record(&model, &draft);
        let draft_cost = self.pricing.cost_of_usage(&model, &draft.usage);

        if !mode.is_multi_pass() {
            return Ok(Self::result_from(draft, draft_cost, 1, false, &model));
        }

        // Cooperative checkpoint between the two premium passes
        control.checkpoint()?;

        let refinement_request = self.build_request(
            prompts::refinement_system_prompt(),
            prompts::refinement_user_prompt(context, &draft.content),
            &model,
            context.target_word_count,
            tuning::REFINEMENT_TEMPERATURE,
        );
        match self.call_with_retry(&refinement_request).await {
            Ok(refined) => {
                self.record(&model, &refined);
                let total_cost =
                    draft_cost + self.pricing.cost_of_usage(&model, &refined.usage);
                let usage = draft.usage.merge(&refined.usage);
                let mut result = Self::result_from(refined, total_cost, 2, false, &model);
                result.usage = usage;
                Ok(result)
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!(
                    chapter = context.chapter_number,
                    error = %e,
                    "Refinement pass failed, keeping draft"
                );
                Ok(Self::result_from(draft, draft_cost, 1, true, &model))
            }
        }
    }

    fn build_request(
        &self,
        system: String,
        prompt: String,
        model: &str,
        target_words: u32,
        temperature: f64,
    ) -> GenerationRequest {
        GenerationRequest {
            system,
            prompt,
            model: model.to_string(),
            max_tokens: TokenEstimator::output_ceiling(target_words),
            temperature,
        }
    }

    async fn call_with_retry(&self, request: &GenerationRequest) -> Result<ProviderResponse> {
        (|| async { self.provider.generate(request).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(tuning::RETRY_BASE_DELAY_MS))
                    .with_max_delay(Duration::from_secs(tuning::RETRY_MAX_DELAY_SECS))
                    .with_max_times(tuning::MAX_PROVIDER_RETRIES),
            )
            .when(|e: &NovelError| e.is_recoverable())
            .notify(|e, delay| {
                warn!(error = %e, delay_ms = delay.as_millis() as u64, "Retrying provider call")
            })
            .await
    }

    /// Bill one completed call into the session metrics
    fn record(&self, model: &str, response: &ProviderResponse) {
        let cost = self.pricing.cost_of_usage(model, &response.usage);
        self.metrics
            .record_call(&response.usage, cost, response.timing.total_ms);
    }

    fn result_from(
        response: ProviderResponse,
        cost_usd: f64,
        passes: u32,
        refinement_degraded: bool,
        model: &str,
    ) -> GenerationResult {
        GenerationResult {
            word_count: response.content.split_whitespace().count() as u32,
            content: response.content,
            usage: response.usage,
            cost_usd,
            passes,
            finish_reason: response.finish_reason,
            refinement_degraded,
            model: model.to_string(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::metrics::create_shared_metrics;
    use crate::ai::provider::testutil::MockProvider;
    use crate::generation::context::{ContextSection, SectionKind};
    use futures::StreamExt;
    use std::sync::Arc;

    fn context() -> GenerationContext {
        GenerationContext {
            chapter_number: 1,
            chapter_title: "One".to_string(),
            target_word_count: 3000,
            sections: vec![ContextSection {
                kind: SectionKind::Metadata,
                label: "Book".to_string(),
                text: "Book: Test".to_string(),
                tokens: 3,
            }],
            total_tokens: 3,
            max_tokens: 8000,
        }
    }

    fn executor(provider: MockProvider) -> (GenerationExecutor, SharedMetrics) {
        let metrics = create_shared_metrics("test-session");
        let exec = GenerationExecutor::new(
            Arc::new(provider),
            ProviderKind::OpenAi,
            ModelCatalog::builtin(),
            PricingTable::builtin(),
            metrics.clone(),
        );
        (exec, metrics)
    }

    #[tokio::test]
    async fn test_fast_mode_single_pass() {
        let provider = MockProvider::returning("Prose of the chapter.");
        let (exec, _metrics) = executor(provider);
        let control = ControlHandle::new();
        let result = exec
            .generate(&context(), QualityMode::Fast, None, &control)
            .await
            .unwrap();
        assert_eq!(result.passes, 1);
        assert_eq!(result.content, "Prose of the chapter.");
        assert_eq!(result.word_count, 4);
        assert!(!result.refinement_degraded);
        assert_eq!(result.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_premium_sums_usage_and_cost() {
        let provider = MockProvider::scripted(vec![
            Ok("the draft".to_string()),
            Ok("the refined chapter".to_string()),
        ])
        .with_usage(TokenUsage::new(1000, 500));
        let (exec, metrics) = executor(provider);
        let control = ControlHandle::new();
        let result = exec
            .generate(&context(), QualityMode::Premium, None, &control)
            .await
            .unwrap();

        assert_eq!(result.passes, 2);
        assert_eq!(result.content, "the refined chapter");
        assert_eq!(result.usage, TokenUsage::new(2000, 1000));

        // premium cost equals draft cost plus refinement cost
        let table = PricingTable::builtin();
        let per_call = table.estimate_cost("gpt-4o", 1000, 500);
        assert!((result.cost_usd - 2.0 * per_call).abs() < 1e-9);
        assert!((metrics.total_cost_usd() - result.cost_usd).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_premium_refinement_failure_degrades_to_draft() {
        let provider = MockProvider::scripted(vec![
            Ok("the draft".to_string()),
            Err(NovelError::LlmApi("refinement blew up".to_string())),
        ]);
        let (exec, _metrics) = executor(provider);
        let control = ControlHandle::new();
        let result = exec
            .generate(&context(), QualityMode::Premium, None, &control)
            .await
            .unwrap();
        assert_eq!(result.content, "the draft");
        assert_eq!(result.passes, 1);
        assert!(result.refinement_degraded);
    }

    #[tokio::test]
    async fn test_cancel_between_premium_passes() {
        let provider = MockProvider::returning("the draft");
        let (exec, metrics) = executor(provider);
        let control = ControlHandle::new();
        control.request_cancel();

        let err = exec
            .generate(&context(), QualityMode::Premium, None, &control)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());

        // only the completed draft call was billed
        let summary = metrics.summary();
        assert_eq!(summary.api_calls, 1);
        let per_call = PricingTable::builtin().estimate_cost("gpt-4o", 1000, 500);
        assert!((summary.total_cost_usd - per_call).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_streaming_fallback_yields_single_chunk() {
        let provider = MockProvider::returning("buffered prose");
        let (exec, _metrics) = executor(provider);
        let stream = exec
            .generate_streaming(&context(), QualityMode::Fast, None)
            .await
            .unwrap();
        let chunks: Vec<StreamChunk> = stream.map(|c| c.unwrap()).collect::<Vec<_>>().await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].delta, "buffered prose");
        assert!(chunks[1].is_final);
        assert_eq!(chunks[1].finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn test_streaming_passthrough_when_supported() {
        let provider = MockProvider::returning("streamed prose").with_streaming();
        let (exec, _metrics) = executor(provider);
        let stream = exec
            .generate_streaming(&context(), QualityMode::Fast, None)
            .await
            .unwrap();
        let chunks: Vec<StreamChunk> = stream.map(|c| c.unwrap()).collect::<Vec<_>>().await;
        assert_eq!(chunks[0].delta, "streamed prose");
        assert!(chunks.last().unwrap().is_final);
    }

    #[tokio::test]
    async fn test_model_override_wins() {
        let provider = MockProvider::returning("text");
        let (exec, _metrics) = executor(provider);
        let control = ControlHandle::new();
        let result = exec
            .generate(&context(), QualityMode::Fast, Some("custom-model"), &control)
            .await
            .unwrap();
        assert_eq!(result.model, "custom-model");
    }
}
