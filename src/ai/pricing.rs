//! Model Selection and Cost Estimation
//!
//! Maps (provider, quality mode) to a concrete model id and estimates
//! call cost from a per-model pricing table. Both tables are plain
//! injected values, not globals, so tests substitute their own.
//!
//! Unknown combinations fall back to a per-provider default model;
//! unknown model ids are priced at a conservative default tier so a
//! missing table entry overestimates rather than underestimates spend.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ai::provider::TokenUsage;
use crate::constants::pricing::{DEFAULT_CONTEXT_WINDOW, DEFAULT_INPUT_PRICE, DEFAULT_OUTPUT_PRICE};

// =============================================================================
// Quality Mode / Provider Kind
// =============================================================================

/// Generation quality tier selected per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityMode {
    Fast,
    Standard,
    Premium,
}

impl QualityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Standard => "standard",
            Self::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fast" => Some(Self::Fast),
            "standard" => Some(Self::Standard),
            "premium" | "high_quality" => Some(Self::Premium),
            _ => None,
        }
    }

    /// Premium runs a draft pass plus a refinement pass
    pub fn is_multi_pass(&self) -> bool {
        matches!(self, Self::Premium)
    }
}

impl std::fmt::Display for QualityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Model Catalog
// =============================================================================

/// Immutable (provider, mode) -> model id table with per-provider
/// defaults and per-model context windows
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: HashMap<(ProviderKind, QualityMode), String>,
    defaults: HashMap<ProviderKind, String>,
    context_windows: HashMap<String, usize>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self {
            models: HashMap::new(),
            defaults: HashMap::new(),
            context_windows: HashMap::new(),
        }
    }

    /// Built-in catalog covering the supported providers
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog
            .register(ProviderKind::OpenAi, QualityMode::Fast, "gpt-4o-mini")
            .register(ProviderKind::OpenAi, QualityMode::Standard, "gpt-4o")
            .register(ProviderKind::OpenAi, QualityMode::Premium, "gpt-4o")
            .register_default(ProviderKind::OpenAi, "gpt-4o-mini")
            .register(
                ProviderKind::Anthropic,
                QualityMode::Fast,
                "claude-3-5-haiku-20241022",
            )
            .register(
                ProviderKind::Anthropic,
                QualityMode::Standard,
                "claude-3-5-sonnet-20241022",
            )
            .register(
                ProviderKind::Anthropic,
                QualityMode::Premium,
                "claude-3-opus-20240229",
            )
            .register_default(ProviderKind::Anthropic, "claude-3-5-sonnet-20241022")
            .register_context_window("gpt-4o-mini", 128_000)
            .register_context_window("gpt-4o", 128_000)
            .register_context_window("claude-3-5-haiku-20241022", 200_000)
            .register_context_window("claude-3-5-sonnet-20241022", 200_000)
            .register_context_window("claude-3-opus-20240229", 200_000);
        catalog
    }

    pub fn register(
        &mut self,
        provider: ProviderKind,
        mode: QualityMode,
        model: impl Into<String>,
    ) -> &mut Self {
        self.models.insert((provider, mode), model.into());
        self
    }

    pub fn register_default(&mut self, provider: ProviderKind, model: impl Into<String>) -> &mut Self {
        self.defaults.insert(provider, model.into());
        self
    }

    pub fn register_context_window(&mut self, model: impl Into<String>, window: usize) -> &mut Self {
        self.context_windows.insert(model.into(), window);
        self
    }

    /// Resolve the model for a (provider, mode) pair, falling back to
    /// the provider default for unknown combinations
    pub fn select(&self, provider: ProviderKind, mode: QualityMode) -> Option<&str> {
        self.models
            .get(&(provider, mode))
            .or_else(|| self.defaults.get(&provider))
            .map(String::as_str)
    }

    /// Context window for a model id
    pub fn context_window(&self, model: &str) -> usize {
        self.context_windows
            .get(model)
            .copied()
            .unwrap_or(DEFAULT_CONTEXT_WINDOW)
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

// =============================================================================
// Pricing Table
// =============================================================================

/// Per-1K-token prices for one model, USD
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

/// Immutable model id -> pricing table with a conservative default tier
#[derive(Debug, Clone)]
pub struct PricingTable {
    prices: HashMap<String, ModelPricing>,
    default_tier: ModelPricing,
}

impl PricingTable {
    pub fn new() -> Self {
        Self {
            prices: HashMap::new(),
            default_tier: ModelPricing {
                input_per_1k: DEFAULT_INPUT_PRICE,
                output_per_1k: DEFAULT_OUTPUT_PRICE,
            },
        }
    }

    /// Built-in prices for the catalog models
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table
            .register("gpt-4o-mini", 0.00015, 0.0006)
            .register("gpt-4o", 0.0025, 0.01)
            .register("claude-3-5-haiku-20241022", 0.0008, 0.004)
            .register("claude-3-5-sonnet-20241022", 0.003, 0.015)
            .register("claude-3-opus-20240229", 0.015, 0.075);
        table
    }

    pub fn register(
        &mut self,
        model: impl Into<String>,
        input_per_1k: f64,
        output_per_1k: f64,
    ) -> &mut Self {
        self.prices.insert(
            model.into(),
            ModelPricing {
                input_per_1k,
                output_per_1k,
            },
        );
        self
    }

    pub fn price_for(&self, model: &str) -> ModelPricing {
        self.prices.get(model).copied().unwrap_or(self.default_tier)
    }

    /// Cost in USD for a single call
    pub fn estimate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let price = self.price_for(model);
        (input_tokens as f64 / 1000.0) * price.input_per_1k
            + (output_tokens as f64 / 1000.0) * price.output_per_1k
    }

    /// Cost in USD for a recorded usage
    pub fn cost_of_usage(&self, model: &str, usage: &TokenUsage) -> f64 {
        self.estimate_cost(model, usage.input_tokens, usage.output_tokens)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_known_combination() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(
            catalog.select(ProviderKind::OpenAi, QualityMode::Fast),
            Some("gpt-4o-mini")
        );
        assert_eq!(
            catalog.select(ProviderKind::Anthropic, QualityMode::Premium),
            Some("claude-3-opus-20240229")
        );
    }

    #[test]
    fn test_select_falls_back_to_provider_default() {
        let mut catalog = ModelCatalog::new();
        catalog.register_default(ProviderKind::OpenAi, "gpt-4o-mini");
        assert_eq!(
            catalog.select(ProviderKind::OpenAi, QualityMode::Premium),
            Some("gpt-4o-mini")
        );
        assert_eq!(catalog.select(ProviderKind::Anthropic, QualityMode::Fast), None);
    }

    #[test]
    fn test_context_window_default() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(catalog.context_window("claude-3-opus-20240229"), 200_000);
        assert_eq!(
            catalog.context_window("some-unknown-model"),
            crate::constants::pricing::DEFAULT_CONTEXT_WINDOW
        );
    }

    #[test]
    fn test_estimate_cost() {
        let table = PricingTable::builtin();
        // 1000 input + 2000 output on gpt-4o: 0.0025 + 2 * 0.01
        let cost = table.estimate_cost("gpt-4o", 1000, 2000);
        assert!((cost - 0.0225).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_uses_conservative_tier() {
        let table = PricingTable::builtin();
        let cost = table.estimate_cost("mystery-model", 1000, 1000);
        let expected = crate::constants::pricing::DEFAULT_INPUT_PRICE
            + crate::constants::pricing::DEFAULT_OUTPUT_PRICE;
        assert!((cost - expected).abs() < 1e-9);
    }

    #[test]
    fn test_quality_mode_parse() {
        assert_eq!(QualityMode::parse("premium"), Some(QualityMode::Premium));
        assert_eq!(QualityMode::parse("high_quality"), Some(QualityMode::Premium));
        assert_eq!(QualityMode::parse("nope"), None);
        assert!(QualityMode::Premium.is_multi_pass());
        assert!(!QualityMode::Fast.is_multi_pass());
    }
}
