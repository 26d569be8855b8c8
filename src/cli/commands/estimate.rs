//! `estimate` Command
//!
//! Projects token usage and cost for a blueprint before spending
//! anything: per chapter, the input side is bounded by the context
//! budget and the output side by the word-target ceiling, doubled for
//! the premium two-pass pipeline.

use std::path::PathBuf;

use crate::ai::{ModelCatalog, PricingTable, ProviderKind, QualityMode, TokenEstimator};
use crate::cli::output::Output;
use crate::cli::util;
use crate::config::Config;
use crate::types::{NovelError, Result};

pub struct EstimateOptions {
    pub blueprint: PathBuf,
    pub mode: Option<QualityMode>,
}

pub fn run(mut config: Config, options: EstimateOptions) -> Result<()> {
    if let Some(mode) = options.mode {
        config.generation.mode = mode;
    }
    let mode = config.generation.mode;

    let output = Output::new();
    let blueprint = util::load_blueprint(&options.blueprint)?;
    let kind = ProviderKind::parse(&config.llm.provider)
        .ok_or_else(|| NovelError::Config(format!("Unknown provider: {}", config.llm.provider)))?;

    let catalog = ModelCatalog::default();
    let pricing = PricingTable::default();
    let model = match &config.llm.model {
        Some(model) => model.clone(),
        None => catalog
            .select(kind, mode)
            .ok_or_else(|| {
                NovelError::Config(format!("no model for provider {}", config.llm.provider))
            })?
            .to_string(),
    };

    let passes: u64 = if mode.is_multi_pass() { 2 } else { 1 };
    let input_per_call = config.context.max_tokens as u64;

    let mut total_input = 0u64;
    let mut total_output = 0u64;
    let mut total_words = 0u64;
    for plan in blueprint.chapter_plans() {
        total_input += input_per_call * passes;
        total_output += u64::from(TokenEstimator::output_ceiling(plan.target_word_count)) * passes;
        total_words += u64::from(plan.target_word_count);
    }
    let cost = pricing.estimate_cost(&model, total_input, total_output);

    output.header(&format!("Estimate for \"{}\"", blueprint.title));
    output.info(&format!(
        "{} chapters, {} target words",
        blueprint.chapter_count(),
        total_words,
    ));
    output.info(&format!(
        "{mode} mode, model {model}, {passes} pass(es) per chapter"
    ));
    output.info(&format!(
        "~{total_input} input tokens, ~{total_output} output tokens"
    ));
    output.success(&format!("Projected cost: ${cost:.2}"));
    output.info("Input tokens assume a full context budget per call; actual cost is usually lower");
    Ok(())
}
