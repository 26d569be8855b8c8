//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Token estimation constants
pub mod tokens {
    /// Fixed characters-per-token heuristic for prose
    pub const CHARS_PER_TOKEN: usize = 4;

    /// Approximate tokens per English word, used to size output ceilings
    pub const TOKENS_PER_WORD: f64 = 1.3;

    /// Safety multiplier on the output token ceiling so a chapter is not
    /// cut off mid-sentence by a tight max_tokens
    pub const OUTPUT_SAFETY_MULTIPLIER: f64 = 1.2;

    /// Marker appended to truncated text
    pub const ELLIPSIS: &str = "...";
}

/// Context assembly constants
pub mod context {
    /// Default total token budget for an assembled context
    pub const DEFAULT_MAX_TOKENS: usize = 8_000;

    /// Per-category token caps
    pub const POV_CHARACTER_CAP: usize = 600;
    pub const LINKED_CHARACTER_CAP: usize = 400;
    pub const PRINCIPAL_CHARACTER_CAP: usize = 300;
    pub const LOCATION_CAP: usize = 300;
    pub const STORY_SO_FAR_CAP: usize = 2_000;
    pub const PLOT_CAP: usize = 600;
    pub const STYLE_CAP: usize = 300;
    pub const CONTINUITY_CAP: usize = 800;

    /// How many protagonists/antagonists are packed beyond linked characters
    pub const TOP_PRINCIPALS: usize = 3;

    /// How many previous chapter summaries feed the story-so-far section
    pub const RECENT_CHAPTER_SUMMARIES: usize = 5;
}

/// Generation pipeline constants
pub mod generation {
    /// Maximum generation attempts per chapter (initial + revisions)
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Quality score below which a revision is requested (0-100)
    pub const DEFAULT_QUALITY_THRESHOLD: f64 = 70.0;

    /// Sampling temperature for the initial draft
    pub const DRAFT_TEMPERATURE: f64 = 0.9;

    /// Sampling temperature for the premium refinement pass
    pub const REFINEMENT_TEMPERATURE: f64 = 0.4;

    /// Maximum retries for transient provider errors
    pub const MAX_PROVIDER_RETRIES: usize = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 500;

    /// Maximum delay between retries (seconds)
    pub const RETRY_MAX_DELAY_SECS: u64 = 30;
}

/// Quality evaluation constants
pub mod quality {
    /// Fixed dimension weights for the overall score. Must sum to 1.0.
    pub const WEIGHT_NARRATIVE: f64 = 0.20;
    pub const WEIGHT_CHARACTER: f64 = 0.20;
    pub const WEIGHT_PLOT: f64 = 0.20;
    pub const WEIGHT_STYLE: f64 = 0.15;
    pub const WEIGHT_PACING: f64 = 0.15;
    pub const WEIGHT_DIALOGUE: f64 = 0.10;

    /// Default cap on ranked revision instructions
    pub const DEFAULT_MAX_INSTRUCTIONS: usize = 5;
}

/// Pricing constants
pub mod pricing {
    /// Conservative per-1K-token prices applied to unknown model ids (USD)
    pub const DEFAULT_INPUT_PRICE: f64 = 0.015;
    pub const DEFAULT_OUTPUT_PRICE: f64 = 0.075;

    /// Context window assumed for unknown model ids
    pub const DEFAULT_CONTEXT_WINDOW: usize = 128_000;
}
