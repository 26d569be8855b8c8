//! Generation Context Assembly
//!
//! Builds the bounded prompt context for one chapter: fixed metadata and
//! chapter instructions, then narrative material packed in strict
//! priority order under a total token budget with per-category caps.
//!
//! Priority order is significance, not size: POV character first, then
//! explicitly linked characters, remaining principals, locations, the
//! story so far, continuity notes, plot threads, style. Once a candidate
//! in a category does not fit, the rest of that category is skipped
//! rather than cherry-picking smaller entries.
//!
//! A context is immutable once built; the optimize pass produces a new
//! instance instead of mutating in place.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ai::tokenizer::TokenEstimator;
use crate::constants::context as caps;
use crate::types::{Blueprint, ChapterPlan, NovelError, Result};

// =============================================================================
// Context Types
// =============================================================================

/// Category a packed section belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Metadata,
    Instructions,
    PovCharacter,
    LinkedCharacter,
    PrincipalCharacter,
    Location,
    StorySoFar,
    Continuity,
    Plot,
    Style,
}

/// One packed section of the assembled context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSection {
    pub kind: SectionKind,
    pub label: String,
    pub text: String,
    pub tokens: usize,
}

impl ContextSection {
    fn new(kind: SectionKind, label: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let tokens = TokenEstimator::estimate(&text);
        Self {
            kind,
            label: label.into(),
            text,
            tokens,
        }
    }
}

/// The assembled, budget-bounded context for one chapter attempt.
///
/// Created per attempt and discarded after use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationContext {
    pub chapter_number: u32,
    pub chapter_title: String,
    pub target_word_count: u32,
    pub sections: Vec<ContextSection>,
    /// Sum of section token estimates
    pub total_tokens: usize,
    /// Budget this context was assembled under
    pub max_tokens: usize,
}

impl GenerationContext {
    pub fn section(&self, kind: SectionKind) -> Option<&ContextSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn sections_of(&self, kind: SectionKind) -> Vec<&ContextSection> {
        self.sections.iter().filter(|s| s.kind == kind).collect()
    }

    pub fn has_section(&self, kind: SectionKind) -> bool {
        self.section(kind).is_some()
    }

    /// Render the packed sections as the user prompt
    pub fn render_prompt(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            out.push_str("## ");
            out.push_str(&section.label);
            out.push('\n');
            out.push_str(&section.text);
            out.push_str("\n\n");
        }
        out
    }
}

/// Summary of an already-finalized chapter, input to story-so-far
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviousChapter {
    pub number: u32,
    pub title: String,
    pub summary: String,
}

/// Assembly tuning, injected at construction
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Total token budget for the assembled context
    pub max_tokens: usize,
    /// Protagonists/antagonists packed beyond explicitly linked characters
    pub top_principals: usize,
    /// Previous chapter summaries considered for the story so far
    pub recent_summaries: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            max_tokens: caps::DEFAULT_MAX_TOKENS,
            top_principals: caps::TOP_PRINCIPALS,
            recent_summaries: caps::RECENT_CHAPTER_SUMMARIES,
        }
    }
}

// =============================================================================
// Context Assembler
// =============================================================================

pub struct ContextAssembler {
    options: ContextOptions,
}

impl ContextAssembler {
    pub fn new(options: ContextOptions) -> Self {
        Self { options }
    }

    /// Assemble the context for one chapter.
    ///
    /// `previous` holds summaries of finalized chapters in book order;
    /// empty is valid (chapter 1). `continuity` is the compressed
    /// continuity block built by the continuity tracker, if any.
    pub fn assemble(
        &self,
        blueprint: &Blueprint,
        chapter_number: u32,
        previous: &[PreviousChapter],
        continuity: Option<&str>,
    ) -> Result<GenerationContext> {
        let plan = blueprint.chapter_plan(chapter_number).ok_or_else(|| {
            NovelError::context_build(chapter_number, "chapter is not in the blueprint")
        })?;
        let pov = blueprint.character(&plan.pov_character).ok_or_else(|| {
            NovelError::context_build(
                chapter_number,
                format!(
                    "POV character '{}' is not in the character bible",
                    plan.pov_character
                ),
            )
        })?;

        let budget = self.options.max_tokens;
        let mut sections = Vec::new();
        let mut total = 0usize;

        // Fixed sections, always included
        let metadata = self.metadata_section(blueprint, plan);
        total += metadata.tokens;
        sections.push(metadata);
        let instructions = self.instructions_section(plan);
        total += instructions.tokens;
        sections.push(instructions);

        let mut push_if_fits = |section: ContextSection, total: &mut usize| -> bool {
            if *total + section.tokens <= budget {
                *total += section.tokens;
                sections.push(section);
                true
            } else {
                false
            }
        };

        // POV character, highest narrative priority
        push_if_fits(
            ContextSection::new(
                SectionKind::PovCharacter,
                format!("POV Character: {}", pov.name),
                Self::capped(&Self::character_excerpt(pov), caps::POV_CHARACTER_CAP),
            ),
            &mut total,
        );

        // Explicitly linked characters
        for name in &plan.featured_characters {
            if name.eq_ignore_ascii_case(&pov.name) {
                continue;
            }
            let Some(profile) = blueprint.character(name) else {
                continue;
            };
            let section = ContextSection::new(
                SectionKind::LinkedCharacter,
                format!("Character: {}", profile.name),
                Self::capped(&Self::character_excerpt(profile), caps::LINKED_CHARACTER_CAP),
            );
            if !push_if_fits(section, &mut total) {
                break;
            }
        }

        // Top principals not already packed
        let packed: Vec<String> = std::iter::once(pov.name.clone())
            .chain(plan.featured_characters.iter().cloned())
            .collect();
        for profile in blueprint
            .principal_characters()
            .into_iter()
            .filter(|c| !packed.iter().any(|p| p.eq_ignore_ascii_case(&c.name)))
            .take(self.options.top_principals)
        {
            let section = ContextSection::new(
                SectionKind::PrincipalCharacter,
                format!("Character: {}", profile.name),
                Self::capped(
                    &Self::character_excerpt(profile),
                    caps::PRINCIPAL_CHARACTER_CAP,
                ),
            );
            if !push_if_fits(section, &mut total) {
                break;
            }
        }

        // Linked locations, then primary locations
        let mut location_names: Vec<&str> =
            plan.featured_locations.iter().map(String::as_str).collect();
        for loc in blueprint.locations.iter().filter(|l| l.primary) {
            if !location_names.iter().any(|n| n.eq_ignore_ascii_case(&loc.name)) {
                location_names.push(&loc.name);
            }
        }
        for name in location_names {
            let Some(location) = blueprint.location(name) else {
                continue;
            };
            let section = ContextSection::new(
                SectionKind::Location,
                format!("Location: {}", location.name),
                Self::capped(&location.description, caps::LOCATION_CAP),
            );
            if !push_if_fits(section, &mut total) {
                break;
            }
        }

        // Story so far
        if let Some(summary) = self.story_so_far(previous) {
            push_if_fits(
                ContextSection::new(
                    SectionKind::StorySoFar,
                    "The Story So Far",
                    Self::capped(&summary, caps::STORY_SO_FAR_CAP),
                ),
                &mut total,
            );
        }

        // Continuity notes from the tracker
        if let Some(notes) = continuity.filter(|n| !n.trim().is_empty()) {
            push_if_fits(
                ContextSection::new(
                    SectionKind::Continuity,
                    "Continuity Notes",
                    Self::capped(notes, caps::CONTINUITY_CAP),
                ),
                &mut total,
            );
        }

        // Plot threads active in this chapter
        let threads = blueprint.threads_for_chapter(chapter_number);
        if !threads.is_empty() {
            let text = threads
                .iter()
                .map(|t| format!("- {}: {}", t.name, t.summary))
                .collect::<Vec<_>>()
                .join("\n");
            push_if_fits(
                ContextSection::new(
                    SectionKind::Plot,
                    "Active Plot Threads",
                    Self::capped(&text, caps::PLOT_CAP),
                ),
                &mut total,
            );
        }

        // Style guide
        push_if_fits(
            ContextSection::new(
                SectionKind::Style,
                "Style",
                Self::capped(&Self::style_excerpt(blueprint), caps::STYLE_CAP),
            ),
            &mut total,
        );

        let context = GenerationContext {
            chapter_number,
            chapter_title: plan.title.clone(),
            target_word_count: plan.target_word_count,
            sections,
            total_tokens: total,
            max_tokens: budget,
        };

        if context.total_tokens > budget {
            warn!(
                chapter = chapter_number,
                tokens = context.total_tokens,
                budget,
                "Assembled context over budget, optimizing"
            );
            return self.optimize(&context);
        }
        debug!(
            chapter = chapter_number,
            tokens = context.total_tokens,
            sections = context.sections.len(),
            "Context assembled"
        );
        Ok(context)
    }

    /// Rebuild an over-budget context from its fixed sections, re-adding
    /// material greedily and truncating the story-so-far rather than
    /// dropping it. Returns a new instance; the input is untouched.
    pub fn optimize(&self, context: &GenerationContext) -> Result<GenerationContext> {
        let budget = self.options.max_tokens;
        let mut sections = Vec::new();
        let mut total = 0usize;

        for section in context
            .sections
            .iter()
            .filter(|s| matches!(s.kind, SectionKind::Metadata | SectionKind::Instructions))
        {
            total += section.tokens;
            sections.push(section.clone());
        }

        // Story so far is truncated to whatever room remains, not dropped
        if let Some(summary) = context.section(SectionKind::StorySoFar) {
            let remaining = budget.saturating_sub(total);
            if remaining > 0 {
                let text = TokenEstimator::truncate_to_limit(&summary.text, remaining);
                if !text.is_empty() {
                    let section =
                        ContextSection::new(SectionKind::StorySoFar, summary.label.clone(), text);
                    total += section.tokens;
                    sections.push(section);
                }
            }
        }

        // Characters and locations re-added in priority order while they fit
        for section in context.sections.iter().filter(|s| {
            matches!(
                s.kind,
                SectionKind::PovCharacter
                    | SectionKind::LinkedCharacter
                    | SectionKind::PrincipalCharacter
                    | SectionKind::Location
            )
        }) {
            if total + section.tokens <= budget {
                total += section.tokens;
                sections.push(section.clone());
            }
        }

        let optimized = GenerationContext {
            chapter_number: context.chapter_number,
            chapter_title: context.chapter_title.clone(),
            target_word_count: context.target_word_count,
            sections,
            total_tokens: total,
            max_tokens: budget,
        };

        if optimized.total_tokens > budget {
            return Err(NovelError::BudgetExceeded {
                assembled: optimized.total_tokens,
                budget,
            });
        }
        Ok(optimized)
    }

    // -------------------------------------------------------------------------
    // Section builders
    // -------------------------------------------------------------------------

    fn metadata_section(&self, blueprint: &Blueprint, plan: &ChapterPlan) -> ContextSection {
        let text = format!(
            "Book: {} ({})\nPremise: {}\nChapter {} of {}: {}\nTarget length: {} words\nNarration: {} point of view, {} tense, from {}'s perspective",
            blueprint.title,
            blueprint.genre,
            blueprint.premise,
            plan.number,
            blueprint.chapter_count(),
            plan.title,
            plan.target_word_count,
            blueprint.style.pov.as_str(),
            blueprint.style.tense.as_str(),
            plan.pov_character,
        );
        ContextSection::new(SectionKind::Metadata, "Book", text)
    }

    fn instructions_section(&self, plan: &ChapterPlan) -> ContextSection {
        let mut text = format!("Chapter summary: {}", plan.summary);
        if !plan.scenes.is_empty() {
            text.push_str("\nScenes, in order:");
            for scene in &plan.scenes {
                text.push_str("\n- ");
                text.push_str(&scene.summary);
                if let Some(location) = &scene.location {
                    text.push_str(" (at ");
                    text.push_str(location);
                    text.push(')');
                }
            }
        }
        if !plan.key_events.is_empty() {
            text.push_str("\nEvents that must happen:");
            for event in &plan.key_events {
                text.push_str("\n- ");
                text.push_str(event);
            }
        }
        ContextSection::new(SectionKind::Instructions, "Chapter Instructions", text)
    }

    fn character_excerpt(profile: &crate::types::CharacterProfile) -> String {
        let mut text = format!("{} ({}): {}", profile.name, profile.role.as_str(), profile.description);
        if !profile.arc.is_empty() {
            text.push_str("\nArc: ");
            text.push_str(&profile.arc);
        }
        if !profile.voice.is_empty() {
            text.push_str("\nVoice: ");
            text.push_str(&profile.voice);
        }
        text
    }

    fn style_excerpt(blueprint: &Blueprint) -> String {
        let mut text = format!(
            "{} narration in {} tense.",
            blueprint.style.pov.as_str(),
            blueprint.style.tense.as_str()
        );
        if !blueprint.style.tone.is_empty() {
            text.push_str(" Tone: ");
            text.push_str(&blueprint.style.tone);
            text.push('.');
        }
        if !blueprint.style.notes.is_empty() {
            text.push('\n');
            text.push_str(&blueprint.style.notes);
        }
        text
    }

    fn story_so_far(&self, previous: &[PreviousChapter]) -> Option<String> {
        if previous.is_empty() {
            return None;
        }
        let recent = previous
            .iter()
            .rev()
            .take(self.options.recent_summaries)
            .collect::<Vec<_>>();
        let text = recent
            .into_iter()
            .rev()
            .map(|p| format!("Chapter {} ({}): {}", p.number, p.title, p.summary))
            .collect::<Vec<_>>()
            .join("\n");
        Some(text)
    }

    fn capped(text: &str, cap: usize) -> String {
        TokenEstimator::truncate_to_limit(text, cap)
    }
}

// =============================================================================
// Tests
// =============================================================================
