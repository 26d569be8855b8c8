//! Book Blueprint Types
//!
//! The approved structural and creative plan a novel is generated from:
//! structure (acts, chapters, scenes), character bible, world bible,
//! plot architecture, and style guide.
//!
//! Blueprints are immutable once approved: the generation core only ever
//! reads them. Validation happens up front so context assembly can rely
//! on required fields being present.

use serde::{Deserialize, Serialize};

use crate::types::{NovelError, Result};

// =============================================================================
// Blueprint
// =============================================================================

/// The approved plan for an entire book. Read-only input to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    pub title: String,
    pub premise: String,
    pub genre: String,
    /// Target word count for the whole book
    pub target_word_count: u32,

    /// Structural plan: acts containing chapter plans
    pub acts: Vec<Act>,

    /// Character bible
    pub characters: Vec<CharacterProfile>,

    /// World bible
    pub locations: Vec<LocationProfile>,

    /// Plot architecture: threads spanning chapters
    #[serde(default)]
    pub plot_threads: Vec<PlotThreadPlan>,

    /// Style guide
    pub style: StyleGuide,
}

/// One act in the structural plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Act {
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub chapters: Vec<ChapterPlan>,
}

/// Plan for a single chapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterPlan {
    pub number: u32,
    pub title: String,
    pub summary: String,
    pub target_word_count: u32,

    /// Name of the point-of-view character for this chapter
    pub pov_character: String,

    /// Characters explicitly linked to this chapter (beyond the POV)
    #[serde(default)]
    pub featured_characters: Vec<String>,

    /// Locations explicitly linked to this chapter
    #[serde(default)]
    pub featured_locations: Vec<String>,

    /// Scene beats in order
    #[serde(default)]
    pub scenes: Vec<ScenePlan>,

    /// Events that must happen in this chapter
    #[serde(default)]
    pub key_events: Vec<String>,
}

/// A single scene beat within a chapter plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenePlan {
    pub summary: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub characters: Vec<String>,
}

/// Character bible entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub name: String,
    pub role: CharacterRole,
    pub description: String,
    #[serde(default)]
    pub arc: String,
    /// Distinguishing voice/speech notes used by the style evaluator
    #[serde(default)]
    pub voice: String,
}

/// Narrative role, ordered by significance for context packing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterRole {
    Minor,
    Supporting,
    Antagonist,
    Protagonist,
}

impl CharacterRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Protagonist => "protagonist",
            Self::Antagonist => "antagonist",
            Self::Supporting => "supporting",
            Self::Minor => "minor",
        }
    }

    /// Protagonists and antagonists are packed into context before others
    pub fn is_principal(&self) -> bool {
        matches!(self, Self::Protagonist | Self::Antagonist)
    }
}

/// World bible entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationProfile {
    pub name: String,
    pub description: String,
    /// Primary locations are packed into context even when not linked
    #[serde(default)]
    pub primary: bool,
}

/// A planned plot thread spanning chapters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotThreadPlan {
    pub name: String,
    pub summary: String,
    /// Chapters this thread is active in (empty = whole book)
    #[serde(default)]
    pub chapters: Vec<u32>,
}

/// Style guide for the whole book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleGuide {
    pub pov: PointOfView,
    pub tense: Tense,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointOfView {
    FirstPerson,
    ThirdLimited,
    ThirdOmniscient,
}

impl PointOfView {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstPerson => "first person",
            Self::ThirdLimited => "third person limited",
            Self::ThirdOmniscient => "third person omniscient",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tense {
    Past,
    Present,
}

impl Tense {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Past => "past",
            Self::Present => "present",
        }
    }
}

// =============================================================================
// Blueprint Operations
// =============================================================================

impl Blueprint {
    /// Validate required fields before a session starts.
    ///
    /// Context assembly treats a missing POV character or empty structure as
    /// a context-build failure; catching it here surfaces the problem before
    /// any provider call is made.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(NovelError::Blueprint("title is required".to_string()));
        }
        if self.chapter_count() == 0 {
            return Err(NovelError::Blueprint(
                "blueprint has no chapters".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for plan in self.chapter_plans() {
            if !seen.insert(plan.number) {
                return Err(NovelError::Blueprint(format!(
                    "duplicate chapter number {}",
                    plan.number
                )));
            }
            if plan.pov_character.trim().is_empty() {
                return Err(NovelError::Blueprint(format!(
                    "chapter {} has no POV character",
                    plan.number
                )));
            }
            if self.character(&plan.pov_character).is_none() {
                return Err(NovelError::Blueprint(format!(
                    "chapter {} POV character '{}' is not in the character bible",
                    plan.number, plan.pov_character
                )));
            }
        }
        Ok(())
    }

    /// Total number of chapters across all acts
    pub fn chapter_count(&self) -> usize {
        self.acts.iter().map(|a| a.chapters.len()).sum()
    }

    /// Iterate chapter plans in book order
    pub fn chapter_plans(&self) -> impl Iterator<Item = &ChapterPlan> {
        self.acts.iter().flat_map(|a| a.chapters.iter())
    }

    /// Look up the plan for a chapter number
    pub fn chapter_plan(&self, number: u32) -> Option<&ChapterPlan> {
        self.chapter_plans().find(|c| c.number == number)
    }

    /// Look up a character by name (case-insensitive)
    pub fn character(&self, name: &str) -> Option<&CharacterProfile> {
        self.characters
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Look up a location by name (case-insensitive)
    pub fn location(&self, name: &str) -> Option<&LocationProfile> {
        self.locations
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
    }

    /// Principal characters (protagonists/antagonists) in significance order
    pub fn principal_characters(&self) -> Vec<&CharacterProfile> {
        let mut principals: Vec<_> = self
            .characters
            .iter()
            .filter(|c| c.role.is_principal())
            .collect();
        principals.sort_by(|a, b| b.role.cmp(&a.role).then(a.name.cmp(&b.name)));
        principals
    }

    /// Plot threads active in a chapter
    pub fn threads_for_chapter(&self, number: u32) -> Vec<&PlotThreadPlan> {
        self.plot_threads
            .iter()
            .filter(|t| t.chapters.is_empty() || t.chapters.contains(&number))
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_blueprint() -> Blueprint {
        Blueprint {
            title: "The Glass Meridian".to_string(),
            premise: "A cartographer discovers her maps alter the places they chart".to_string(),
            genre: "fantasy".to_string(),
            target_word_count: 90_000,
            acts: vec![Act {
                number: 1,
                title: "Departure".to_string(),
                summary: String::new(),
                chapters: vec![
                    ChapterPlan {
                        number: 1,
                        title: "Ink and Salt".to_string(),
                        summary: "Mara accepts the commission".to_string(),
                        target_word_count: 3000,
                        pov_character: "Mara".to_string(),
                        featured_characters: vec!["Edwin".to_string()],
                        featured_locations: vec!["Harrowgate".to_string()],
                        scenes: vec![],
                        key_events: vec!["Mara signs the charter".to_string()],
                    },
                    ChapterPlan {
                        number: 2,
                        title: "The First Redrawing".to_string(),
                        summary: "The harbor map changes overnight".to_string(),
                        target_word_count: 3200,
                        pov_character: "Mara".to_string(),
                        featured_characters: vec![],
                        featured_locations: vec![],
                        scenes: vec![],
                        key_events: vec![],
                    },
                ],
            }],
            characters: vec![
                CharacterProfile {
                    name: "Mara".to_string(),
                    role: CharacterRole::Protagonist,
                    description: "A meticulous royal cartographer".to_string(),
                    arc: "From obedient surveyor to mapmaker of her own fate".to_string(),
                    voice: "Precise, dry".to_string(),
                },
                CharacterProfile {
                    name: "Edwin".to_string(),
                    role: CharacterRole::Antagonist,
                    description: "The guildmaster who commissioned the survey".to_string(),
                    arc: String::new(),
                    voice: String::new(),
                },
            ],
            locations: vec![LocationProfile {
                name: "Harrowgate".to_string(),
                description: "A fog-bound port city".to_string(),
                primary: true,
            }],
            plot_threads: vec![PlotThreadPlan {
                name: "The living maps".to_string(),
                summary: "Maps rewrite geography".to_string(),
                chapters: vec![],
            }],
            style: StyleGuide {
                pov: PointOfView::ThirdLimited,
                tense: Tense::Past,
                tone: "melancholic".to_string(),
                notes: String::new(),
            },
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(sample_blueprint().validate().is_ok());
    }

    #[test]
    fn test_validate_missing_title() {
        let mut bp = sample_blueprint();
        bp.title = "  ".to_string();
        assert!(bp.validate().is_err());
    }

    #[test]
    fn test_validate_unknown_pov() {
        let mut bp = sample_blueprint();
        bp.acts[0].chapters[0].pov_character = "Nobody".to_string();
        assert!(bp.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_chapter() {
        let mut bp = sample_blueprint();
        bp.acts[0].chapters[1].number = 1;
        assert!(bp.validate().is_err());
    }

    #[test]
    fn test_chapter_lookup() {
        let bp = sample_blueprint();
        assert_eq!(bp.chapter_count(), 2);
        assert_eq!(bp.chapter_plan(2).map(|c| c.number), Some(2));
        assert!(bp.chapter_plan(99).is_none());
    }

    #[test]
    fn test_principal_characters_ordered() {
        let bp = sample_blueprint();
        let principals = bp.principal_characters();
        assert_eq!(principals.len(), 2);
        assert_eq!(principals[0].name, "Mara"); // protagonist before antagonist
    }

    #[test]
    fn test_character_lookup_case_insensitive() {
        let bp = sample_blueprint();
        assert!(bp.character("mara").is_some());
        assert!(bp.location("HARROWGATE").is_some());
    }
}
