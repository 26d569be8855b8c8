//! Cross-Chapter Continuity
//!
//! Tracks what each chapter establishes (character state, plot threads,
//! timeline position, tracked objects) as append-only histories keyed by
//! chapter number, then checks new chapters against that record across
//! five categories: character, plot, timeline, setting, object.
//!
//! Extraction is deterministic keyword/regex heuristics over the prose.
//! It degrades to a partial snapshot with a warning rather than failing,
//! so one odd chapter cannot abort the session. Snapshots are structured
//! and diffable; histories are never edited in place.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ai::tokenizer::TokenEstimator;
use crate::types::Blueprint;

/// Verbs that legitimize a location change between chapters
const MOVEMENT_HINTS: &[&str] = &[
    "travel", "journey", "arrive", "arrived", "left", "departed", "rode", "walked to",
    "sailed", "returned", "reached", "set out",
];

/// Verbs that legitimize an object changing hands or place
const TRANSFER_HINTS: &[&str] = &[
    "carried", "brought", "took", "taken", "moved", "handed", "gave", "sent", "packed",
];

/// Phrases that read as the narrative moving backwards in time
const REGRESSION_MARKERS: &[&str] = &[
    "the day before",
    "the previous day",
    "the previous night",
    "earlier that year",
    "years earlier",
    "months earlier",
    "weeks earlier",
];

/// Keyword map for a character's emotional state
const EMOTION_HINTS: &[(&str, &str)] = &[
    ("furious", "angry"),
    ("angry", "angry"),
    ("afraid", "afraid"),
    ("terrified", "afraid"),
    ("grief", "grieving"),
    ("grieving", "grieving"),
    ("wept", "grieving"),
    ("calm", "calm"),
    ("relieved", "relieved"),
    ("joy", "happy"),
    ("smiled", "happy"),
];

// =============================================================================
// History Records
// =============================================================================

/// A character's observed state after one chapter. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterStateSnapshot {
    pub character: String,
    pub chapter: u32,
    pub location: Option<String>,
    pub emotional_state: Option<String>,
    pub deceased: bool,
}

/// Lifecycle of a plot thread as observed per chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Active,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotThreadState {
    pub thread: String,
    pub chapter: u32,
    pub status: ThreadStatus,
}

/// A time-of-story marker observed in a chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub chapter: u32,
    pub marker: String,
}

/// Where a tracked object was last seen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectState {
    pub object_id: String,
    pub name: String,
    pub chapter: u32,
    pub location: Option<String>,
}

// =============================================================================
// Report Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuityCategory {
    Character,
    Plot,
    Timeline,
    Setting,
    Object,
}

impl ContinuityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Plot => "plot",
            Self::Timeline => "timeline",
            Self::Setting => "setting",
            Self::Object => "object",
        }
    }
}

/// A detected contradiction with previously established state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuityIssue {
    pub category: ContinuityCategory,
    /// Character name, thread name, or object id the issue refers to
    pub subject: String,
    pub chapter: u32,
    pub description: String,
}

/// One verification attempt. Empty means no contradictions found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuityReport {
    pub chapter: u32,
    pub issues: Vec<ContinuityIssue>,
}

impl ContinuityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues_in(&self, category: ContinuityCategory) -> Vec<&ContinuityIssue> {
        self.issues
            .iter()
            .filter(|i| i.category == category)
            .collect()
    }
}

// =============================================================================
// Continuity Tracker
// =============================================================================

pub struct ContinuityTracker {
    character_history: HashMap<String, Vec<CharacterStateSnapshot>>,
    thread_history: HashMap<String, Vec<PlotThreadState>>,
    timeline: Vec<TimelineEntry>,
    object_history: HashMap<String, Vec<ObjectState>>,
    /// Registered tracked objects: id -> display name
    objects: HashMap<String, String>,
    death_pattern: Regex,
    resolved_pattern: Regex,
}

impl ContinuityTracker {
    pub fn new() -> Self {
        Self {
            character_history: HashMap::new(),
            thread_history: HashMap::new(),
            timeline: Vec::new(),
            object_history: HashMap::new(),
            objects: HashMap::new(),
            // Patterns are fixed literals, compile cannot fail
            death_pattern: Regex::new(r"(?i)\b(died|was dead|lay dead|killed|buried)\b").unwrap(),
            resolved_pattern: Regex::new(r"(?i)\b(resolved|settled|answered|over at last)\b")
                .unwrap(),
        }
    }

    /// Register an object to track across chapters
    pub fn track_object(&mut self, id: impl Into<String>, name: impl Into<String>) {
        self.objects.insert(id.into(), name.into());
    }

    pub fn character_history(&self, character: &str) -> &[CharacterStateSnapshot] {
        self.character_history
            .get(character)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn object_history(&self, object_id: &str) -> &[ObjectState] {
        self.object_history
            .get(object_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    // -------------------------------------------------------------------------
    // Extraction
    // -------------------------------------------------------------------------

    /// Derive character state snapshots from chapter content.
    ///
    /// Partial output is expected: characters that cannot be located or
    /// read emotionally still get a snapshot with those fields empty.
    pub fn extract_character_states(
        &self,
        content: &str,
        blueprint: &Blueprint,
        chapter: u32,
    ) -> Vec<CharacterStateSnapshot> {
        if content.trim().is_empty() {
            warn!(chapter, "Empty content, character extraction degraded to nothing");
            return Vec::new();
        }
        let lower = content.to_lowercase();
        blueprint
            .characters
            .iter()
            .filter(|c| lower.contains(&c.name.to_lowercase()))
            .map(|c| {
                let near = Self::text_near(&lower, &c.name.to_lowercase());
                CharacterStateSnapshot {
                    character: c.name.clone(),
                    chapter,
                    location: Self::location_in(&near, blueprint)
                        .or_else(|| Self::location_in(&lower, blueprint)),
                    emotional_state: EMOTION_HINTS
                        .iter()
                        .find(|(hint, _)| near.contains(hint))
                        .map(|(_, state)| state.to_string()),
                    deceased: self.death_pattern.is_match(&near),
                }
            })
            .collect()
    }

    /// Pull the chapter's notable events as short sentences
    pub fn extract_key_events(&self, content: &str, max_events: usize) -> Vec<String> {
        const EVENT_HINTS: &[&str] = &[
            "discovered", "revealed", "died", "arrived", "signed", "confessed", "escaped",
            "betrayed", "found", "lost", "agreed", "refused",
        ];
        content
            .split(['.', '!', '?'])
            .map(str::trim)
            .filter(|s| !s.is_empty() && s.split_whitespace().count() <= 40)
            .filter(|s| {
                let lower = s.to_lowercase();
                EVENT_HINTS.iter().any(|h| lower.contains(h))
            })
            .take(max_events)
            .map(|s| s.to_string())
            .collect()
    }

    /// Append this chapter's observations to every history.
    ///
    /// Call only for finalized chapters, in book order.
    pub fn record_chapter(&mut self, content: &str, blueprint: &Blueprint, chapter: u32) {
        for snapshot in self.extract_character_states(content, blueprint, chapter) {
            self.character_history
                .entry(snapshot.character.clone())
                .or_default()
                .push(snapshot);
        }

        let lower = content.to_lowercase();
        for thread in &blueprint.plot_threads {
            if !lower.contains(&thread.name.to_lowercase()) {
                continue;
            }
            let near = Self::text_near(&lower, &thread.name.to_lowercase());
            let status = if self.resolved_pattern.is_match(&near) {
                ThreadStatus::Resolved
            } else {
                ThreadStatus::Active
            };
            self.thread_history
                .entry(thread.name.clone())
                .or_default()
                .push(PlotThreadState {
                    thread: thread.name.clone(),
                    chapter,
                    status,
                });
        }

        for marker in Self::timeline_markers(&lower) {
            self.timeline.push(TimelineEntry { chapter, marker });
        }

        for (id, name) in &self.objects {
            if !lower.contains(&name.to_lowercase()) {
                continue;
            }
            let location = Self::object_location(&lower, &name.to_lowercase(), blueprint);
            self.object_history
                .entry(id.clone())
                .or_default()
                .push(ObjectState {
                    object_id: id.clone(),
                    name: name.clone(),
                    chapter,
                    location,
                });
        }
        debug!(chapter, "Continuity record appended");
    }

    // -------------------------------------------------------------------------
    // Verification
    // -------------------------------------------------------------------------

    /// Check a chapter against the accumulated record. Five independent
    /// category checks; an empty report means no contradictions.
    pub fn verify_chapter(
        &self,
        content: &str,
        blueprint: &Blueprint,
        chapter: u32,
    ) -> ContinuityReport {
        let lower = content.to_lowercase();
        let mut issues = Vec::new();

        issues.extend(self.check_characters(&lower, chapter));
        issues.extend(self.check_plot_threads(&lower, chapter));
        issues.extend(self.check_timeline(&lower, chapter));
        issues.extend(self.check_setting(&lower, blueprint, chapter));
        issues.extend(self.check_objects(&lower, blueprint, chapter));

        ContinuityReport { chapter, issues }
    }

    /// Character continuity: the dead stay dead
    fn check_characters(&self, lower: &str, chapter: u32) -> Vec<ContinuityIssue> {
        let mut issues = Vec::new();
        for (name, history) in &self.character_history {
            let Some(last) = history.last() else { continue };
            if last.deceased && lower.contains(&name.to_lowercase()) {
                let near = Self::text_near(lower, &name.to_lowercase());
                let remembered = near.contains("remember")
                    || near.contains("memory")
                    || near.contains("grave")
                    || near.contains("ghost");
                if !remembered {
                    issues.push(ContinuityIssue {
                        category: ContinuityCategory::Character,
                        subject: name.clone(),
                        chapter,
                        description: format!(
                            "{} was established dead in chapter {} but appears again",
                            name, last.chapter
                        ),
                    });
                }
            }
        }
        issues
    }

    /// Plot continuity: resolved threads do not quietly reopen
    fn check_plot_threads(&self, lower: &str, chapter: u32) -> Vec<ContinuityIssue> {
        let mut issues = Vec::new();
        for (name, history) in &self.thread_history {
            let Some(last) = history.last() else { continue };
            if last.status == ThreadStatus::Resolved && lower.contains(&name.to_lowercase()) {
                issues.push(ContinuityIssue {
                    category: ContinuityCategory::Plot,
                    subject: name.clone(),
                    chapter,
                    description: format!(
                        "Plot thread '{}' was resolved in chapter {} but is active again",
                        name, last.chapter
                    ),
                });
            }
        }
        issues
    }

    /// Timeline continuity: unmarked jumps backwards in time
    fn check_timeline(&self, lower: &str, chapter: u32) -> Vec<ContinuityIssue> {
        if self.timeline.is_empty() {
            return Vec::new();
        }
        let flashback = lower.contains("flashback")
            || lower.contains("remembered")
            || lower.contains("had been");
        REGRESSION_MARKERS
            .iter()
            .filter(|m| lower.contains(*m) && !flashback)
            .map(|m| ContinuityIssue {
                category: ContinuityCategory::Timeline,
                subject: (*m).to_string(),
                chapter,
                description: format!(
                    "Narrative moves backwards in time ('{m}') without a flashback framing"
                ),
            })
            .collect()
    }

    /// Setting continuity: characters do not teleport between chapters
    fn check_setting(
        &self,
        lower: &str,
        blueprint: &Blueprint,
        chapter: u32,
    ) -> Vec<ContinuityIssue> {
        let mut issues = Vec::new();
        let moved = MOVEMENT_HINTS.iter().any(|h| lower.contains(h));
        if moved {
            return issues;
        }
        for (name, history) in &self.character_history {
            let Some(last) = history.last() else { continue };
            let Some(previous_location) = &last.location else {
                continue;
            };
            if !lower.contains(&name.to_lowercase()) {
                continue;
            }
            let near = Self::text_near(lower, &name.to_lowercase());
            let Some(current) = Self::location_in(&near, blueprint) else {
                continue;
            };
            if !current.eq_ignore_ascii_case(previous_location) {
                issues.push(ContinuityIssue {
                    category: ContinuityCategory::Setting,
                    subject: name.clone(),
                    chapter,
                    description: format!(
                        "{} was last in {} (chapter {}) but appears in {} with no travel",
                        name, previous_location, last.chapter, current
                    ),
                });
            }
        }
        issues
    }

    /// Object continuity: one issue per contradicted object, naming its id
    fn check_objects(
        &self,
        lower: &str,
        blueprint: &Blueprint,
        chapter: u32,
    ) -> Vec<ContinuityIssue> {
        let mut issues = Vec::new();
        let transferred = TRANSFER_HINTS.iter().any(|h| lower.contains(h));
        for (id, name) in &self.objects {
            let Some(last) = self.object_history(id).last() else {
                continue;
            };
            let Some(known_location) = &last.location else {
                continue;
            };
            if !lower.contains(&name.to_lowercase()) {
                continue;
            }
            let Some(current) = Self::object_location(lower, &name.to_lowercase(), blueprint)
            else {
                continue;
            };
            if !current.eq_ignore_ascii_case(known_location) && !transferred {
                issues.push(ContinuityIssue {
                    category: ContinuityCategory::Object,
                    subject: id.clone(),
                    chapter,
                    description: format!(
                        "{} was last seen in {} (chapter {}) but appears in {}",
                        name, known_location, last.chapter, current
                    ),
                });
            }
        }
        issues
    }

    // -------------------------------------------------------------------------
    // Continuity context
    // -------------------------------------------------------------------------

    /// Compress the accumulated record into a bounded text block for the
    /// context assembler, using the shared truncation discipline.
    pub fn build_continuity_context(&self, max_tokens: usize) -> String {
        let mut lines = Vec::new();

        let mut characters: Vec<_> = self.character_history.iter().collect();
        characters.sort_by_key(|(name, _)| name.as_str());
        for (name, history) in characters {
            let Some(last) = history.last() else { continue };
            let mut line = format!("{name}:");
            if last.deceased {
                line.push_str(" dead");
            }
            if let Some(location) = &last.location {
                line.push_str(&format!(" at {location}"));
            }
            if let Some(state) = &last.emotional_state {
                line.push_str(&format!(", {state}"));
            }
            if line.ends_with(':') {
                line.push_str(" present, state unknown");
            }
            lines.push(format!("- {line} (as of chapter {})", last.chapter));
        }

        let mut threads: Vec<_> = self.thread_history.iter().collect();
        threads.sort_by_key(|(name, _)| name.as_str());
        for (name, history) in threads {
            let Some(last) = history.last() else { continue };
            let status = match last.status {
                ThreadStatus::Active => "active",
                ThreadStatus::Resolved => "resolved",
            };
            lines.push(format!("- Thread '{name}': {status} as of chapter {}", last.chapter));
        }

        if let Some(entry) = self.timeline.last() {
            lines.push(format!(
                "- Time: '{}' (chapter {})",
                entry.marker, entry.chapter
            ));
        }

        let mut objects: Vec<_> = self.object_history.iter().collect();
        objects.sort_by_key(|(id, _)| id.as_str());
        for (_, history) in objects {
            let Some(last) = history.last() else { continue };
            if let Some(location) = &last.location {
                lines.push(format!(
                    "- {} is in {} (chapter {})",
                    last.name, location, last.chapter
                ));
            }
        }

        TokenEstimator::truncate_to_limit(&lines.join("\n"), max_tokens)
    }

    // -------------------------------------------------------------------------
    // Text helpers
    // -------------------------------------------------------------------------

    /// A window of text around the first mention of `needle`
    fn text_near(lower: &str, needle: &str) -> String {
        match lower.find(needle) {
            Some(idx) => {
                let start = idx.saturating_sub(200);
                let end = (idx + needle.len() + 200).min(lower.len());
                let start = (0..=start).rev().find(|i| lower.is_char_boundary(*i)).unwrap_or(0);
                let end = (end..=lower.len())
                    .find(|i| lower.is_char_boundary(*i))
                    .unwrap_or(lower.len());
                lower[start..end].to_string()
            }
            None => String::new(),
        }
    }

    /// First blueprint location named in the text
    fn location_in(lower: &str, blueprint: &Blueprint) -> Option<String> {
        blueprint
            .locations
            .iter()
            .find(|l| lower.contains(&l.name.to_lowercase()))
            .map(|l| l.name.clone())
    }

    /// Location co-occurring with an object in the same paragraph
    fn object_location(lower: &str, object_name: &str, blueprint: &Blueprint) -> Option<String> {
        lower
            .split("\n\n")
            .filter(|p| p.contains(object_name))
            .find_map(|p| Self::location_in(p, blueprint))
    }

    fn timeline_markers(lower: &str) -> Vec<String> {
        const MARKERS: &[&str] = &[
            "the next morning",
            "the next day",
            "that night",
            "that evening",
            "a week later",
            "days later",
            "at dawn",
            "by nightfall",
        ];
        MARKERS
            .iter()
            .filter(|m| lower.contains(*m))
            .map(|m| m.to_string())
            .collect()
    }
}

impl Default for ContinuityTracker {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Act, Blueprint, CharacterProfile, CharacterRole, LocationProfile, PlotThreadPlan,
        PointOfView, StyleGuide, Tense,
    };

    fn blueprint() -> Blueprint {
        Blueprint {
            title: "Book".to_string(),
            premise: "p".to_string(),
            genre: "fantasy".to_string(),
            target_word_count: 50_000,
            acts: vec![Act {
                number: 1,
                title: "A".to_string(),
                summary: String::new(),
                chapters: vec![],
            }],
            characters: vec![
                CharacterProfile {
                    name: "Mara".to_string(),
                    role: CharacterRole::Protagonist,
                    description: "d".to_string(),
                    arc: String::new(),
                    voice: String::new(),
                },
                CharacterProfile {
                    name: "Edwin".to_string(),
                    role: CharacterRole::Antagonist,
                    description: "d".to_string(),
                    arc: String::new(),
                    voice: String::new(),
                },
            ],
            locations: vec![
                LocationProfile {
                    name: "Harrowgate".to_string(),
                    description: "d".to_string(),
                    primary: true,
                },
                LocationProfile {
                    name: "Citadel".to_string(),
                    description: "d".to_string(),
                    primary: false,
                },
            ],
            plot_threads: vec![PlotThreadPlan {
                name: "the living maps".to_string(),
                summary: "s".to_string(),
                chapters: vec![],
            }],
            style: StyleGuide {
                pov: PointOfView::ThirdLimited,
                tense: Tense::Past,
                tone: String::new(),
                notes: String::new(),
            },
        }
    }

    #[test]
    fn test_extract_character_states() {
        let tracker = ContinuityTracker::new();
        let bp = blueprint();
        let content = "Mara stood in Harrowgate, afraid of what the tide had taken.";
        let states = tracker.extract_character_states(content, &bp, 1);
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].character, "Mara");
        assert_eq!(states[0].location.as_deref(), Some("Harrowgate"));
        assert_eq!(states[0].emotional_state.as_deref(), Some("afraid"));
        assert!(!states[0].deceased);
    }

    #[test]
    fn test_extraction_degrades_on_empty_content() {
        let tracker = ContinuityTracker::new();
        let states = tracker.extract_character_states("", &blueprint(), 1);
        assert!(states.is_empty());
    }

    #[test]
    fn test_histories_are_append_only() {
        let mut tracker = ContinuityTracker::new();
        let bp = blueprint();
        tracker.record_chapter("Mara stood in Harrowgate.", &bp, 1);
        tracker.record_chapter("Mara walked to the Citadel and arrived at dusk.", &bp, 2);
        let history = tracker.character_history("Mara");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].chapter, 1);
        assert_eq!(history[0].location.as_deref(), Some("Harrowgate"));
        assert_eq!(history[1].chapter, 2);
    }

    #[test]
    fn test_clean_chapter_produces_empty_report() {
        let mut tracker = ContinuityTracker::new();
        let bp = blueprint();
        tracker.record_chapter("Mara stood in Harrowgate.", &bp, 1);
        let report = tracker.verify_chapter("Mara waited in Harrowgate for news.", &bp, 2);
        assert!(report.is_clean());
    }

    #[test]
    fn test_dead_character_reappearing_is_flagged() {
        let mut tracker = ContinuityTracker::new();
        let bp = blueprint();
        tracker.record_chapter("Edwin died at the gates of Harrowgate.", &bp, 3);
        let report = tracker.verify_chapter("Edwin ordered breakfast and smiled.", &bp, 4);
        let character_issues = report.issues_in(ContinuityCategory::Character);
        assert_eq!(character_issues.len(), 1);
        assert_eq!(character_issues[0].subject, "Edwin");
    }

    #[test]
    fn test_remembered_dead_character_is_not_flagged() {
        let mut tracker = ContinuityTracker::new();
        let bp = blueprint();
        tracker.record_chapter("Edwin died at the gates of Harrowgate.", &bp, 3);
        let report = tracker.verify_chapter(
            "Mara stood at the grave and let herself remember Edwin.",
            &bp,
            4,
        );
        assert!(report.issues_in(ContinuityCategory::Character).is_empty());
    }

    #[test]
    fn test_object_contradiction_yields_exactly_one_issue_with_id() {
        let mut tracker = ContinuityTracker::new();
        let bp = blueprint();
        tracker.track_object("obj-locket", "locket");
        tracker.record_chapter("The locket lay on a shelf in Harrowgate.", &bp, 1);

        let report = tracker.verify_chapter(
            "The locket gleamed in the Citadel vault, untouched for years.",
            &bp,
            2,
        );
        let object_issues = report.issues_in(ContinuityCategory::Object);
        assert_eq!(object_issues.len(), 1);
        assert_eq!(object_issues[0].subject, "obj-locket");
        assert!(object_issues[0].description.contains("Harrowgate"));
        assert!(object_issues[0].description.contains("Citadel"));
    }

    #[test]
    fn test_object_transfer_is_not_flagged() {
        let mut tracker = ContinuityTracker::new();
        let bp = blueprint();
        tracker.track_object("obj-locket", "locket");
        tracker.record_chapter("The locket lay on a shelf in Harrowgate.", &bp, 1);
        let report = tracker.verify_chapter(
            "Mara carried the locket with her into the Citadel.",
            &bp,
            2,
        );
        assert!(report.issues_in(ContinuityCategory::Object).is_empty());
    }

    #[test]
    fn test_resolved_thread_reopening_is_flagged() {
        let mut tracker = ContinuityTracker::new();
        let bp = blueprint();
        tracker.record_chapter(
            "The mystery of the living maps was resolved when the ink ran dry.",
            &bp,
            5,
        );
        let report = tracker.verify_chapter("The living maps stirred again.", &bp, 6);
        assert_eq!(report.issues_in(ContinuityCategory::Plot).len(), 1);
    }

    #[test]
    fn test_timeline_regression_without_flashback_is_flagged() {
        let mut tracker = ContinuityTracker::new();
        let bp = blueprint();
        tracker.record_chapter("The next morning, Mara packed her maps in Harrowgate.", &bp, 1);
        let report = tracker.verify_chapter(
            "The previous day came back in full: Mara shouting at the tide.",
            &bp,
            2,
        );
        assert_eq!(report.issues_in(ContinuityCategory::Timeline).len(), 1);
    }

    #[test]
    fn test_teleporting_character_is_flagged() {
        let mut tracker = ContinuityTracker::new();
        let bp = blueprint();
        tracker.record_chapter("Mara studied charts in Harrowgate.", &bp, 1);
        let report = tracker.verify_chapter("Mara stood inside the Citadel hall.", &bp, 2);
        let setting = report.issues_in(ContinuityCategory::Setting);
        assert_eq!(setting.len(), 1);
        assert_eq!(setting[0].subject, "Mara");
    }

    #[test]
    fn test_continuity_context_is_bounded_and_sorted() {
        let mut tracker = ContinuityTracker::new();
        let bp = blueprint();
        tracker.track_object("obj-locket", "locket");
        tracker.record_chapter(
            "Mara and Edwin argued in Harrowgate. The locket lay in Harrowgate. That night, nothing moved.",
            &bp,
            1,
        );
        let context = tracker.build_continuity_context(50);
        assert!(TokenEstimator::estimate(&context) <= 50);
        assert!(context.contains("Edwin"));
    }

    #[test]
    fn test_extract_key_events() {
        let tracker = ContinuityTracker::new();
        let content = "Mara signed the charter. The rain kept falling. Edwin revealed the second map.";
        let events = tracker.extract_key_events(content, 5);
        assert_eq!(events.len(), 2);
        assert!(events[0].contains("signed"));
        assert!(events[1].contains("revealed"));
    }
}
