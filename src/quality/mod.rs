//! Chapter Quality Evaluation
//!
//! Scores generated prose along six independent dimensions (narrative,
//! character consistency, plot adherence, style, pacing, dialogue),
//! each 0-100 with structured issues. Evaluation is deterministic:
//! the same content and reference data always produce the same report,
//! so the revision loop and its tests are reproducible.
//!
//! Also provides:
//! - Ranked revision instructions (severity x impact)
//! - Mechanical auto-fixes that never silently drop unresolved issues

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::quality as weights;
use crate::types::{Blueprint, ChapterPlan};

// =============================================================================
// Report Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityDimension {
    Narrative,
    CharacterConsistency,
    PlotAdherence,
    Style,
    Pacing,
    Dialogue,
}

impl QualityDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Narrative => "narrative",
            Self::CharacterConsistency => "character_consistency",
            Self::PlotAdherence => "plot_adherence",
            Self::Style => "style",
            Self::Pacing => "pacing",
            Self::Dialogue => "dialogue",
        }
    }

    /// Reader-facing impact of defects in this dimension (0-1), used to
    /// rank revision instructions
    pub fn impact(&self) -> f64 {
        match self {
            Self::PlotAdherence => 0.9,
            Self::CharacterConsistency => 0.8,
            Self::Narrative => 0.7,
            Self::Pacing => 0.5,
            Self::Dialogue => 0.4,
            Self::Style => 0.3,
        }
    }

    fn weight(&self) -> f64 {
        match self {
            Self::Narrative => weights::WEIGHT_NARRATIVE,
            Self::CharacterConsistency => weights::WEIGHT_CHARACTER,
            Self::PlotAdherence => weights::WEIGHT_PLOT,
            Self::Style => weights::WEIGHT_STYLE,
            Self::Pacing => weights::WEIGHT_PACING,
            Self::Dialogue => weights::WEIGHT_DIALOGUE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Minor,
    Moderate,
    Major,
    Critical,
}

impl IssueSeverity {
    /// Score penalty and ranking weight
    pub fn weight(&self) -> f64 {
        match self {
            Self::Minor => 5.0,
            Self::Moderate => 10.0,
            Self::Major => 20.0,
            Self::Critical => 35.0,
        }
    }
}

/// One detected quality problem, located by paragraph where possible
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub dimension: QualityDimension,
    pub severity: IssueSeverity,
    /// Zero-based paragraph index, when the issue is localized
    pub paragraph: Option<usize>,
    pub description: String,
    pub suggested_fix: Option<String>,
    /// Whether a deterministic mechanical fix exists
    pub auto_fixable: bool,
}

impl QualityIssue {
    /// Ranking key for revision instructions
    pub fn priority(&self) -> f64 {
        self.severity.weight() * self.dimension.impact()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: QualityDimension,
    /// 0-100
    pub score: f64,
    pub issues: Vec<QualityIssue>,
}

/// One evaluation attempt. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub scores: Vec<DimensionScore>,
    /// Weighted overall score, 0-100
    pub overall: f64,
    pub evaluated_at: DateTime<Utc>,
}

impl QualityReport {
    pub fn dimension(&self, dimension: QualityDimension) -> Option<&DimensionScore> {
        self.scores.iter().find(|s| s.dimension == dimension)
    }

    pub fn all_issues(&self) -> Vec<&QualityIssue> {
        self.scores.iter().flat_map(|s| s.issues.iter()).collect()
    }

    pub fn issue_count(&self) -> usize {
        self.scores.iter().map(|s| s.issues.len()).sum()
    }
}

/// Result of an auto-fix pass: fixed content plus every issue that was
/// not resolved. Unresolved issues are never dropped.
#[derive(Debug, Clone)]
pub struct AutoFixOutcome {
    pub content: String,
    pub resolved: Vec<QualityIssue>,
    pub unresolved: Vec<QualityIssue>,
}

// =============================================================================
// Quality Evaluator
// =============================================================================

pub struct QualityEvaluator {
    adverb: Regex,
    multi_space: Regex,
    doubled_punctuation: Regex,
    space_before_punctuation: Regex,
}

impl QualityEvaluator {
    pub fn new() -> Self {
        // Patterns are fixed literals, compile cannot fail
        Self {
            adverb: Regex::new(r"\b[A-Za-z]+ly\b").unwrap(),
            multi_space: Regex::new(r"[ \t]{2,}").unwrap(),
            doubled_punctuation: Regex::new(r"(,),+|(;);+|(:):+|(!)!+|(\?)\?+").unwrap(),
            space_before_punctuation: Regex::new(r" +([,.;:!?])").unwrap(),
        }
    }

    /// Score content across all six dimensions and compose the overall
    /// weighted score
    pub fn evaluate(
        &self,
        content: &str,
        blueprint: &Blueprint,
        plan: &ChapterPlan,
    ) -> QualityReport {
        let scores = vec![
            self.evaluate_narrative(content, plan),
            self.evaluate_character_consistency(content, blueprint, plan),
            self.evaluate_plot_adherence(content, plan),
            self.evaluate_style(content, blueprint),
            self.evaluate_pacing(content),
            self.evaluate_dialogue(content, plan),
        ];
        let overall = scores
            .iter()
            .map(|s| s.score * s.dimension.weight())
            .sum::<f64>();
        QualityReport {
            scores,
            overall,
            evaluated_at: Utc::now(),
        }
    }

    // -------------------------------------------------------------------------
    // Dimension evaluators
    // -------------------------------------------------------------------------

    /// Narrative: length against target and basic structure
    pub fn evaluate_narrative(&self, content: &str, plan: &ChapterPlan) -> DimensionScore {
        let mut issues = Vec::new();
        let words = count_words(content);
        let target = plan.target_word_count as f64;

        if words == 0 {
            issues.push(issue(
                QualityDimension::Narrative,
                IssueSeverity::Critical,
                None,
                "Chapter content is empty",
                None,
            ));
        } else if target > 0.0 {
            let ratio = words as f64 / target;
            if ratio < 0.5 {
                issues.push(issue(
                    QualityDimension::Narrative,
                    IssueSeverity::Major,
                    None,
                    format!(
                        "Chapter is far below target length ({} of {} words)",
                        words, plan.target_word_count
                    ),
                    Some("Expand the chapter toward its target length".to_string()),
                ));
            } else if ratio < 0.75 || ratio > 1.5 {
                issues.push(issue(
                    QualityDimension::Narrative,
                    IssueSeverity::Moderate,
                    None,
                    format!(
                        "Chapter length deviates from target ({} of {} words)",
                        words, plan.target_word_count
                    ),
                    Some("Adjust the chapter length toward its target".to_string()),
                ));
            }
        }
        if paragraphs(content).len() < 3 && words > 300 {
            issues.push(issue(
                QualityDimension::Narrative,
                IssueSeverity::Moderate,
                None,
                "Chapter has almost no paragraph breaks",
                Some("Break the prose into paragraphs".to_string()),
            ));
        }
        score_from_issues(QualityDimension::Narrative, issues)
    }

    /// Character consistency: expected characters actually appear
    pub fn evaluate_character_consistency(
        &self,
        content: &str,
        blueprint: &Blueprint,
        plan: &ChapterPlan,
    ) -> DimensionScore {
        let mut issues = Vec::new();
        let lower = content.to_lowercase();

        if !lower.contains(&plan.pov_character.to_lowercase()) {
            issues.push(issue(
                QualityDimension::CharacterConsistency,
                IssueSeverity::Major,
                None,
                format!(
                    "POV character {} never appears by name",
                    plan.pov_character
                ),
                Some(format!(
                    "Anchor the chapter in {}'s perspective by name",
                    plan.pov_character
                )),
            ));
        }
        for name in &plan.featured_characters {
            if blueprint.character(name).is_some() && !lower.contains(&name.to_lowercase()) {
                issues.push(issue(
                    QualityDimension::CharacterConsistency,
                    IssueSeverity::Moderate,
                    None,
                    format!("Featured character {name} does not appear"),
                    Some(format!("Include {name} as planned for this chapter")),
                ));
            }
        }
        score_from_issues(QualityDimension::CharacterConsistency, issues)
    }

    /// Plot adherence: required key events are reflected in the text
    pub fn evaluate_plot_adherence(&self, content: &str, plan: &ChapterPlan) -> DimensionScore {
        let mut issues = Vec::new();
        let lower = content.to_lowercase();

        for event in &plan.key_events {
            let keywords: Vec<String> = event
                .to_lowercase()
                .split_whitespace()
                .filter(|w| w.len() > 4)
                .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
                .filter(|w| !w.is_empty())
                .collect();
            if keywords.is_empty() {
                continue;
            }
            let hits = keywords.iter().filter(|k| lower.contains(k.as_str())).count();
            if hits * 2 < keywords.len() {
                issues.push(issue(
                    QualityDimension::PlotAdherence,
                    IssueSeverity::Major,
                    None,
                    format!("Required event not evident: {event}"),
                    Some(format!("Work the event into the chapter: {event}")),
                ));
            }
        }
        score_from_issues(QualityDimension::PlotAdherence, issues)
    }

    /// Style: mechanical prose texture checks
    pub fn evaluate_style(&self, content: &str, blueprint: &Blueprint) -> DimensionScore {
        let mut issues = Vec::new();
        let words = count_words(content).max(1);

        let adverbs = self.adverb.find_iter(content).count();
        if adverbs as f64 / words as f64 > 0.06 {
            issues.push(issue(
                QualityDimension::Style,
                IssueSeverity::Minor,
                None,
                "Heavy adverb density",
                Some("Replace weak verb + adverb pairs with stronger verbs".to_string()),
            ));
        }
        if self.doubled_punctuation.is_match(content) {
            issues.push(QualityIssue {
                dimension: QualityDimension::Style,
                severity: IssueSeverity::Minor,
                paragraph: None,
                description: "Doubled punctuation marks".to_string(),
                suggested_fix: Some("Collapse repeated punctuation".to_string()),
                auto_fixable: true,
            });
        }
        if self.multi_space.is_match(content) || self.space_before_punctuation.is_match(content) {
            issues.push(QualityIssue {
                dimension: QualityDimension::Style,
                severity: IssueSeverity::Minor,
                paragraph: None,
                description: "Irregular spacing around words or punctuation".to_string(),
                suggested_fix: Some("Normalize whitespace".to_string()),
                auto_fixable: true,
            });
        }
        let exclamations = content.matches('!').count();
        if exclamations as f64 / words as f64 > 0.01 && !blueprint.style.tone.contains("frantic") {
            issues.push(issue(
                QualityDimension::Style,
                IssueSeverity::Minor,
                None,
                "Overuse of exclamation marks",
                Some("Reserve exclamation marks for genuine emphasis".to_string()),
            ));
        }
        score_from_issues(QualityDimension::Style, issues)
    }

    /// Pacing: paragraph and sentence rhythm
    pub fn evaluate_pacing(&self, content: &str) -> DimensionScore {
        let mut issues = Vec::new();
        let paras = paragraphs(content);

        for (idx, para) in paras.iter().enumerate() {
            if count_words(para) > 250 {
                issues.push(issue(
                    QualityDimension::Pacing,
                    IssueSeverity::Minor,
                    Some(idx),
                    "Very long unbroken paragraph",
                    Some("Split the paragraph to vary the rhythm".to_string()),
                ));
            }
        }
        let sentences = content
            .split(['.', '!', '?'])
            .filter(|s| !s.trim().is_empty())
            .count()
            .max(1);
        let avg_sentence_words = count_words(content) as f64 / sentences as f64;
        if avg_sentence_words > 35.0 {
            issues.push(issue(
                QualityDimension::Pacing,
                IssueSeverity::Moderate,
                None,
                "Average sentence length is very high",
                Some("Shorten sentences to improve pacing".to_string()),
            ));
        }
        score_from_issues(QualityDimension::Pacing, issues)
    }

    /// Dialogue: quote balance and presence where scenes expect it
    pub fn evaluate_dialogue(&self, content: &str, plan: &ChapterPlan) -> DimensionScore {
        let mut issues = Vec::new();
        let quotes = content.matches('"').count();

        if quotes % 2 != 0 {
            issues.push(issue(
                QualityDimension::Dialogue,
                IssueSeverity::Moderate,
                None,
                "Unbalanced quotation marks",
                Some("Close every opened quotation".to_string()),
            ));
        }
        let multi_character_scene = plan
            .scenes
            .iter()
            .any(|s| s.characters.len() > 1)
            || !plan.featured_characters.is_empty();
        if quotes == 0 && multi_character_scene && count_words(content) > 500 {
            issues.push(issue(
                QualityDimension::Dialogue,
                IssueSeverity::Minor,
                None,
                "No dialogue despite multi-character scenes",
                Some("Let the characters speak in at least one scene".to_string()),
            ));
        }
        score_from_issues(QualityDimension::Dialogue, issues)
    }

    // -------------------------------------------------------------------------
    // Revision instructions and auto-fix
    // -------------------------------------------------------------------------

    /// Rank issues by severity x impact and return at most `max_count`
    /// actionable instructions
    pub fn generate_revision_instructions(
        &self,
        report: &QualityReport,
        max_count: usize,
    ) -> Vec<String> {
        let mut ranked: Vec<&QualityIssue> = report.all_issues();
        ranked.sort_by(|a, b| {
            b.priority()
                .partial_cmp(&a.priority())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
            .into_iter()
            .take(max_count)
            .map(|issue| {
                issue
                    .suggested_fix
                    .clone()
                    .unwrap_or_else(|| issue.description.clone())
            })
            .collect()
    }

    /// Apply deterministic mechanical fixes only. Returns the fixed
    /// content along with resolved and unresolved issues; nothing is
    /// dropped.
    pub fn auto_fix(&self, content: &str, issues: Vec<QualityIssue>) -> AutoFixOutcome {
        let (fixable, unresolved): (Vec<_>, Vec<_>) =
            issues.into_iter().partition(|i| i.auto_fixable);

        if fixable.is_empty() {
            return AutoFixOutcome {
                content: content.to_string(),
                resolved: Vec::new(),
                unresolved,
            };
        }

        let fixed = self
            .doubled_punctuation
            .replace_all(content, "${1}${2}${3}${4}${5}");
        let fixed = self.space_before_punctuation.replace_all(&fixed, "$1");
        let fixed = self.multi_space.replace_all(&fixed, " ");
        let fixed = fixed
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");

        AutoFixOutcome {
            content: fixed,
            resolved: fixable,
            unresolved,
        }
    }
}

impl Default for QualityEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

fn paragraphs(text: &str) -> Vec<&str> {
    text.split("\n\n").filter(|p| !p.trim().is_empty()).collect()
}

fn issue(
    dimension: QualityDimension,
    severity: IssueSeverity,
    paragraph: Option<usize>,
    description: impl Into<String>,
    suggested_fix: Option<String>,
) -> QualityIssue {
    QualityIssue {
        dimension,
        severity,
        paragraph,
        description: description.into(),
        suggested_fix,
        auto_fixable: false,
    }
}

fn score_from_issues(dimension: QualityDimension, issues: Vec<QualityIssue>) -> DimensionScore {
    let penalty: f64 = issues.iter().map(|i| i.severity.weight()).sum();
    DimensionScore {
        dimension,
        score: (100.0 - penalty).clamp(0.0, 100.0),
        issues,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Act, Blueprint, ChapterPlan, CharacterProfile, CharacterRole, PointOfView, StyleGuide,
        Tense,
    };

    fn fixture() -> (Blueprint, ChapterPlan) {
        let plan = ChapterPlan {
            number: 1,
            title: "One".to_string(),
            summary: "Mara finds the charter".to_string(),
            target_word_count: 60,
            pov_character: "Mara".to_string(),
            featured_characters: vec!["Edwin".to_string()],
            featured_locations: vec![],
            scenes: vec![],
            key_events: vec!["Mara signs the charter".to_string()],
        };
        let blueprint = Blueprint {
            title: "Book".to_string(),
            premise: "p".to_string(),
            genre: "fantasy".to_string(),
            target_word_count: 50_000,
            acts: vec![Act {
                number: 1,
                title: "A".to_string(),
                summary: String::new(),
                chapters: vec![plan.clone()],
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
            locations: vec![],
            plot_threads: vec![],
            style: StyleGuide {
                pov: PointOfView::ThirdLimited,
                tense: Tense::Past,
                tone: "calm".to_string(),
                notes: String::new(),
            },
        };
        (blueprint, plan)
    }

    fn good_content() -> String {
        let mut text = String::new();
        text.push_str("Mara walked to the guild hall in the rain. ");
        text.push_str("Edwin waited with the charter spread on the table.\n\n");
        text.push_str("\"Sign it,\" Edwin said. \"The survey starts at dawn.\"\n\n");
        text.push_str("Mara read every clause twice. Then she signed the charter ");
        text.push_str("and felt the paper grow warm beneath her hand. ");
        text.push_str("The storm outside went quiet. She did not look away.\n\n");
        text.push_str("Later she walked home alone and thought about maps.");
        text
    }

    #[test]
    fn test_weights_sum_to_one() {
        let sum = weights::WEIGHT_NARRATIVE
            + weights::WEIGHT_CHARACTER
            + weights::WEIGHT_PLOT
            + weights::WEIGHT_STYLE
            + weights::WEIGHT_PACING
            + weights::WEIGHT_DIALOGUE;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_clean_content_scores_high() {
        let (bp, plan) = fixture();
        let report = QualityEvaluator::new().evaluate(&good_content(), &bp, &plan);
        assert!(report.overall > 85.0, "overall was {}", report.overall);
        assert_eq!(report.issue_count(), 0);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let (bp, plan) = fixture();
        let evaluator = QualityEvaluator::new();
        let first = evaluator.evaluate(&good_content(), &bp, &plan);
        let second = evaluator.evaluate(&good_content(), &bp, &plan);
        assert_eq!(first.overall, second.overall);
        assert_eq!(first.issue_count(), second.issue_count());
    }

    #[test]
    fn test_missing_pov_character_flagged() {
        let (bp, plan) = fixture();
        let content = "Someone unnamed did things for a while and then stopped.";
        let report = QualityEvaluator::new().evaluate(content, &bp, &plan);
        let character = report
            .dimension(QualityDimension::CharacterConsistency)
            .unwrap();
        assert!(character
            .issues
            .iter()
            .any(|i| i.description.contains("POV character Mara")));
        assert!(character.score < 100.0);
    }

    #[test]
    fn test_missing_key_event_flagged() {
        let (bp, plan) = fixture();
        let content = "Mara and Edwin argued about the weather.\n\nNothing was agreed.\n\nThey left.";
        let report = QualityEvaluator::new().evaluate(content, &bp, &plan);
        let plot = report.dimension(QualityDimension::PlotAdherence).unwrap();
        assert!(plot.issues.iter().any(|i| i.description.contains("charter")));
    }

    #[test]
    fn test_unbalanced_quotes_flagged() {
        let evaluator = QualityEvaluator::new();
        let (_, plan) = fixture();
        let score = evaluator.evaluate_dialogue("\"An open quote with no close.", &plan);
        assert!(score
            .issues
            .iter()
            .any(|i| i.description.contains("Unbalanced")));
    }

    #[test]
    fn test_instructions_ranked_by_priority() {
        let evaluator = QualityEvaluator::new();
        let report = QualityReport {
            scores: vec![
                DimensionScore {
                    dimension: QualityDimension::Style,
                    score: 95.0,
                    issues: vec![issue(
                        QualityDimension::Style,
                        IssueSeverity::Minor,
                        None,
                        "minor style nit",
                        None,
                    )],
                },
                DimensionScore {
                    dimension: QualityDimension::PlotAdherence,
                    score: 80.0,
                    issues: vec![issue(
                        QualityDimension::PlotAdherence,
                        IssueSeverity::Major,
                        None,
                        "missing event",
                        Some("Add the missing event".to_string()),
                    )],
                },
            ],
            overall: 90.0,
            evaluated_at: Utc::now(),
        };
        let instructions = evaluator.generate_revision_instructions(&report, 1);
        assert_eq!(instructions, vec!["Add the missing event".to_string()]);
    }

    #[test]
    fn test_auto_fix_resolves_mechanical_issues_only() {
        let evaluator = QualityEvaluator::new();
        let content = "She paused ,, then spoke  twice.";
        let issues = vec![
            QualityIssue {
                dimension: QualityDimension::Style,
                severity: IssueSeverity::Minor,
                paragraph: None,
                description: "Doubled punctuation marks".to_string(),
                suggested_fix: None,
                auto_fixable: true,
            },
            issue(
                QualityDimension::PlotAdherence,
                IssueSeverity::Major,
                None,
                "missing event",
                None,
            ),
        ];
        let outcome = evaluator.auto_fix(content, issues);
        assert_eq!(outcome.content, "She paused, then spoke twice.");
        assert_eq!(outcome.resolved.len(), 1);
        assert_eq!(outcome.unresolved.len(), 1);
        assert_eq!(
            outcome.unresolved[0].dimension,
            QualityDimension::PlotAdherence
        );
    }

    #[test]
    fn test_auto_fix_without_fixable_issues_keeps_content() {
        let evaluator = QualityEvaluator::new();
        let issues = vec![issue(
            QualityDimension::Narrative,
            IssueSeverity::Moderate,
            None,
            "too short",
            None,
        )];
        let outcome = evaluator.auto_fix("original text", issues);
        assert_eq!(outcome.content, "original text");
        assert_eq!(outcome.unresolved.len(), 1);
    }
}
