//! Generation Session Types
//!
//! A session drives one book's chapters through the generation pipeline.
//! Two layers of state exist:
//!
//! - `SessionStatus`: the externally reported session state machine
//! - `GenerationPhase`: the per-chapter pipeline phase
//!
//! Status transitions are checked: illegal edges are rejected with
//! `NovelError::InvalidTransition` rather than silently applied.
//! Checkpoints are versioned, checksummed snapshots written at phase
//! transitions so resume only ever reads a consistent state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::chapter::{ChapterStatus, GeneratedChapter};
use crate::types::{NovelError, Result};

/// Checkpoint schema version. Bump when the snapshot layout changes.
pub const CHECKPOINT_VERSION: u32 = 1;

// =============================================================================
// Session Status (external state machine)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    Generating,
    Evaluating,
    Revising,
    Paused,
    Complete,
    Error,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Generating => "generating",
            Self::Evaluating => "evaluating",
            Self::Revising => "revising",
            Self::Paused => "paused",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "generating" => Some(Self::Generating),
            "evaluating" => Some(Self::Evaluating),
            "revising" => Some(Self::Revising),
            "paused" => Some(Self::Paused),
            "complete" => Some(Self::Complete),
            "error" => Some(Self::Error),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal states have no outgoing edges
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Cancelled)
    }

    /// Legal state machine edges. Resume is the only way back into
    /// `Generating` once a session leaves the active states, and only
    /// from `Paused`.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (NotStarted, Generating) | (NotStarted, Cancelled) => true,
            (Generating, Evaluating)
            | (Generating, Paused)
            | (Generating, Complete)
            | (Generating, Error)
            | (Generating, Cancelled) => true,
            (Evaluating, Revising)
            | (Evaluating, Generating)
            | (Evaluating, Paused)
            | (Evaluating, Complete)
            | (Evaluating, Error)
            | (Evaluating, Cancelled) => true,
            (Revising, Generating)
            | (Revising, Evaluating)
            | (Revising, Paused)
            | (Revising, Error)
            | (Revising, Cancelled) => true,
            (Paused, Generating) | (Paused, Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Generation Phase (per-chapter pipeline)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPhase {
    Initializing,
    BuildingContext,
    Generating,
    QualityCheck,
    ContinuityVerification,
    Revising,
    Finalizing,
    Completed,
}

impl GenerationPhase {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Initializing => 0,
            Self::BuildingContext => 1,
            Self::Generating => 2,
            Self::QualityCheck => 3,
            Self::ContinuityVerification => 4,
            Self::Revising => 5,
            Self::Finalizing => 6,
            Self::Completed => 7,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Initializing),
            1 => Some(Self::BuildingContext),
            2 => Some(Self::Generating),
            3 => Some(Self::QualityCheck),
            4 => Some(Self::ContinuityVerification),
            5 => Some(Self::Revising),
            6 => Some(Self::Finalizing),
            7 => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::BuildingContext => "building_context",
            Self::Generating => "generating",
            Self::QualityCheck => "quality_check",
            Self::ContinuityVerification => "continuity_verification",
            Self::Revising => "revising",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for GenerationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Generation Session
// =============================================================================

/// The mutable session record. Owned exclusively by the orchestrator
/// running the session; external callers only observe snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSession {
    pub id: String,
    pub book_title: String,
    pub status: SessionStatus,

    /// Chapters in book order, one entry per planned chapter
    pub chapters: Vec<GeneratedChapter>,

    /// Chapter currently in the pipeline, if any
    pub current_chapter: Option<u32>,

    /// Current book length, the sum of finalized chapter word counts.
    /// Regenerating a chapter with a shorter draft lowers it; the
    /// session metrics keep the cumulative, non-decreasing counter.
    pub total_words: u64,
    pub total_cost_usd: f64,

    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub error_message: Option<String>,
}

impl GenerationSession {
    pub fn new(book_title: impl Into<String>, chapters: Vec<GeneratedChapter>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            book_title: book_title.into(),
            status: SessionStatus::NotStarted,
            chapters,
            current_chapter: None,
            total_words: 0,
            total_cost_usd: 0.0,
            started_at: now,
            updated_at: now,
            error_message: None,
        }
    }

    /// Apply a status transition, rejecting illegal edges
    pub fn transition_to(&mut self, next: SessionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(NovelError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// First chapter that has not reached a terminal per-chapter state
    pub fn next_pending_chapter(&self) -> Option<u32> {
        self.chapters
            .iter()
            .find(|c| !c.status.is_terminal())
            .map(|c| c.number)
    }

    pub fn chapter(&self, number: u32) -> Option<&GeneratedChapter> {
        self.chapters.iter().find(|c| c.number == number)
    }

    pub fn chapter_mut(&mut self, number: u32) -> Option<&mut GeneratedChapter> {
        self.chapters.iter_mut().find(|c| c.number == number)
    }

    pub fn completed_count(&self) -> usize {
        self.chapters
            .iter()
            .filter(|c| c.status == ChapterStatus::Completed)
            .count()
    }

    /// Completed chapters in book order, for story-so-far assembly
    pub fn completed_chapters(&self) -> Vec<&GeneratedChapter> {
        self.chapters
            .iter()
            .filter(|c| c.status == ChapterStatus::Completed)
            .collect()
    }
}

// =============================================================================
// Session Checkpoint
// =============================================================================

/// An immutable snapshot of a session at a phase transition.
///
/// Each snapshot carries a schema version and a CRC32 checksum over the
/// serialized session so a corrupted or stale checkpoint is rejected on
/// load instead of resuming from bad state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCheckpoint {
    pub version: u32,
    pub session_id: String,
    pub phase: GenerationPhase,
    pub chapter_number: Option<u32>,
    /// Serialized `GenerationSession` JSON
    pub session_json: String,
    pub created_at: DateTime<Utc>,
    pub checksum: u32,
}

impl SessionCheckpoint {
    pub fn capture(
        session: &GenerationSession,
        phase: GenerationPhase,
        chapter_number: Option<u32>,
    ) -> Result<Self> {
        let session_json = serde_json::to_string(session)?;
        let checksum = crc32fast::hash(session_json.as_bytes());
        Ok(Self {
            version: CHECKPOINT_VERSION,
            session_id: session.id.clone(),
            phase,
            chapter_number,
            session_json,
            created_at: Utc::now(),
            checksum,
        })
    }

    /// Verify version and integrity before use
    pub fn validate(&self) -> Result<()> {
        if self.version != CHECKPOINT_VERSION {
            return Err(NovelError::Session(format!(
                "checkpoint version mismatch: found {}, expected {}",
                self.version, CHECKPOINT_VERSION
            )));
        }
        let computed = crc32fast::hash(self.session_json.as_bytes());
        if computed != self.checksum {
            return Err(NovelError::Session(format!(
                "checkpoint checksum mismatch for session {}",
                self.session_id
            )));
        }
        Ok(())
    }

    /// Reconstruct the session snapshot, validating first
    pub fn restore_session(&self) -> Result<GenerationSession> {
        self.validate()?;
        Ok(serde_json::from_str(&self.session_json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// =============================================================================
// Tests
// =============================================================================
