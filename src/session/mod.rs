//! Session Orchestration
//!
//! The orchestrator drives whole-book generation: one session per book,
//! chapters strictly in order, each chapter moving through its pipeline
//! phases (context assembly, generation, quality check, continuity
//! verification, bounded revision, finalization). It owns the session
//! state machine, honors pause and cancel requests at cooperative
//! checkpoints, writes a checkpoint at every phase transition, and
//! pushes progress events to an optional consumer.
//!
//! Concurrency model: one registry entry per session, each wrapped in a
//! `SessionRuntime`. The session record sits behind an async mutex and
//! is only held across quick mutations, never across provider calls.

pub mod control;
pub mod progress;
pub mod store;

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::ai::{
    ModelCatalog, PricingTable, ProviderKind, QualityMode, SharedMetrics, SharedProvider,
    create_shared_metrics,
};
use crate::constants::{context as caps, generation as tuning, quality as quality_caps};
use crate::continuity::ContinuityTracker;
use crate::generation::{ContextAssembler, ContextOptions, GenerationExecutor, PreviousChapter};
use crate::quality::{QualityEvaluator, QualityIssue};
use crate::types::{
    Blueprint, ChapterStatus, GeneratedChapter, GenerationPhase, GenerationSession, NovelError,
    Result, SessionStatus,
};

pub use control::ControlHandle;
pub use progress::{ProgressSink, ProgressUpdate};
pub use store::{CheckpointManager, FileStore, MemoryStore, SessionStore, SharedStore};

// =============================================================================
// Session Options
// =============================================================================

/// Per-session tuning supplied at start
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub mode: QualityMode,
    /// Explicit model id, bypassing the catalog
    pub model_override: Option<String>,
    /// Generation attempts per chapter (initial + revisions)
    pub max_attempts: u32,
    /// Overall quality score a chapter must reach to finalize clean
    pub quality_threshold: f64,
    pub context: ContextOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            mode: QualityMode::Standard,
            model_override: None,
            max_attempts: tuning::DEFAULT_MAX_ATTEMPTS,
            quality_threshold: tuning::DEFAULT_QUALITY_THRESHOLD,
            context: ContextOptions::default(),
        }
    }
}

/// Aggregate numbers for one session, combining the session record with
/// the live usage metrics
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatistics {
    pub session_id: String,
    pub status: SessionStatus,
    pub chapters_total: usize,
    pub chapters_completed: usize,
    /// Current book length: the sum of finalized chapter word counts.
    /// Shrinks when a regeneration or revision produces a shorter
    /// chapter; see [`words_generated`](Self::words_generated) for the
    /// monotone counter.
    pub total_words: u64,
    /// Cumulative words across every finalized draft, never decreasing
    pub words_generated: u64,
    pub total_cost_usd: f64,
    pub api_calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub avg_latency_ms: f64,
    pub words_per_minute: f64,
    pub elapsed_ms: u64,
}

// =============================================================================
// Session Runtime
// =============================================================================

/// Everything one running session owns
struct SessionRuntime {
    blueprint: Blueprint,
    options: SessionOptions,
    control: ControlHandle,
    metrics: SharedMetrics,
    session: Mutex<GenerationSession>,
    tracker: Mutex<ContinuityTracker>,
}

// =============================================================================
// Session Orchestrator
// =============================================================================

pub struct SessionOrchestrator {
    provider: SharedProvider,
    provider_kind: ProviderKind,
    catalog: ModelCatalog,
    pricing: PricingTable,
    checkpoints: CheckpointManager,
    progress: ProgressSink,
    evaluator: QualityEvaluator,
    sessions: DashMap<String, Arc<SessionRuntime>>,
}

impl SessionOrchestrator {
    pub fn new(provider: SharedProvider, provider_kind: ProviderKind, store: SharedStore) -> Self {
        Self {
            provider,
            provider_kind,
            catalog: ModelCatalog::builtin(),
            pricing: PricingTable::builtin(),
            checkpoints: CheckpointManager::new(store),
            progress: ProgressSink::discard(),
            evaluator: QualityEvaluator::new(),
            sessions: DashMap::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Create a session for a validated blueprint. The session starts in
    /// `NotStarted`; call [`run`](Self::run) to drive it.
    pub async fn start(&self, blueprint: Blueprint, options: SessionOptions) -> Result<String> {
        blueprint.validate()?;
        let chapters = blueprint
            .chapter_plans()
            .map(|plan| GeneratedChapter::pending(plan.number, plan.title.clone()))
            .collect();
        let session = GenerationSession::new(blueprint.title.clone(), chapters);
        let id = session.id.clone();

        let runtime = Arc::new(SessionRuntime {
            metrics: create_shared_metrics(id.clone()),
            control: ControlHandle::new(),
            session: Mutex::new(session),
            tracker: Mutex::new(ContinuityTracker::new()),
            blueprint,
            options,
        });
        self.checkpoint(&runtime, GenerationPhase::Initializing, None)
            .await?;
        self.sessions.insert(id.clone(), runtime);
        info!(session = %id, "Session created");
        Ok(id)
    }

    /// Rebuild a session from its latest checkpoint.
    ///
    /// The blueprint is an external input and is not embedded in
    /// checkpoints; the caller supplies the same one the session was
    /// started with. Continuity history is rebuilt by replaying every
    /// finalized chapter in order, so a resumed session sees exactly the
    /// state an uninterrupted run would have.
    pub async fn resume_from_checkpoint(
        &self,
        blueprint: Blueprint,
        session_id: &str,
        options: SessionOptions,
    ) -> Result<String> {
        blueprint.validate()?;
        let mut session = self
            .checkpoints
            .restore(session_id)
            .await?
            .ok_or_else(|| {
                NovelError::Session(format!("no checkpoint found for session {session_id}"))
            })?;
        if session.status.is_terminal() {
            return Err(NovelError::Session(format!(
                "session {session_id} is {} and cannot be resumed",
                session.status
            )));
        }

        // A crash can leave a chapter in-flight; it reruns from scratch
        for chapter in &mut session.chapters {
            if chapter.status == ChapterStatus::InProgress {
                chapter.status = ChapterStatus::Pending;
            }
        }
        session.current_chapter = None;

        let mut tracker = ContinuityTracker::new();
        for chapter in session.completed_chapters() {
            tracker.record_chapter(&chapter.content, &blueprint, chapter.number);
        }

        let runtime = Arc::new(SessionRuntime {
            metrics: create_shared_metrics(session_id),
            control: ControlHandle::new(),
            session: Mutex::new(session),
            tracker: Mutex::new(tracker),
            blueprint,
            options,
        });
        self.sessions.insert(session_id.to_string(), runtime);
        info!(session = %session_id, "Session restored from checkpoint");
        Ok(session_id.to_string())
    }

    /// Drive the session until it completes, pauses, cancels, or fails.
    ///
    /// Pause is honored only here, between chapters; cancel is honored
    /// at every cooperative checkpoint. A session whose chapters are all
    /// terminal but not all clean pauses for manual review instead of
    /// completing.
    pub async fn run(&self, session_id: &str) -> Result<SessionStatus> {
        let runtime = self.runtime(session_id)?;

        {
            let mut session = runtime.session.lock().await;
            match session.status {
                SessionStatus::NotStarted => {
                    session.transition_to(SessionStatus::Generating)?;
                }
                SessionStatus::Paused => {
                    runtime.control.clear_pause();
                    session.transition_to(SessionStatus::Generating)?;
                }
                SessionStatus::Generating | SessionStatus::Evaluating | SessionStatus::Revising => {}
                status => {
                    return Err(NovelError::Session(format!(
                        "session {session_id} is {status} and cannot run"
                    )));
                }
            }
        }

        loop {
            // Between-chapter checkpoint: cancel outranks pause
            if runtime.control.is_cancel_requested() {
                return self.finish_cancelled(&runtime).await;
            }
            if runtime.control.is_pause_requested() {
                runtime.control.clear_pause();
                {
                    let mut session = runtime.session.lock().await;
                    session.transition_to(SessionStatus::Paused)?;
                }
                self.checkpoint(&runtime, GenerationPhase::Initializing, None)
                    .await?;
                info!(session = %session_id, "Session paused");
                return Ok(SessionStatus::Paused);
            }

            let next = { runtime.session.lock().await.next_pending_chapter() };
            let Some(number) = next else {
                return self.finish_exhausted(&runtime).await;
            };

            match self.run_chapter(&runtime, number).await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {
                    self.reset_chapter(&runtime, number).await;
                    return self.finish_cancelled(&runtime).await;
                }
                Err(
                    e @ (NovelError::ContextBuild { .. }
                    | NovelError::Generation { .. }
                    | NovelError::Llm(_)
                    | NovelError::LlmApi(_)),
                ) => {
                    // Chapter-scoped failure; the session moves on
                    error!(session = %session_id, chapter = number, error = %e, "Chapter pipeline failed");
                    {
                        let mut session = runtime.session.lock().await;
                        if let Some(chapter) = session.chapter_mut(number) {
                            chapter.status = ChapterStatus::Failed;
                        }
                        session.current_chapter = None;
                        session.error_message = Some(e.to_string());
                    }
                    self.checkpoint(&runtime, GenerationPhase::Completed, Some(number))
                        .await?;
                }
                Err(e) => {
                    error!(session = %session_id, chapter = number, error = %e, "Session failed");
                    {
                        let mut session = runtime.session.lock().await;
                        session.error_message = Some(e.to_string());
                        session.transition_to(SessionStatus::Error)?;
                    }
                    self.checkpoint(&runtime, GenerationPhase::Completed, Some(number))
                        .await?;
                    return Err(e);
                }
            }
        }
    }

    /// Request a pause; honored before the next chapter starts
    pub fn pause(&self, session_id: &str) -> Result<()> {
        self.runtime(session_id)?.control.request_pause();
        Ok(())
    }

    /// Request cancellation; honored at the next cooperative checkpoint
    pub fn cancel(&self, session_id: &str) -> Result<()> {
        self.runtime(session_id)?.control.request_cancel();
        Ok(())
    }

    /// Continue a paused session
    pub async fn resume(&self, session_id: &str) -> Result<SessionStatus> {
        self.run(session_id).await
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    /// Immutable snapshot of the session record
    pub async fn snapshot(&self, session_id: &str) -> Result<GenerationSession> {
        Ok(self.runtime(session_id)?.session.lock().await.clone())
    }

    pub async fn statistics(&self, session_id: &str) -> Result<SessionStatistics> {
        let runtime = self.runtime(session_id)?;
        let session = runtime.session.lock().await;
        let metrics = runtime.metrics.summary();
        Ok(SessionStatistics {
            session_id: session.id.clone(),
            status: session.status,
            chapters_total: session.chapters.len(),
            chapters_completed: session.completed_count(),
            total_words: session.total_words,
            words_generated: metrics.words_generated,
            total_cost_usd: session.total_cost_usd,
            api_calls: metrics.api_calls,
            input_tokens: metrics.input_tokens,
            output_tokens: metrics.output_tokens,
            avg_latency_ms: metrics.avg_latency_ms,
            words_per_minute: metrics.words_per_minute,
            elapsed_ms: metrics.elapsed_ms,
        })
    }

    /// Register an object for continuity tracking across chapters
    pub async fn track_object(&self, session_id: &str, object_id: &str, name: &str) -> Result<()> {
        let runtime = self.runtime(session_id)?;
        runtime.tracker.lock().await.track_object(object_id, name);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Review Workflow
    // -------------------------------------------------------------------------

    /// Approve a generated chapter, finalizing it.
    ///
    /// Approving a chapter that needed review also feeds it into the
    /// continuity history, since its content is now canonical.
    pub async fn approve_chapter(&self, session_id: &str, number: u32) -> Result<()> {
        let runtime = self.runtime(session_id)?;
        let newly_finalized = {
            let mut session = runtime.session.lock().await;
            let chapter = chapter_mut(&mut session, number)?;
            if !matches!(
                chapter.status,
                ChapterStatus::Completed | ChapterStatus::NeedsReview
            ) {
                return Err(NovelError::Session(format!(
                    "chapter {number} is {} and cannot be approved",
                    chapter.status.as_str()
                )));
            }
            let was_review = chapter.status == ChapterStatus::NeedsReview;
            chapter.approve();
            was_review.then(|| chapter.content.clone())
        };
        if let Some(content) = newly_finalized {
            let mut tracker = runtime.tracker.lock().await;
            tracker.record_chapter(&content, &runtime.blueprint, number);
        }
        self.checkpoint(&runtime, GenerationPhase::Completed, Some(number))
            .await
    }

    /// Send a chapter back for manual review
    pub async fn reject_chapter(&self, session_id: &str, number: u32) -> Result<()> {
        let runtime = self.runtime(session_id)?;
        {
            let mut session = runtime.session.lock().await;
            let chapter = chapter_mut(&mut session, number)?;
            chapter.approved = false;
            chapter.status = ChapterStatus::NeedsReview;
        }
        self.checkpoint(&runtime, GenerationPhase::Completed, Some(number))
            .await
    }

    /// Revise an already-generated chapter with caller-supplied
    /// instructions, then re-run the quality and continuity checks.
    pub async fn request_revision(
        &self,
        session_id: &str,
        number: u32,
        instructions: Vec<String>,
        preserve: Vec<String>,
    ) -> Result<GeneratedChapter> {
        let runtime = self.runtime(session_id)?;
        let (previous_content, was_paused, was_completed) = {
            let mut session = runtime.session.lock().await;
            if session.status.is_terminal() {
                return Err(NovelError::Session(format!(
                    "session {session_id} is {} and cannot revise chapters",
                    session.status
                )));
            }
            let was_paused = session.status == SessionStatus::Paused;
            let chapter = chapter_mut(&mut session, number)?;
            if chapter.content.is_empty() {
                return Err(NovelError::Session(format!(
                    "chapter {number} has no content to revise"
                )));
            }
            let content = chapter.content.clone();
            let was_completed = chapter.status == ChapterStatus::Completed;
            chapter.status = ChapterStatus::InProgress;
            chapter.approved = false;
            session.current_chapter = Some(number);
            if session.status != SessionStatus::Generating {
                session.transition_to(SessionStatus::Generating)?;
            }
            (content, was_paused, was_completed)
        };

        let context = self.build_context(&runtime, number).await?;
        let executor = self.executor(&runtime);
        self.emit(
            &runtime,
            GenerationPhase::Revising,
            format!("Revising chapter {number}"),
            Some(number),
        )
        .await;
        let result = executor
            .generate_revision(
                &context,
                runtime.options.mode,
                &previous_content,
                &instructions,
                &preserve,
                runtime.options.model_override.as_deref(),
                &runtime.control,
            )
            .await?;

        {
            let mut session = runtime.session.lock().await;
            session.transition_to(SessionStatus::Evaluating)?;
            let chapter = chapter_mut(&mut session, number)?;
            chapter.record_attempt(result.content.clone(), result.cost_usd);
            session.total_cost_usd += result.cost_usd;
        }

        let passed = self
            .finalize_chapter(&runtime, number, &result.content, !was_completed)
            .await?;
        if was_paused {
            let mut session = runtime.session.lock().await;
            session.transition_to(SessionStatus::Paused)?;
        }
        self.checkpoint(&runtime, GenerationPhase::Completed, Some(number))
            .await?;
        info!(session = %session_id, chapter = number, passed, "Manual revision applied");
        self.snapshot_chapter(&runtime, number).await
    }

    /// Throw a chapter away and run its pipeline again from scratch
    pub async fn regenerate_chapter(
        &self,
        session_id: &str,
        number: u32,
    ) -> Result<GeneratedChapter> {
        let runtime = self.runtime(session_id)?;
        let was_paused = {
            let mut session = runtime.session.lock().await;
            if session.status.is_terminal() {
                return Err(NovelError::Session(format!(
                    "session {session_id} is {} and cannot regenerate chapters",
                    session.status
                )));
            }
            let was_paused = session.status == SessionStatus::Paused;
            let chapter = chapter_mut(&mut session, number)?;
            chapter.status = ChapterStatus::Pending;
            chapter.approved = false;
            chapter.quality_score = None;
            chapter.unresolved_issues.clear();
            was_paused
        };

        self.run_chapter(&runtime, number).await?;
        if was_paused {
            let mut session = runtime.session.lock().await;
            session.transition_to(SessionStatus::Paused)?;
        }
        info!(session = %session_id, chapter = number, "Chapter regenerated");
        self.snapshot_chapter(&runtime, number).await
    }

    // -------------------------------------------------------------------------
    // Chapter Pipeline
    // -------------------------------------------------------------------------

    async fn run_chapter(&self, runtime: &Arc<SessionRuntime>, number: u32) -> Result<()> {
        runtime.control.checkpoint()?;

        {
            let mut session = runtime.session.lock().await;
            if session.status != SessionStatus::Generating {
                session.transition_to(SessionStatus::Generating)?;
            }
            session.current_chapter = Some(number);
            chapter_mut(&mut session, number)?.status = ChapterStatus::InProgress;
        }
        self.emit(
            runtime,
            GenerationPhase::BuildingContext,
            format!("Assembling context for chapter {number}"),
            Some(number),
        )
        .await;

        let context = self.build_context(runtime, number).await?;
        self.checkpoint(runtime, GenerationPhase::BuildingContext, Some(number))
            .await?;

        let executor = self.executor(runtime);
        let model_override = runtime.options.model_override.as_deref();

        let mut instructions: Vec<String> = Vec::new();
        let mut current: Option<String> = None;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            {
                let mut session = runtime.session.lock().await;
                if session.status != SessionStatus::Generating {
                    session.transition_to(SessionStatus::Generating)?;
                }
            }
            self.emit(
                runtime,
                GenerationPhase::Generating,
                format!("Generating chapter {number}, attempt {attempt}"),
                Some(number),
            )
            .await;

            let result = match &current {
                Some(previous) => {
                    executor
                        .generate_revision(
                            &context,
                            runtime.options.mode,
                            previous,
                            &instructions,
                            &[],
                            model_override,
                            &runtime.control,
                        )
                        .await?
                }
                None => {
                    executor
                        .generate(&context, runtime.options.mode, model_override, &runtime.control)
                        .await?
                }
            };
            if result.refinement_degraded {
                warn!(chapter = number, "Refinement pass degraded, draft kept");
            }

            {
                let mut session = runtime.session.lock().await;
                session.transition_to(SessionStatus::Evaluating)?;
                chapter_mut(&mut session, number)?
                    .record_attempt(result.content.clone(), result.cost_usd);
                session.total_cost_usd += result.cost_usd;
            }
            self.checkpoint(runtime, GenerationPhase::Generating, Some(number))
                .await?;

            self.emit(
                runtime,
                GenerationPhase::QualityCheck,
                format!("Evaluating chapter {number}"),
                Some(number),
            )
            .await;
            let plan = runtime.blueprint.chapter_plan(number).ok_or_else(|| {
                NovelError::context_build(number, "chapter is not in the blueprint")
            })?;
            let report = self.evaluator.evaluate(&result.content, &runtime.blueprint, plan);
            let issues: Vec<QualityIssue> =
                report.all_issues().into_iter().cloned().collect();
            let fixed = self.evaluator.auto_fix(&result.content, issues);
            self.checkpoint(runtime, GenerationPhase::QualityCheck, Some(number))
                .await?;

            self.emit(
                runtime,
                GenerationPhase::ContinuityVerification,
                format!("Verifying continuity for chapter {number}"),
                Some(number),
            )
            .await;
            let continuity = {
                let tracker = runtime.tracker.lock().await;
                tracker.verify_chapter(&fixed.content, &runtime.blueprint, number)
            };

            let passed = report.overall >= runtime.options.quality_threshold
                && continuity.is_clean();
            if !passed && attempt < runtime.options.max_attempts {
                {
                    let mut session = runtime.session.lock().await;
                    session.transition_to(SessionStatus::Revising)?;
                }
                self.checkpoint(runtime, GenerationPhase::Revising, Some(number))
                    .await?;
                self.emit(
                    runtime,
                    GenerationPhase::Revising,
                    format!(
                        "Revising chapter {number}, score {:.0}, {} continuity issues",
                        report.overall,
                        continuity.issues.len()
                    ),
                    Some(number),
                )
                .await;
                instructions = self
                    .evaluator
                    .generate_revision_instructions(&report, quality_caps::DEFAULT_MAX_INSTRUCTIONS);
                instructions.extend(continuity.issues.iter().map(|i| i.description.clone()));
                current = Some(fixed.content);
                runtime.control.checkpoint()?;
                continue;
            }

            self.emit(
                runtime,
                GenerationPhase::Finalizing,
                format!("Finalizing chapter {number}"),
                Some(number),
            )
            .await;
            {
                let mut session = runtime.session.lock().await;
                let chapter = chapter_mut(&mut session, number)?;
                chapter.quality_score = Some(report.overall);
                chapter.unresolved_issues = fixed
                    .unresolved
                    .iter()
                    .map(|i| i.description.clone())
                    .chain(continuity.issues.iter().map(|i| i.description.clone()))
                    .collect();
            }
            self.finalize_chapter(runtime, number, &fixed.content, true)
                .await?;
            self.checkpoint(runtime, GenerationPhase::Completed, Some(number))
                .await?;
            self.emit(
                runtime,
                GenerationPhase::Completed,
                format!("Chapter {number} finalized"),
                Some(number),
            )
            .await;
            info!(
                chapter = number,
                score = report.overall,
                attempts = attempt,
                passed,
                "Chapter finalized"
            );
            return Ok(());
        }
    }

    /// Write the chapter's final content and status, update session
    /// totals, and feed clean chapters into the continuity history.
    /// Returns whether the chapter passed its checks.
    async fn finalize_chapter(
        &self,
        runtime: &SessionRuntime,
        number: u32,
        content: &str,
        record_continuity: bool,
    ) -> Result<bool> {
        let continuity = {
            let tracker = runtime.tracker.lock().await;
            tracker.verify_chapter(content, &runtime.blueprint, number)
        };
        let plan = runtime
            .blueprint
            .chapter_plan(number)
            .ok_or_else(|| NovelError::context_build(number, "chapter is not in the blueprint"))?;
        let report = self.evaluator.evaluate(content, &runtime.blueprint, plan);
        let passed =
            report.overall >= runtime.options.quality_threshold && continuity.is_clean();

        let words = {
            let mut session = runtime.session.lock().await;
            let chapter = chapter_mut(&mut session, number)?;
            chapter.content = content.to_string();
            chapter.word_count = GeneratedChapter::count_words(content);
            chapter.quality_score = Some(report.overall);
            chapter.status = if passed {
                ChapterStatus::Completed
            } else {
                ChapterStatus::NeedsReview
            };
            if !passed {
                chapter.unresolved_issues = report
                    .all_issues()
                    .iter()
                    .map(|i| i.description.clone())
                    .chain(continuity.issues.iter().map(|i| i.description.clone()))
                    .collect();
            }
            let words = chapter.word_count as u64;
            session.current_chapter = None;
            session.total_words = session
                .chapters
                .iter()
                .map(|c| c.word_count as u64)
                .sum();
            words
        };
        runtime.metrics.record_words(words);

        if passed && record_continuity {
            let mut tracker = runtime.tracker.lock().await;
            tracker.record_chapter(content, &runtime.blueprint, number);
        }
        Ok(passed)
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn runtime(&self, session_id: &str) -> Result<Arc<SessionRuntime>> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| NovelError::Session(format!("unknown session: {session_id}")))
    }

    fn executor(&self, runtime: &SessionRuntime) -> GenerationExecutor {
        GenerationExecutor::new(
            self.provider.clone(),
            self.provider_kind,
            self.catalog.clone(),
            self.pricing.clone(),
            runtime.metrics.clone(),
        )
    }

    async fn build_context(
        &self,
        runtime: &SessionRuntime,
        number: u32,
    ) -> Result<crate::generation::GenerationContext> {
        let (previous, continuity) = {
            let session = runtime.session.lock().await;
            let tracker = runtime.tracker.lock().await;
            (
                previous_recaps(&runtime.blueprint, &session, number),
                tracker.build_continuity_context(caps::CONTINUITY_CAP),
            )
        };
        let assembler = ContextAssembler::new(runtime.options.context.clone());
        assembler.assemble(
            &runtime.blueprint,
            number,
            &previous,
            (!continuity.is_empty()).then_some(continuity.as_str()),
        )
    }

    async fn finish_exhausted(&self, runtime: &Arc<SessionRuntime>) -> Result<SessionStatus> {
        let status = {
            let mut session = runtime.session.lock().await;
            let all_clean = session
                .chapters
                .iter()
                .all(|c| c.status == ChapterStatus::Completed);
            if all_clean {
                session.transition_to(SessionStatus::Complete)?;
                info!(session = %session.id, words = session.total_words, "Session complete");
            } else {
                // chapters needing review hold the session open
                session.transition_to(SessionStatus::Paused)?;
                warn!(session = %session.id, "Chapters need review, session paused");
            }
            session.status
        };
        self.checkpoint(runtime, GenerationPhase::Completed, None)
            .await?;
        self.emit(
            runtime,
            GenerationPhase::Completed,
            "Session finished".to_string(),
            None,
        )
        .await;
        Ok(status)
    }

    async fn finish_cancelled(&self, runtime: &Arc<SessionRuntime>) -> Result<SessionStatus> {
        {
            let mut session = runtime.session.lock().await;
            session.current_chapter = None;
            if !session.status.is_terminal() {
                session.transition_to(SessionStatus::Cancelled)?;
            }
            info!(session = %session.id, "Session cancelled");
        }
        self.checkpoint(runtime, GenerationPhase::Completed, None)
            .await?;
        Ok(SessionStatus::Cancelled)
    }

    /// Put an in-flight chapter back to pending after a cancellation so
    /// it is untouched on a later session
    async fn reset_chapter(&self, runtime: &SessionRuntime, number: u32) {
        let mut session = runtime.session.lock().await;
        if let Some(chapter) = session.chapter_mut(number) {
            if chapter.status == ChapterStatus::InProgress {
                chapter.status = ChapterStatus::Pending;
            }
        }
        session.current_chapter = None;
    }

    async fn snapshot_chapter(
        &self,
        runtime: &SessionRuntime,
        number: u32,
    ) -> Result<GeneratedChapter> {
        let session = runtime.session.lock().await;
        session
            .chapter(number)
            .cloned()
            .ok_or_else(|| NovelError::Session(format!("chapter {number} is not in this session")))
    }

    async fn checkpoint(
        &self,
        runtime: &SessionRuntime,
        phase: GenerationPhase,
        chapter: Option<u32>,
    ) -> Result<()> {
        let snapshot = { runtime.session.lock().await.clone() };
        self.checkpoints.checkpoint(&snapshot, phase, chapter).await
    }

    async fn emit(
        &self,
        runtime: &SessionRuntime,
        phase: GenerationPhase,
        operation: String,
        chapter: Option<u32>,
    ) {
        let (session_id, overall_pct, cost, remaining_words) = {
            let session = runtime.session.lock().await;
            let total = session.chapters.len().max(1) as f64;
            let done = session
                .chapters
                .iter()
                .filter(|c| c.status.is_terminal())
                .count() as f64;
            let remaining: u64 = session
                .chapters
                .iter()
                .filter(|c| !c.status.is_terminal())
                .filter_map(|c| runtime.blueprint.chapter_plan(c.number))
                .map(|p| p.target_word_count as u64)
                .sum();
            (
                session.id.clone(),
                (done / total * 100.0).min(100.0),
                session.total_cost_usd,
                remaining,
            )
        };
        let wpm = runtime.metrics.words_per_minute();
        let estimated_remaining_secs = if wpm > 0.0 {
            Some((remaining_words as f64 / wpm * 60.0) as u64)
        } else {
            None
        };
        self.progress.send(ProgressUpdate {
            session_id,
            phase,
            operation,
            overall_pct,
            phase_pct: f64::from(phase.as_u8()) / 7.0 * 100.0,
            current_chapter: chapter,
            words_generated: runtime.metrics.words_generated(),
            cost_so_far_usd: cost,
            estimated_remaining_secs,
        });
    }
}

// =============================================================================
// Free Helpers
// =============================================================================

fn chapter_mut<'a>(
    session: &'a mut GenerationSession,
    number: u32,
) -> Result<&'a mut GeneratedChapter> {
    session
        .chapter_mut(number)
        .ok_or_else(|| NovelError::Session(format!("chapter {number} is not in this session")))
}

/// Recaps of finalized chapters before the given one, in book order.
/// Each recap pairs the planned summary with the chapter's closing
/// words so the next chapter can pick up the thread.
fn previous_recaps(
    blueprint: &Blueprint,
    session: &GenerationSession,
    before: u32,
) -> Vec<PreviousChapter> {
    session
        .completed_chapters()
        .into_iter()
        .filter(|c| c.number < before)
        .map(|c| {
            let mut summary = blueprint
                .chapter_plan(c.number)
                .map(|p| p.summary.clone())
                .unwrap_or_default();
            if !summary.is_empty() {
                summary.push(' ');
            }
            summary.push_str("Ends with: ");
            summary.push_str(&closing_excerpt(&c.content, 40));
            PreviousChapter {
                number: c.number,
                title: c.title.clone(),
                summary,
            }
        })
        .collect()
}

fn closing_excerpt(content: &str, words: usize) -> String {
    let all: Vec<&str> = content.split_whitespace().collect();
    let start = all.len().saturating_sub(words);
    all[start..].join(" ")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::testutil::MockProvider;
    use crate::types::{
        Act, CharacterProfile, CharacterRole, ChapterPlan, PointOfView, StyleGuide, Tense,
    };
    use std::sync::OnceLock;

    /// Prose that passes every deterministic quality check for the test
    /// blueprint: in range of the 60-word target, three paragraphs,
    /// names the POV character, no adverb pileups, no dialogue needed.
    const CLEAN_TEXT: &str = "Mara spread the old charts across the table and compared their borders line by line. None of the coastlines agreed with the survey notes in front of her.\n\nShe worked through the stack again, slower this time, marking every divergence she found.\n\nBy the end of the night Mara understood that the maps had been redrawn on purpose, and she wrote down what that meant.";

    /// Prose that fails a high quality threshold
    const WEAK_TEXT: &str = "Nothing much happened.";

    fn blueprint(chapters: u32) -> Blueprint {
        Blueprint {
            title: "The Hollow Crown".to_string(),
            premise: "A cartographer discovers the kingdom's maps are lies.".to_string(),
            genre: "fantasy".to_string(),
            target_word_count: chapters * 60,
            acts: vec![Act {
                number: 1,
                title: "Act One".to_string(),
                summary: String::new(),
                chapters: (1..=chapters)
                    .map(|n| ChapterPlan {
                        number: n,
                        title: format!("Chapter {n}"),
                        summary: format!("Mara studies the old maps and doubts them, part {n}."),
                        target_word_count: 60,
                        pov_character: "Mara".to_string(),
                        featured_characters: Vec::new(),
                        featured_locations: Vec::new(),
                        scenes: Vec::new(),
                        key_events: Vec::new(),
                    })
                    .collect(),
            }],
            characters: vec![CharacterProfile {
                name: "Mara".to_string(),
                role: CharacterRole::Protagonist,
                description: "A meticulous royal cartographer.".to_string(),
                arc: String::new(),
                voice: String::new(),
            }],
            locations: Vec::new(),
            plot_threads: Vec::new(),
            style: StyleGuide {
                pov: PointOfView::ThirdLimited,
                tense: Tense::Past,
                tone: String::new(),
                notes: String::new(),
            },
        }
    }

    fn orchestrator(provider: MockProvider) -> SessionOrchestrator {
        SessionOrchestrator::new(
            Arc::new(provider),
            ProviderKind::OpenAi,
            Arc::new(MemoryStore::new()),
        )
    }

    fn orchestrator_with_store(
        provider: MockProvider,
        store: SharedStore,
    ) -> SessionOrchestrator {
        SessionOrchestrator::new(Arc::new(provider), ProviderKind::OpenAi, store)
    }

    #[tokio::test]
    async fn test_full_run_completes_all_chapters() {
        let orch = orchestrator(MockProvider::returning(CLEAN_TEXT));
        let id = orch
            .start(blueprint(3), SessionOptions::default())
            .await
            .unwrap();

        let status = orch.run(&id).await.unwrap();
        assert_eq!(status, SessionStatus::Complete);

        let session = orch.snapshot(&id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Complete);
        assert_eq!(session.completed_count(), 3);
        for chapter in &session.chapters {
            assert_eq!(chapter.status, ChapterStatus::Completed);
            assert!(chapter.quality_score.unwrap() >= 70.0);
            assert!(chapter.word_count > 0);
        }
        assert!(session.total_words > 0);

        let stats = orch.statistics(&id).await.unwrap();
        assert_eq!(stats.api_calls, 3);
        assert_eq!(stats.chapters_completed, 3);
        assert!(stats.total_cost_usd > 0.0);
    }

    #[tokio::test]
    async fn test_completed_session_cannot_run_again() {
        let orch = orchestrator(MockProvider::returning(CLEAN_TEXT));
        let id = orch
            .start(blueprint(1), SessionOptions::default())
            .await
            .unwrap();
        orch.run(&id).await.unwrap();
        assert!(orch.run(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_pause_is_honored_between_chapters() {
        // Pause lands during chapter 2's provider call; the chapter
        // still finishes and the session pauses before chapter 3
        let control: Arc<OnceLock<ControlHandle>> = Arc::new(OnceLock::new());
        let hook_control = control.clone();
        let provider = MockProvider::returning(CLEAN_TEXT).with_call_hook(move |call| {
            if call == 2 {
                if let Some(c) = hook_control.get() {
                    c.request_pause();
                }
            }
        });
        let orch = orchestrator(provider);
        let id = orch
            .start(blueprint(3), SessionOptions::default())
            .await
            .unwrap();
        control
            .set(orch.runtime(&id).unwrap().control.clone())
            .ok()
            .unwrap();

        let status = orch.run(&id).await.unwrap();
        assert_eq!(status, SessionStatus::Paused);

        let session = orch.snapshot(&id).await.unwrap();
        assert_eq!(session.chapter(1).unwrap().status, ChapterStatus::Completed);
        assert_eq!(session.chapter(2).unwrap().status, ChapterStatus::Completed);
        assert_eq!(session.chapter(3).unwrap().status, ChapterStatus::Pending);
        assert!(session.chapter(3).unwrap().content.is_empty());

        let status = orch.resume(&id).await.unwrap();
        assert_eq!(status, SessionStatus::Complete);
    }

    #[tokio::test]
    async fn test_cancel_between_premium_passes_keeps_draft_cost_only() {
        // Premium: chapter 1 takes calls 1 and 2; call 3 is chapter 2's
        // draft, during which cancel is requested. The cancellation is
        // honored between chapter 2's passes, so exactly 3 calls bill.
        let control: Arc<OnceLock<ControlHandle>> = Arc::new(OnceLock::new());
        let hook_control = control.clone();
        let provider = MockProvider::returning(CLEAN_TEXT).with_call_hook(move |call| {
            if call == 3 {
                if let Some(c) = hook_control.get() {
                    c.request_cancel();
                }
            }
        });
        let orch = orchestrator(provider);
        let options = SessionOptions {
            mode: QualityMode::Premium,
            ..Default::default()
        };
        let id = orch.start(blueprint(3), options).await.unwrap();
        control
            .set(orch.runtime(&id).unwrap().control.clone())
            .ok()
            .unwrap();

        let status = orch.run(&id).await.unwrap();
        assert_eq!(status, SessionStatus::Cancelled);

        let session = orch.snapshot(&id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Cancelled);
        assert_eq!(session.chapter(1).unwrap().status, ChapterStatus::Completed);
        // chapter 2 is untouched: no content, no recorded cost
        let second = session.chapter(2).unwrap();
        assert_eq!(second.status, ChapterStatus::Pending);
        assert!(second.content.is_empty());
        assert_eq!(second.cost_usd, 0.0);

        let stats = orch.statistics(&id).await.unwrap();
        assert_eq!(stats.api_calls, 3);
    }

    #[tokio::test]
    async fn test_resume_rebuilds_identical_context() {
        let store: SharedStore = Arc::new(MemoryStore::new());

        // Interrupted run: pause lands during chapter 2, so chapters 1
        // and 2 finish and chapter 3 is left pending
        let control: Arc<OnceLock<ControlHandle>> = Arc::new(OnceLock::new());
        let hook_control = control.clone();
        let paused_provider = MockProvider::returning(CLEAN_TEXT).with_call_hook(move |call| {
            if call == 2 {
                if let Some(c) = hook_control.get() {
                    c.request_pause();
                }
            }
        });
        let first = orchestrator_with_store(paused_provider, store.clone());
        let id = first
            .start(blueprint(3), SessionOptions::default())
            .await
            .unwrap();
        control
            .set(first.runtime(&id).unwrap().control.clone())
            .ok()
            .unwrap();
        assert_eq!(first.run(&id).await.unwrap(), SessionStatus::Paused);

        // Resume in a fresh orchestrator, as after a process restart
        let resumed_mock = Arc::new(MockProvider::returning(CLEAN_TEXT));
        let second = SessionOrchestrator::new(resumed_mock.clone(), ProviderKind::OpenAi, store);
        second
            .resume_from_checkpoint(blueprint(3), &id, SessionOptions::default())
            .await
            .unwrap();
        assert_eq!(second.run(&id).await.unwrap(), SessionStatus::Complete);

        // Uninterrupted control run over the same blueprint
        let straight_mock = Arc::new(MockProvider::returning(CLEAN_TEXT));
        let third = SessionOrchestrator::new(
            straight_mock.clone(),
            ProviderKind::OpenAi,
            Arc::new(MemoryStore::new()),
        );
        let control_id = third
            .start(blueprint(3), SessionOptions::default())
            .await
            .unwrap();
        third.run(&control_id).await.unwrap();

        // Chapter 3's prompt after resume matches the uninterrupted one
        let resumed_prompt = resumed_mock.requests()[0].prompt.clone();
        let straight_prompt = straight_mock.requests()[2].prompt.clone();
        assert_eq!(resumed_prompt, straight_prompt);
    }

    #[tokio::test]
    async fn test_revision_loop_exhausts_into_needs_review() {
        let orch = orchestrator(MockProvider::returning(WEAK_TEXT));
        let options = SessionOptions {
            quality_threshold: 95.0,
            ..Default::default()
        };
        let id = orch.start(blueprint(1), options).await.unwrap();

        // all chapters terminal but not clean: session pauses for review
        let status = orch.run(&id).await.unwrap();
        assert_eq!(status, SessionStatus::Paused);

        let session = orch.snapshot(&id).await.unwrap();
        let chapter = session.chapter(1).unwrap();
        assert_eq!(chapter.status, ChapterStatus::NeedsReview);
        assert_eq!(chapter.attempts, tuning::DEFAULT_MAX_ATTEMPTS);
        assert!(!chapter.unresolved_issues.is_empty());
        assert!(chapter.quality_score.unwrap() < 95.0);
    }

    #[tokio::test]
    async fn test_approving_reviewed_chapter_completes_session() {
        let orch = orchestrator(MockProvider::returning(WEAK_TEXT));
        let options = SessionOptions {
            quality_threshold: 95.0,
            ..Default::default()
        };
        let id = orch.start(blueprint(1), options).await.unwrap();
        orch.run(&id).await.unwrap();

        orch.approve_chapter(&id, 1).await.unwrap();
        let session = orch.snapshot(&id).await.unwrap();
        assert!(session.chapter(1).unwrap().approved);
        assert_eq!(session.chapter(1).unwrap().status, ChapterStatus::Completed);

        let status = orch.resume(&id).await.unwrap();
        assert_eq!(status, SessionStatus::Complete);
    }

    #[tokio::test]
    async fn test_regenerate_chapter_after_review() {
        // Three weak attempts exhaust the loop; regeneration then gets
        // clean prose and the chapter passes
        let provider = MockProvider::scripted(vec![
            Ok(WEAK_TEXT.to_string()),
            Ok(WEAK_TEXT.to_string()),
            Ok(WEAK_TEXT.to_string()),
            Ok(CLEAN_TEXT.to_string()),
        ]);
        let orch = orchestrator(provider);
        let options = SessionOptions {
            quality_threshold: 95.0,
            ..Default::default()
        };
        let id = orch.start(blueprint(1), options).await.unwrap();
        assert_eq!(orch.run(&id).await.unwrap(), SessionStatus::Paused);

        let chapter = orch.regenerate_chapter(&id, 1).await.unwrap();
        assert_eq!(chapter.status, ChapterStatus::Completed);
        assert_eq!(chapter.attempts, 4);

        let session = orch.snapshot(&id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Paused);
        assert_eq!(orch.resume(&id).await.unwrap(), SessionStatus::Complete);
    }

    #[tokio::test]
    async fn test_cumulative_word_counter_survives_shorter_regeneration() {
        // A long weak draft fills the book; regenerating it with a much
        // shorter one shrinks total_words, while the cumulative counter
        // keeps every finalized draft's words
        let long_weak = format!("{WEAK_TEXT} ").repeat(20);
        let provider = MockProvider::scripted(vec![
            Ok(long_weak.clone()),
            Ok(long_weak.clone()),
            Ok(long_weak),
            Ok(WEAK_TEXT.to_string()),
        ]);
        let orch = orchestrator(provider);
        let options = SessionOptions {
            quality_threshold: 95.0,
            ..Default::default()
        };
        let id = orch.start(blueprint(1), options).await.unwrap();
        assert_eq!(orch.run(&id).await.unwrap(), SessionStatus::Paused);

        let before = orch.statistics(&id).await.unwrap();
        assert!(before.total_words > 0);
        assert_eq!(before.words_generated, before.total_words);

        orch.regenerate_chapter(&id, 1).await.unwrap();

        let after = orch.statistics(&id).await.unwrap();
        assert!(after.total_words < before.total_words);
        assert_eq!(
            after.words_generated,
            before.words_generated + after.total_words
        );
    }

    #[tokio::test]
    async fn test_request_revision_applies_instructions() {
        let mock = Arc::new(MockProvider::scripted(vec![
            Ok(WEAK_TEXT.to_string()),
            Ok(WEAK_TEXT.to_string()),
            Ok(WEAK_TEXT.to_string()),
            Ok(CLEAN_TEXT.to_string()),
        ]));
        let orch = SessionOrchestrator::new(
            mock.clone(),
            ProviderKind::OpenAi,
            Arc::new(MemoryStore::new()),
        );
        let options = SessionOptions {
            quality_threshold: 95.0,
            ..Default::default()
        };
        let id = orch.start(blueprint(1), options).await.unwrap();
        orch.run(&id).await.unwrap();

        let chapter = orch
            .request_revision(
                &id,
                1,
                vec!["Expand the chapter to the planned length".to_string()],
                vec!["Mara's doubt about the maps".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(chapter.status, ChapterStatus::Completed);

        // the caller's instruction reaches the provider prompt
        let last = mock.requests().last().cloned().unwrap();
        assert!(last.prompt.contains("Expand the chapter to the planned length"));
        assert!(last.prompt.contains("Mara's doubt about the maps"));

        let session = orch.snapshot(&id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Paused);
    }

    #[tokio::test]
    async fn test_provider_failure_marks_chapter_failed_session_continues() {
        let provider = MockProvider::scripted(vec![
            Err(NovelError::LlmApi("provider down".to_string())),
            Ok(CLEAN_TEXT.to_string()),
        ]);
        let orch = orchestrator(provider);
        let id = orch
            .start(blueprint(2), SessionOptions::default())
            .await
            .unwrap();

        // not all chapters clean, so the session pauses for review
        let status = orch.run(&id).await.unwrap();
        assert_eq!(status, SessionStatus::Paused);

        let session = orch.snapshot(&id).await.unwrap();
        assert_eq!(session.chapter(1).unwrap().status, ChapterStatus::Failed);
        assert_eq!(session.chapter(2).unwrap().status, ChapterStatus::Completed);
        assert!(session.error_message.is_some());
    }

    #[tokio::test]
    async fn test_unknown_session_is_an_error() {
        let orch = orchestrator(MockProvider::returning(CLEAN_TEXT));
        assert!(orch.snapshot("missing").await.is_err());
        assert!(orch.pause("missing").is_err());
        assert!(orch.cancel("missing").is_err());
    }

    #[tokio::test]
    async fn test_invalid_blueprint_rejected_at_start() {
        let orch = orchestrator(MockProvider::returning(CLEAN_TEXT));
        let mut bad = blueprint(1);
        bad.acts[0].chapters[0].pov_character = "Nobody".to_string();
        assert!(orch.start(bad, SessionOptions::default()).await.is_err());
    }

    #[test]
    fn test_closing_excerpt_takes_last_words() {
        let text = "one two three four five";
        assert_eq!(closing_excerpt(text, 2), "four five");
        assert_eq!(closing_excerpt(text, 10), text);
    }
}
