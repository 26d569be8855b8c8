//! NovelWeave - AI-Assisted Chapter Generation Engine
//!
//! An orchestration engine that turns a book blueprint into finished
//! chapters through sequential LLM generation with deterministic
//! quality evaluation and continuity verification.
//!
//! ## Core Features
//!
//! - **Session Orchestration**: Pause/resume state machine with durable
//!   checkpoints after every pipeline step
//! - **Context Assembly**: Priority-ordered packing of blueprint facts
//!   into a bounded token budget
//! - **Quality Evaluation**: Six deterministic dimensions with safe
//!   auto-fixes and targeted revision instructions
//! - **Continuity Verification**: Append-only character, object, and
//!   timeline histories checked against every draft
//! - **Quality Modes**: Fast, standard, and premium model tiers with
//!   cost tracking per chapter
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use novelweave::ai::{ProviderConfig, ProviderKind, create_provider};
//! use novelweave::session::{FileStore, SessionOrchestrator, SessionOptions};
//!
//! let provider = create_provider(&ProviderConfig::default())?;
//! let store = Arc::new(FileStore::new(".novelweave/checkpoints"));
//! let orchestrator = SessionOrchestrator::new(provider, ProviderKind::OpenAi, store);
//! let session_id = orchestrator.start(blueprint, SessionOptions::default()).await?;
//! let status = orchestrator.run(&session_id).await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: LLM providers, token estimation, model catalog, pricing
//! - [`generation`]: Context assembly, prompts, the generation executor
//! - [`quality`]: Deterministic quality evaluation and auto-fixes
//! - [`continuity`]: Continuity tracking and verification
//! - [`session`]: Orchestrator, checkpoints, progress reporting

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod continuity;
pub mod generation;
pub mod quality;
pub mod session;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{NovelError, Result};

// Session Orchestration
pub use session::{SessionOptions, SessionOrchestrator};

// Core Domain Types
pub use types::{Blueprint, GenerationSession, SessionStatus};
