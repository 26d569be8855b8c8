//! Cooperative Session Control
//!
//! A cloneable handle carrying pause and cancel requests into the
//! pipeline. Requests are only honored at cooperative checkpoints
//! (before each chapter, between premium passes), never mid-call, so a
//! chapter is either fully processed or untouched.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::types::{NovelError, Result};

const RUN: u8 = 0;
const PAUSE_REQUESTED: u8 = 1;
const CANCEL_REQUESTED: u8 = 2;

/// Shared pause/cancel signal for one session
#[derive(Debug, Clone)]
pub struct ControlHandle {
    state: Arc<AtomicU8>,
}

impl ControlHandle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(RUN)),
        }
    }

    pub fn request_pause(&self) {
        // cancel outranks pause
        let _ = self.state.compare_exchange(
            RUN,
            PAUSE_REQUESTED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn request_cancel(&self) {
        self.state.store(CANCEL_REQUESTED, Ordering::SeqCst);
    }

    /// Called by the orchestrator after honoring a pause
    pub fn clear_pause(&self) {
        let _ = self.state.compare_exchange(
            PAUSE_REQUESTED,
            RUN,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn is_pause_requested(&self) -> bool {
        self.state.load(Ordering::SeqCst) == PAUSE_REQUESTED
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.state.load(Ordering::SeqCst) == CANCEL_REQUESTED
    }

    /// Cooperative cancellation checkpoint. Pause is not checked here;
    /// only the orchestrator honors pauses, and only between chapters.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancel_requested() {
            return Err(NovelError::Cancelled);
        }
        Ok(())
    }
}

impl Default for ControlHandle {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
