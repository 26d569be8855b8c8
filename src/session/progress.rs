//! Session Progress Events
//!
//! The orchestrator pushes progress updates into a channel; consumers
//! (CLI renderer, a UI) receive them without ever polling session state.
//! A dropped receiver never stalls the pipeline.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::types::GenerationPhase;

/// One progress event pushed by the orchestrator
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub session_id: String,
    pub phase: GenerationPhase,
    /// Human-readable description of the current operation
    pub operation: String,
    /// Whole-session completion, 0-100
    pub overall_pct: f64,
    /// Current chapter pipeline completion, 0-100
    pub phase_pct: f64,
    pub current_chapter: Option<u32>,
    pub words_generated: u64,
    pub cost_so_far_usd: f64,
    /// Rough remaining time from the observed words-per-minute rate
    pub estimated_remaining_secs: Option<u64>,
}

/// Sending half of the progress channel, cloned into the pipeline
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressUpdate>>,
}

impl ProgressSink {
    /// Create a sink and the receiver a consumer reads from
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every update, for callers without a consumer
    pub fn discard() -> Self {
        Self { tx: None }
    }

    /// Push one update. A closed or absent receiver is not an error.
    pub fn send(&self, update: ProgressUpdate) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(update);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn update(pct: f64) -> ProgressUpdate {
        ProgressUpdate {
            session_id: "s1".to_string(),
            phase: GenerationPhase::Generating,
            operation: "Generating chapter 1".to_string(),
            overall_pct: pct,
            phase_pct: 50.0,
            current_chapter: Some(1),
            words_generated: 1200,
            cost_so_far_usd: 0.04,
            estimated_remaining_secs: Some(90),
        }
    }

    #[tokio::test]
    async fn test_updates_arrive_in_order() {
        let (sink, mut rx) = ProgressSink::channel();
        sink.send(update(10.0));
        sink.send(update(20.0));
        assert_eq!(rx.recv().await.unwrap().overall_pct, 10.0);
        assert_eq!(rx.recv().await.unwrap().overall_pct, 20.0);
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_error() {
        let (sink, rx) = ProgressSink::channel();
        drop(rx);
        sink.send(update(10.0));
    }

    #[test]
    fn test_discard_sink() {
        ProgressSink::discard().send(update(10.0));
    }
}
