//! Session Metrics Collection
//!
//! Centralized aggregation of LLM API usage, cost, and throughput for
//! one generation session. Thread-safe so provider calls can record
//! from any task without locking the session state.
//!
//! ## Usage
//!
//! ```ignore
//! let metrics = MetricsCollector::new("session-123");
//! metrics.record_call(&usage, cost_usd, latency_ms);
//! let summary = metrics.summary();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::ai::provider::TokenUsage;

// =============================================================================
// Metrics Collector
// =============================================================================

/// Thread-safe metrics collector for one session.
///
/// All counters are atomics; cost is stored as microdollars so it can
/// be accumulated atomically. Counters only ever increase.
pub struct MetricsCollector {
    /// Session identifier
    session_id: String,
    /// Session start time
    start_time: Instant,
    /// Total LLM API calls
    api_calls: AtomicU64,
    /// Total input tokens
    input_tokens: AtomicU64,
    /// Total output tokens
    output_tokens: AtomicU64,
    /// Total provider latency in milliseconds
    total_latency_ms: AtomicU64,
    /// Total cost (microdollars, for atomic ops)
    total_cost_micros: AtomicU64,
    /// Total words of finalized prose
    words_generated: AtomicU64,
}

/// Summary statistics for a session
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub session_id: String,
    pub elapsed_ms: u64,
    pub api_calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub avg_latency_ms: f64,
    pub total_cost_usd: f64,
    pub words_generated: u64,
    pub words_per_minute: f64,
}

impl MetricsCollector {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            start_time: Instant::now(),
            api_calls: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            total_cost_micros: AtomicU64::new(0),
            words_generated: AtomicU64::new(0),
        }
    }

    /// Record one completed provider call
    pub fn record_call(&self, usage: &TokenUsage, cost_usd: f64, latency_ms: u64) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
        self.input_tokens
            .fetch_add(usage.input_tokens, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(usage.output_tokens, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
        let cost_micros = (cost_usd * 1_000_000.0) as u64;
        self.total_cost_micros
            .fetch_add(cost_micros, Ordering::Relaxed);
    }

    /// Record words from a finalized chapter
    pub fn record_words(&self, words: u64) {
        self.words_generated.fetch_add(words, Ordering::Relaxed);
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.total_cost_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    pub fn words_generated(&self) -> u64 {
        self.words_generated.load(Ordering::Relaxed)
    }

    /// Words generated per minute since the session started
    pub fn words_per_minute(&self) -> f64 {
        let minutes = self.start_time.elapsed().as_secs_f64() / 60.0;
        if minutes <= 0.0 {
            return 0.0;
        }
        self.words_generated() as f64 / minutes
    }

    pub fn summary(&self) -> MetricsSummary {
        let api_calls = self.api_calls.load(Ordering::Relaxed);
        let input_tokens = self.input_tokens.load(Ordering::Relaxed);
        let output_tokens = self.output_tokens.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);
        MetricsSummary {
            session_id: self.session_id.clone(),
            elapsed_ms: self.start_time.elapsed().as_millis() as u64,
            api_calls,
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            avg_latency_ms: if api_calls > 0 {
                total_latency as f64 / api_calls as f64
            } else {
                0.0
            },
            total_cost_usd: self.total_cost_usd(),
            words_generated: self.words_generated(),
            words_per_minute: self.words_per_minute(),
        }
    }
}

/// Shared metrics collector type
pub type SharedMetrics = Arc<MetricsCollector>;

pub fn create_shared_metrics(session_id: impl Into<String>) -> SharedMetrics {
    Arc::new(MetricsCollector::new(session_id))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_call_accumulates() {
        let metrics = MetricsCollector::new("s1");
        metrics.record_call(&TokenUsage::new(1000, 500), 0.05, 1200);
        metrics.record_call(&TokenUsage::new(2000, 800), 0.10, 800);

        let summary = metrics.summary();
        assert_eq!(summary.api_calls, 2);
        assert_eq!(summary.input_tokens, 3000);
        assert_eq!(summary.output_tokens, 1300);
        assert_eq!(summary.total_tokens, 4300);
        assert!((summary.total_cost_usd - 0.15).abs() < 1e-6);
        assert!((summary.avg_latency_ms - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_record_words_monotonic() {
        let metrics = MetricsCollector::new("s1");
        metrics.record_words(3000);
        metrics.record_words(2800);
        assert_eq!(metrics.words_generated(), 5800);
    }

    #[test]
    fn test_empty_summary() {
        let metrics = MetricsCollector::new("s1");
        let summary = metrics.summary();
        assert_eq!(summary.api_calls, 0);
        assert_eq!(summary.avg_latency_ms, 0.0);
        assert_eq!(summary.total_cost_usd, 0.0);
    }
}
