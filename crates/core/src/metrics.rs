//! Metrics definitions for the indexer.
//!
//! This module defines all metrics used throughout the indexer.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!("events_applied_total", "Total number of events that mutated state");
    describe_counter!(
        "events_discarded_total",
        "Total number of events discarded by validation, by reason"
    );
    describe_counter!(
        "duplicate_deliveries_total",
        "Total number of redelivered events absorbed by dedup"
    );
    describe_counter!("rollbacks_total", "Total number of feed rollbacks handled");
    describe_counter!(
        "events_rolled_back_total",
        "Total number of retained events removed by rollbacks"
    );
    describe_counter!(
        "invariant_violations_total",
        "Total number of fatal accounting invariant violations"
    );
    describe_counter!(
        "feed_decode_errors_total",
        "Total number of feed records that could not be decoded"
    );
    describe_histogram!(
        "event_apply_duration_seconds",
        "Time taken to apply a single event in seconds"
    );
    describe_gauge!("indexer_halted", "1 while indexing is halted, 0 otherwise");
}

/// Record an applied event.
///
/// # Arguments
/// * `name` - Event variant name
pub fn record_event_applied(name: &str) {
    counter!("events_applied_total", "event" => name.to_string()).increment(1);
}

/// Record a discarded event.
///
/// # Arguments
/// * `reason` - Stable discard reason code
pub fn record_event_discarded(reason: &str) {
    counter!("events_discarded_total", "reason" => reason.to_string()).increment(1);
}

/// Record an absorbed duplicate delivery.
pub fn record_duplicate_delivery() {
    counter!("duplicate_deliveries_total").increment(1);
}

/// Record a rollback and the number of retained events it removed.
pub fn record_rollback(events_removed: u64) {
    counter!("rollbacks_total").increment(1);
    counter!("events_rolled_back_total").increment(events_removed);
}

/// Record a fatal invariant violation.
pub fn record_invariant_violation() {
    counter!("invariant_violations_total").increment(1);
}

/// Record a feed record that failed to decode.
///
/// # Arguments
/// * `source` - Feed identifier
pub fn record_feed_decode_error(source: &str) {
    counter!("feed_decode_errors_total", "source" => source.to_string()).increment(1);
}

/// Record whether indexing is halted.
pub fn set_halted(halted: bool) {
    gauge!("indexer_halted").set(if halted { 1.0 } else { 0.0 });
}

/// Record event apply duration.
pub fn record_event_apply_duration(duration_secs: f64) {
    histogram!("event_apply_duration_seconds").record(duration_secs);
}

/// A timer that automatically records duration when dropped.
pub struct ProcessingTimer {
    start: Instant,
}

impl ProcessingTimer {
    /// Start a new processing timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for ProcessingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessingTimer {
    fn drop(&mut self) {
        record_event_apply_duration(self.start.elapsed().as_secs_f64());
    }
}
