// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for tagcache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `tagcache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: get, set, add_tags, enumerate, invalidate, cleanup, ...
//! - `status`: success, error

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

/// Record a completed cache or tag operation
pub fn record_operation(operation: &str, status: &str) {
    counter!(
        "tagcache_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "tagcache_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record how many references a tag enumeration returned
pub fn record_enumerated_refs(count: usize) {
    histogram!("tagcache_enumerated_refs").record(count as f64);
}

/// Record stale references pruned by a cleanup-enabled enumeration
pub fn record_cleanup_pruned(count: usize) {
    counter!("tagcache_cleanup_pruned_total").increment(count as u64);
}

/// Record items deleted by a tag invalidation
pub fn record_invalidated(count: usize) {
    counter!("tagcache_invalidated_total").increment(count as u64);
}

/// Timer that records latency when dropped
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These verify the API compiles and doesn't panic.
    // In production, you'd use metrics-util's Recorder for assertions.

    #[test]
    fn test_record_operation() {
        record_operation("get", "success");
        record_operation("invalidate", "error");
    }

    #[test]
    fn test_record_latency() {
        record_latency("get", Duration::from_micros(100));
        record_latency("enumerate", Duration::from_millis(5));
    }

    #[test]
    fn test_counters_and_histograms() {
        record_enumerated_refs(12);
        record_cleanup_pruned(3);
        record_invalidated(7);
    }

    #[test]
    fn test_latency_timer_drops_cleanly() {
        let timer = LatencyTimer::new("get");
        drop(timer);
    }
}
