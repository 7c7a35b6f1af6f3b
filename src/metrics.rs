//! Prometheus metrics for latency tracking and monitoring.
//!
//! This module provides metrics for:
//! - Price fetch and opportunity detection latency
//! - Opportunity counts per kind
//! - Operation lifecycle transitions and in-flight gauge
//! - Leg execution latency and outcomes

use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use tracing::debug;

use crate::arbitrage::OpportunityKind;
use crate::trading::OperationStatus;

// === Metric Name Constants ===

/// Price fetch (all venues, one asset) latency metric name.
pub const METRIC_PRICE_FETCH_LATENCY: &str = "price_fetch_latency_ms";
/// Opportunity detection latency metric name.
pub const METRIC_OPPORTUNITY_DETECTION_LATENCY: &str = "opportunity_detection_latency_ms";
/// Single leg execution latency metric name.
pub const METRIC_LEG_EXECUTION_LATENCY: &str = "leg_execution_latency_ms";
/// Opportunities detected counter metric name.
pub const METRIC_OPPORTUNITIES_DETECTED: &str = "opportunities_detected_total";
/// Operation status transitions counter metric name.
pub const METRIC_OPERATION_TRANSITIONS: &str = "operation_transitions_total";
/// Operations currently holding a concurrency slot.
pub const METRIC_OPERATIONS_IN_FLIGHT: &str = "operations_in_flight";
/// Opportunities dropped because the concurrency budget was full.
pub const METRIC_CONCURRENCY_EXHAUSTED: &str = "concurrency_exhausted_total";
/// Venues that returned no quote in a cycle.
pub const METRIC_VENUE_UNAVAILABLE: &str = "venue_unavailable_total";
/// Gas oracle failures answered with a fallback price.
pub const METRIC_GAS_FALLBACK: &str = "gas_price_fallback_total";
/// Failed legs counter metric name.
pub const METRIC_LEGS_FAILED: &str = "legs_failed_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    // Latency histograms
    describe_histogram!(
        METRIC_PRICE_FETCH_LATENCY,
        "Time to collect one price snapshot in milliseconds"
    );
    describe_histogram!(
        METRIC_OPPORTUNITY_DETECTION_LATENCY,
        "Time to run all detectors on a snapshot in milliseconds"
    );
    describe_histogram!(
        METRIC_LEG_EXECUTION_LATENCY,
        "Single leg execution latency in milliseconds"
    );

    // Counters
    describe_counter!(
        METRIC_OPPORTUNITIES_DETECTED,
        "Total number of arbitrage opportunities detected"
    );
    describe_counter!(
        METRIC_OPERATION_TRANSITIONS,
        "Operation status transitions by target status"
    );
    describe_counter!(
        METRIC_CONCURRENCY_EXHAUSTED,
        "Opportunities discarded because no execution slot was free"
    );
    describe_counter!(
        METRIC_VENUE_UNAVAILABLE,
        "Venues that produced no quote during a poll"
    );
    describe_counter!(
        METRIC_GAS_FALLBACK,
        "Gas oracle failures answered with a fallback price"
    );
    describe_counter!(METRIC_LEGS_FAILED, "Total number of legs that failed");

    // Gauges
    describe_gauge!(
        METRIC_OPERATIONS_IN_FLIGHT,
        "Operations currently holding an execution slot"
    );

    debug!("Metrics initialized");
}

/// Record price snapshot latency.
pub fn record_price_fetch_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_PRICE_FETCH_LATENCY).record(latency_ms);
}

/// Record leg execution latency.
pub fn record_leg_latency(start: Instant, venue: &str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_LEG_EXECUTION_LATENCY, "venue" => venue.to_string()).record(latency_ms);
}

/// Increment opportunities detected counter.
pub fn inc_opportunities_detected(kind: OpportunityKind) {
    counter!(METRIC_OPPORTUNITIES_DETECTED, "kind" => kind.to_string()).increment(1);
}

/// Count a transition into `to`.
pub fn inc_operation_transition(to: OperationStatus) {
    counter!(METRIC_OPERATION_TRANSITIONS, "to" => to.to_string()).increment(1);
}

/// Set the in-flight operations gauge.
pub fn set_operations_in_flight(count: usize) {
    gauge!(METRIC_OPERATIONS_IN_FLIGHT).set(count as f64);
}

/// Increment concurrency exhausted counter.
pub fn inc_concurrency_exhausted() {
    counter!(METRIC_CONCURRENCY_EXHAUSTED).increment(1);
}

/// Increment venue unavailable counter.
pub fn inc_venue_unavailable(venue: &str) {
    counter!(METRIC_VENUE_UNAVAILABLE, "venue" => venue.to_string()).increment(1);
}

/// Increment gas fallback counter.
pub fn inc_gas_fallback() {
    counter!(METRIC_GAS_FALLBACK).increment(1);
}

/// Increment failed legs counter.
pub fn inc_legs_failed(venue: &str) {
    counter!(METRIC_LEGS_FAILED, "venue" => venue.to_string()).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(self.elapsed_ms());
    }
}

/// Create a latency timer for opportunity detection.
pub fn timer_opportunity_detection() -> LatencyTimer {
    LatencyTimer::new(METRIC_OPPORTUNITY_DETECTION_LATENCY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn latency_timer_measures_time() {
        let timer = LatencyTimer::new("test_metric");
        sleep(Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 9.0);
    }
}
