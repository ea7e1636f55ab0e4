//! Metrics and observability utilities
//!
//! Prometheus metrics for the chart API with standardized naming
//! conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all DentForge metrics
pub const METRICS_PREFIX: &str = "dentforge";

/// Histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 250ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, // 1ms
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms - P50 target
    0.100, // 100ms
    0.250, // 250ms - P99 target
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
];

/// Buckets for chart reconciliation, which is in-memory and fast
pub const RECONCILE_BUCKETS: &[f64] = &[
    0.0001, // 100us
    0.0005, // 500us
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.050,  // 50ms
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Chart metrics
    describe_counter!(
        format!("{}_chart_reconciliations_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of ledger to chart reconciliations"
    );

    describe_histogram!(
        format!("{}_chart_reconcile_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Chart reconciliation latency in seconds"
    );

    describe_gauge!(
        format!("{}_chart_teeth_count", METRICS_PREFIX),
        Unit::Count,
        "Number of teeth on the last reconciled chart"
    );

    // Ledger metrics
    describe_counter!(
        format!("{}_procedure_mutations_total", METRICS_PREFIX),
        Unit::Count,
        "Total procedure ledger mutations"
    );

    // Schedule metrics
    describe_counter!(
        format!("{}_schedule_overrides_total", METRICS_PREFIX),
        Unit::Count,
        "Total schedule override rows written by weekday expansion"
    );

    // Database metrics
    describe_histogram!(
        format!("{}_db_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Database query latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record a chart reconciliation
pub fn record_reconciliation(duration_secs: f64, teeth: usize) {
    counter!(format!("{}_chart_reconciliations_total", METRICS_PREFIX)).increment(1);

    histogram!(format!("{}_chart_reconcile_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    gauge!(format!("{}_chart_teeth_count", METRICS_PREFIX)).set(teeth as f64);
}

/// Helper to record a ledger mutation
pub fn record_procedure_mutation(action: &str, code: &str) {
    counter!(
        format!("{}_procedure_mutations_total", METRICS_PREFIX),
        "action" => action.to_string(),
        "code" => code.to_string()
    )
    .increment(1);
}

/// Helper to record weekday override expansion
pub fn record_schedule_overrides(count: usize) {
    counter!(format!("{}_schedule_overrides_total", METRICS_PREFIX)).increment(count as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        for buckets in [LATENCY_BUCKETS, RECONCILE_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }

        assert!(LATENCY_BUCKETS.contains(&0.050));
        assert!(LATENCY_BUCKETS.contains(&0.250));
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("GET", "/v1/patients");
        std::thread::sleep(std::time::Duration::from_millis(5));
        metrics.finish(200);
        // No recorder installed; verify it runs without panic
    }

    #[test]
    fn test_domain_helpers() {
        record_reconciliation(0.0002, 32);
        record_procedure_mutation("create", "V93");
        record_schedule_overrides(5);
    }
}
