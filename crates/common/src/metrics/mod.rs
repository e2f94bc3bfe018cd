//! Metrics and observability utilities
//!
//! Prometheus metrics with a common `foodgram_` prefix. Recording is a
//! no-op until an exporter is installed, so library code and tests can
//! call these freely.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::{Duration, Instant};

/// Metrics prefix for all Foodgram metrics
pub const METRICS_PREFIX: &str = "foodgram";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00,
];

/// Buckets for shopping list rendering, which touches disk
pub const RENDER_BUCKETS: &[f64] = &[0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000];

/// Register all metric descriptions
pub fn register_metrics() {
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

    describe_counter!(
        format!("{}_shopping_list_exports_total", METRICS_PREFIX),
        Unit::Count,
        "Shopping list exports by outcome"
    );

    describe_histogram!(
        format!("{}_shopping_list_render_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Time to aggregate and render a shopping list"
    );

    describe_gauge!(
        format!("{}_shopping_list_lines", METRICS_PREFIX),
        Unit::Count,
        "Lines in the most recent shopping list"
    );

    describe_counter!(
        format!("{}_recipes_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total recipes created"
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

/// Record one shopping list export
pub fn record_shopping_list_export(duration: Duration, lines: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_shopping_list_exports_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);

    histogram!(format!("{}_shopping_list_render_duration_seconds", METRICS_PREFIX))
        .record(duration.as_secs_f64());

    if success {
        gauge!(format!("{}_shopping_list_lines", METRICS_PREFIX)).set(lines as f64);
    }
}

pub fn record_recipe_created() {
    counter!(format!("{}_recipes_created_total", METRICS_PREFIX)).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, RENDER_BUCKETS] {
            assert!(buckets.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_recording_without_exporter() {
        let metrics = RequestMetrics::start("GET", "/api/recipes");
        metrics.finish(200);
        record_shopping_list_export(Duration::from_millis(12), 3, true);
        record_shopping_list_export(Duration::from_millis(1), 0, false);
        record_recipe_created();
    }
}
