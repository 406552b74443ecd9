//! Metrics port interface

use std::time::Duration;

/// Sink for API call measurements.
///
/// Recording is fire-and-forget; implementations must never block or fail
/// the calling pipeline.
pub trait MetricsSink: Send + Sync {
    fn record_api_call(&self, backend: &str, latency: Duration, success: bool);
}
