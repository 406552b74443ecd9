//! Metrics sink adapter over structured logging

use std::time::Duration;

use tracing::info;

use crate::application::ports::MetricsSink;

/// Emits API call measurements as structured log events
#[derive(Default)]
pub struct TracingMetrics;

impl TracingMetrics {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsSink for TracingMetrics {
    fn record_api_call(&self, backend: &str, latency: Duration, success: bool) {
        info!(
            target: "voxbot::metrics",
            backend,
            latency_ms = latency.as_millis() as u64,
            success,
            "api call"
        );
    }
}
