//! Prometheus metrics for proxied requests

use anyhow::Result;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// Request outcome counters and latency, shared across clones
#[derive(Clone)]
pub struct DirectorMetrics {
    /// Requests by outcome: `forwarded`, `transport_error`, or a rejection kind
    pub requests_total: CounterVec,
    /// Destination responses by status code
    pub upstream_responses_total: CounterVec,
    pub request_duration_seconds: HistogramVec,
    pub registry: Arc<Registry>,
}

impl DirectorMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_total = CounterVec::new(
            Opts::new("metaproxy_requests_total", "Proxy requests by outcome"),
            &["outcome"],
        )?;

        let upstream_responses_total = CounterVec::new(
            Opts::new(
                "metaproxy_upstream_responses_total",
                "Destination responses by status",
            ),
            &["status"],
        )?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "metaproxy_request_duration_seconds",
                "Time spent forwarding to the destination in seconds",
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(upstream_responses_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        Ok(Self {
            requests_total,
            upstream_responses_total,
            request_duration_seconds,
            registry,
        })
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// A request the director refused before any network activity
    pub fn record_rejection(&self, kind: &str) {
        self.requests_total.with_label_values(&[kind]).inc();
    }

    pub fn record_forwarded(&self, status: u16, duration: Duration) {
        self.requests_total.with_label_values(&["forwarded"]).inc();
        self.upstream_responses_total
            .with_label_values(&[&status.to_string()])
            .inc();
        self.request_duration_seconds
            .with_label_values(&["forwarded"])
            .observe(duration.as_secs_f64());
    }

    pub fn record_transport_error(&self, duration: Duration) {
        self.requests_total.with_label_values(&["transport_error"]).inc();
        self.request_duration_seconds
            .with_label_values(&["transport_error"])
            .observe(duration.as_secs_f64());
    }
}
