pub mod server;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),
    #[error("metrics output is not utf8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type SharedMetrics = Arc<Metrics>;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    // Header sync
    header_store_height: IntGauge,
    syncer_started: IntGauge,
    headers_appended: IntCounterVec,
    headers_rejected: IntCounterVec,
    header_broadcast_failures: IntCounter,
    // Data availability
    da_requests: IntCounterVec,
    da_request_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let header_store_height = IntGauge::with_opts(Opts::new(
            "header_store_height",
            "Height of the highest header in the local header store",
        ))?;
        registry.register(Box::new(header_store_height.clone()))?;

        let syncer_started = IntGauge::with_opts(Opts::new(
            "header_syncer_started",
            "1 once the header syncer has been started",
        ))?;
        registry.register(Box::new(syncer_started.clone()))?;

        let headers_appended = IntCounterVec::new(
            Opts::new("headers_appended_total", "Headers appended to the header store"),
            &["source"],
        )?;
        registry.register(Box::new(headers_appended.clone()))?;

        let headers_rejected = IntCounterVec::new(
            Opts::new("headers_rejected_total", "Headers that failed verification"),
            &["reason"],
        )?;
        registry.register(Box::new(headers_rejected.clone()))?;

        let header_broadcast_failures = IntCounter::with_opts(Opts::new(
            "header_broadcast_failures_total",
            "Headers that could not be broadcast to gossip",
        ))?;
        registry.register(Box::new(header_broadcast_failures.clone()))?;

        let da_requests = IntCounterVec::new(
            Opts::new("da_requests_total", "Requests made to the data availability layer"),
            &["operation", "status"],
        )?;
        registry.register(Box::new(da_requests.clone()))?;

        let da_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "da_request_duration_seconds",
                "Time taken by data availability layer requests",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0]),
            &["operation"],
        )?;
        registry.register(Box::new(da_request_duration.clone()))?;

        Ok(Self {
            registry,
            header_store_height,
            syncer_started,
            headers_appended,
            headers_rejected,
            header_broadcast_failures,
            da_requests,
            da_request_duration,
        })
    }

    pub fn gather(&self) -> Result<String, MetricsError> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    // Header sync
    pub fn set_header_store_height(&self, height: u64) {
        self.header_store_height.set(i64::try_from(height).unwrap_or(i64::MAX));
    }

    pub fn set_syncer_started(&self) {
        self.syncer_started.set(1);
    }

    pub fn inc_headers_appended(&self, source: &str, count: usize) {
        self.headers_appended
            .with_label_values(&[source])
            .inc_by(count as u64);
    }

    pub fn inc_headers_rejected(&self, reason: &str) {
        self.headers_rejected.with_label_values(&[reason]).inc();
    }

    pub fn inc_header_broadcast_failures(&self) {
        self.header_broadcast_failures.inc();
    }

    // Data availability
    pub fn observe_da_request(&self, operation: &str, status: &str, elapsed: Duration) {
        self.da_requests
            .with_label_values(&[operation, status])
            .inc();
        self.da_request_duration
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }
}
