//! Observability for the price estimator
//!
//! Provides:
//! - Prometheus metrics (estimate latency, feedback outcomes, storage retries, model version)
//! - Event-named structured logging with tracing

use prometheus::{GaugeVec, Histogram, HistogramOpts, IntCounter, Opts};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for estimate latency (seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5,
];

/// Registered once per process; `None` if registration failed
static GLOBAL_METRICS: OnceLock<Option<EstimatorMetricsInner>> = OnceLock::new();

struct EstimatorMetricsInner {
    estimate_latency_seconds: Histogram,
    estimates_served: IntCounter,
    estimate_errors: IntCounter,
    feedback_appended: IntCounter,
    feedback_discarded: IntCounter,
    feedback_staged: IntCounter,
    storage_retries: IntCounter,
    model_version_info: GaugeVec,
}

fn counter(name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let c = IntCounter::new(name, help)?;
    prometheus::register(Box::new(c.clone()))?;
    Ok(c)
}

impl EstimatorMetricsInner {
    fn new() -> prometheus::Result<Self> {
        let estimate_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "price_estimator_estimate_latency_seconds",
                "Time spent computing a price estimate",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        prometheus::register(Box::new(estimate_latency_seconds.clone()))?;

        let model_version_info = GaugeVec::new(
            Opts::new(
                "price_estimator_model_version_info",
                "Registry version of the loaded model",
            ),
            &["model_name", "version"],
        )?;
        prometheus::register(Box::new(model_version_info.clone()))?;

        Ok(Self {
            estimate_latency_seconds,
            estimates_served: counter(
                "price_estimator_estimates_served_total",
                "Total number of estimates served",
            )?,
            estimate_errors: counter(
                "price_estimator_estimate_errors_total",
                "Total number of rejected estimate requests",
            )?,
            feedback_appended: counter(
                "price_estimator_feedback_appended_total",
                "Feedback records appended to the shared dataset",
            )?,
            feedback_discarded: counter(
                "price_estimator_feedback_discarded_total",
                "Feedback submissions discarded for a non-positive price",
            )?,
            feedback_staged: counter(
                "price_estimator_feedback_staged_total",
                "Feedback records staged locally after a storage failure",
            )?,
            storage_retries: counter(
                "price_estimator_storage_retries_total",
                "Retried registry and object store calls",
            )?,
            model_version_info,
        })
    }
}

/// Handle to the process-wide metrics; clones share the same metrics
#[derive(Clone)]
pub struct EstimatorMetrics {
    _private: (),
}

impl Default for EstimatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EstimatorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(|| match EstimatorMetricsInner::new() {
            Ok(inner) => Some(inner),
            Err(e) => {
                warn!(error = %e, "Failed to register metrics, continuing without them");
                None
            }
        });
        Self { _private: () }
    }

    fn inner(&self) -> Option<&EstimatorMetricsInner> {
        GLOBAL_METRICS.get().and_then(Option::as_ref)
    }

    pub fn observe_estimate_latency(&self, duration_secs: f64) {
        if let Some(m) = self.inner() {
            m.estimate_latency_seconds.observe(duration_secs);
            m.estimates_served.inc();
        }
    }

    pub fn inc_estimate_errors(&self) {
        if let Some(m) = self.inner() {
            m.estimate_errors.inc();
        }
    }

    pub fn inc_feedback_appended(&self) {
        if let Some(m) = self.inner() {
            m.feedback_appended.inc();
        }
    }

    pub fn inc_feedback_discarded(&self) {
        if let Some(m) = self.inner() {
            m.feedback_discarded.inc();
        }
    }

    pub fn inc_feedback_staged(&self) {
        if let Some(m) = self.inner() {
            m.feedback_staged.inc();
        }
    }

    pub fn inc_storage_retries(&self) {
        if let Some(m) = self.inner() {
            m.storage_retries.inc();
        }
    }

    /// Replace the model version label set
    pub fn set_model_version(&self, model_name: &str, version: &str) {
        if let Some(m) = self.inner() {
            m.model_version_info.reset();
            m.model_version_info
                .with_label_values(&[model_name, version])
                .set(1.0);
        }
    }
}

/// Render the default registry in the Prometheus text format
pub fn render_metrics() -> String {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Structured logger for estimator events
///
/// Every record carries an `event` field so log pipelines can filter on it.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_estimate(&self, price: i64, model_version: &str, elapsed_us: u128) {
        info!(
            event = "estimate_served",
            service = %self.service,
            price = price,
            model_version = %model_version,
            elapsed_us = elapsed_us as u64,
            "Served price estimate"
        );
    }

    pub fn log_feedback_appended(&self, price: i64, estimated: Option<i64>) {
        info!(
            event = "feedback_appended",
            service = %self.service,
            price = price,
            estimated = ?estimated,
            "Feedback appended to shared dataset"
        );
    }

    pub fn log_feedback_discarded(&self, price: i64) {
        info!(
            event = "feedback_discarded",
            service = %self.service,
            price = price,
            "Feedback with non-positive price discarded"
        );
    }

    pub fn log_feedback_staged(&self, price: i64, reason: &str, pending: usize) {
        warn!(
            event = "feedback_staged",
            service = %self.service,
            price = price,
            reason = %reason,
            pending = pending,
            "Feedback store unavailable, staged correction locally"
        );
    }

    pub fn log_model_loaded(&self, source: &str, version: &str, training_rows: usize) {
        info!(
            event = "model_loaded",
            service = %self.service,
            source = %source,
            version = %version,
            training_rows = training_rows,
            "Model loaded"
        );
    }

    pub fn log_model_published(&self, model_name: &str, version: &str) {
        info!(
            event = "model_published",
            service = %self.service,
            model_name = %model_name,
            version = %version,
            "Model published to registry"
        );
    }

    pub fn log_training_completed(
        &self,
        training_rows: usize,
        feedback_rows: usize,
        r_squared: Option<f64>,
    ) {
        info!(
            event = "training_completed",
            service = %self.service,
            training_rows = training_rows,
            feedback_rows = feedback_rows,
            r_squared = ?r_squared,
            "Training run completed"
        );
    }

    pub fn log_startup(&self, version: &str, model_version: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            service_version = %version,
            model_version = %model_version,
            "Price estimator started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Price estimator shutting down"
        );
    }
}
