//! Observability infrastructure for the serving path
//!
//! Provides:
//! - Prometheus metrics (prediction counts and latency, errors, retraining events, model version)
//! - A consistent point-in-time snapshot of those metrics
//! - Structured JSON logging with tracing

use crate::error::{FailureReason, RetrainFailure, ValidationError};
use crate::models::{IrisClass, PredictionResult};
use crate::validation::FeatureWarning;
use prometheus::core::Metric;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{info, warn};

const NAMESPACE: &str = "iris";

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

const CONFIDENCE_BUCKETS: &[f64] = &[0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 0.95, 0.99, 1.0];

const BATCH_SIZE_BUCKETS: &[f64] = &[1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0];

/// Error kinds counted by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Inference,
    AuditWrite,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 3] = [
        ErrorKind::Validation,
        ErrorKind::Inference,
        ErrorKind::AuditWrite,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Inference => "inference",
            ErrorKind::AuditWrite => "audit_write",
        }
    }
}

/// Retraining lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrainEvent {
    Started,
    Succeeded,
    Failed,
    /// Trigger refused because a job was already running
    Rejected,
}

impl RetrainEvent {
    pub const ALL: [RetrainEvent; 4] = [
        RetrainEvent::Started,
        RetrainEvent::Succeeded,
        RetrainEvent::Failed,
        RetrainEvent::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RetrainEvent::Started => "started",
            RetrainEvent::Succeeded => "succeeded",
            RetrainEvent::Failed => "failed",
            RetrainEvent::Rejected => "rejected",
        }
    }
}

struct MetricsInner {
    registry: Registry,
    /// Updates hold it shared, snapshots exclusive
    gate: RwLock<()>,
    started: Instant,
    predictions: IntCounterVec,
    errors: IntCounterVec,
    retrain_events: IntCounterVec,
    retrain_failures: IntCounterVec,
    prediction_latency_seconds: Histogram,
    batch_latency_seconds: Histogram,
    prediction_confidence: Histogram,
    batch_size: Histogram,
    model_version: IntGauge,
    uptime_seconds: Gauge,
}

/// Serving metrics for Prometheus exposition
///
/// Each instance owns its registry; clones share the same metrics.
#[derive(Clone)]
pub struct ServingMetrics {
    inner: Arc<MetricsInner>,
}

impl std::fmt::Debug for ServingMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServingMetrics").finish_non_exhaustive()
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, label: &str) -> prometheus::Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help).namespace(NAMESPACE), &[label])?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn histogram(registry: &Registry, name: &str, help: &str, buckets: &[f64]) -> prometheus::Result<Histogram> {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(name, help)
            .namespace(NAMESPACE)
            .buckets(buckets.to_vec()),
    )?;
    registry.register(Box::new(histogram.clone()))?;
    Ok(histogram)
}

impl ServingMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let predictions = counter_vec(
            &registry,
            "predictions_total",
            "Total predictions served, by predicted class",
            "class",
        )?;
        let errors = counter_vec(
            &registry,
            "errors_total",
            "Total errors on the serving path, by kind",
            "kind",
        )?;
        let retrain_events = counter_vec(
            &registry,
            "retrain_events_total",
            "Retraining lifecycle events, by outcome",
            "outcome",
        )?;
        let retrain_failures = counter_vec(
            &registry,
            "retrain_failures_total",
            "Failed retraining jobs, by reason",
            "reason",
        )?;

        let prediction_latency_seconds = histogram(
            &registry,
            "prediction_latency_seconds",
            "Time spent scoring a single prediction",
            LATENCY_BUCKETS,
        )?;
        let batch_latency_seconds = histogram(
            &registry,
            "batch_latency_seconds",
            "Time spent scoring a whole batch",
            LATENCY_BUCKETS,
        )?;
        let prediction_confidence = histogram(
            &registry,
            "prediction_confidence",
            "Confidence of served predictions",
            CONFIDENCE_BUCKETS,
        )?;
        let batch_size = histogram(
            &registry,
            "batch_size",
            "Number of samples per batch request",
            BATCH_SIZE_BUCKETS,
        )?;

        let model_version = IntGauge::with_opts(
            Opts::new("model_version", "Version of the installed model artifact").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(model_version.clone()))?;
        let uptime_seconds = Gauge::with_opts(
            Opts::new("uptime_seconds", "Seconds since the service started").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        // Touch every label so zero-valued series are exported
        for class in IrisClass::ALL {
            predictions.with_label_values(&[class.as_str()]);
        }
        for kind in ErrorKind::ALL {
            errors.with_label_values(&[kind.as_str()]);
        }
        for event in RetrainEvent::ALL {
            retrain_events.with_label_values(&[event.as_str()]);
        }
        for reason in FailureReason::ALL {
            retrain_failures.with_label_values(&[reason.as_str()]);
        }

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                gate: RwLock::new(()),
                started: Instant::now(),
                predictions,
                errors,
                retrain_events,
                retrain_failures,
                prediction_latency_seconds,
                batch_latency_seconds,
                prediction_confidence,
                batch_size,
                model_version,
                uptime_seconds,
            }),
        })
    }

    /// Record one served single prediction
    pub fn record_prediction(&self, class: IrisClass, confidence: f64, duration_ms: f64) {
        let _shared = self.inner.gate.read().unwrap_or_else(PoisonError::into_inner);
        self.inner
            .predictions
            .with_label_values(&[class.as_str()])
            .inc();
        self.inner.prediction_confidence.observe(confidence);
        self.inner
            .prediction_latency_seconds
            .observe(duration_ms / 1000.0);
    }

    /// Record one served batch as a single event
    pub fn record_batch(&self, results: &[PredictionResult], total_ms: f64) {
        let _shared = self.inner.gate.read().unwrap_or_else(PoisonError::into_inner);
        for result in results {
            self.inner
                .predictions
                .with_label_values(&[result.prediction.as_str()])
                .inc();
            self.inner.prediction_confidence.observe(result.confidence);
        }
        self.inner.batch_size.observe(results.len() as f64);
        self.inner.batch_latency_seconds.observe(total_ms / 1000.0);
    }

    pub fn inc_error(&self, kind: ErrorKind) {
        let _shared = self.inner.gate.read().unwrap_or_else(PoisonError::into_inner);
        self.inner.errors.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn inc_retrain(&self, event: RetrainEvent) {
        let _shared = self.inner.gate.read().unwrap_or_else(PoisonError::into_inner);
        self.inner
            .retrain_events
            .with_label_values(&[event.as_str()])
            .inc();
    }

    /// Count a failed job together with its reason
    pub fn record_retrain_failure(&self, reason: FailureReason) {
        let _shared = self.inner.gate.read().unwrap_or_else(PoisonError::into_inner);
        self.inner
            .retrain_events
            .with_label_values(&[RetrainEvent::Failed.as_str()])
            .inc();
        self.inner
            .retrain_failures
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    pub fn set_model_version(&self, version: u64) {
        let _shared = self.inner.gate.read().unwrap_or_else(PoisonError::into_inner);
        self.inner
            .model_version
            .set(i64::try_from(version).unwrap_or(i64::MAX));
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.inner.started.elapsed().as_secs_f64()
    }

    /// Point-in-time view; never observes half of one event
    pub fn snapshot(&self) -> MetricsSnapshot {
        let _exclusive = self.inner.gate.write().unwrap_or_else(PoisonError::into_inner);
        let inner = &self.inner;

        let predictions_by_class: BTreeMap<String, u64> = IrisClass::ALL
            .iter()
            .map(|c| {
                let n = inner.predictions.with_label_values(&[c.as_str()]).get();
                (c.as_str().to_string(), n)
            })
            .collect();
        let errors_by_kind: BTreeMap<String, u64> = ErrorKind::ALL
            .iter()
            .map(|k| {
                let n = inner.errors.with_label_values(&[k.as_str()]).get();
                (k.as_str().to_string(), n)
            })
            .collect();
        let retrain_failures_by_reason: BTreeMap<String, u64> = FailureReason::ALL
            .iter()
            .map(|r| {
                let n = inner.retrain_failures.with_label_values(&[r.as_str()]).get();
                (r.as_str().to_string(), n)
            })
            .collect();
        let retrain = |event: RetrainEvent| inner.retrain_events.with_label_values(&[event.as_str()]).get();

        MetricsSnapshot {
            total_predictions: predictions_by_class.values().sum(),
            predictions_by_class,
            total_errors: errors_by_kind.values().sum(),
            errors_by_kind,
            retrain_attempts: retrain(RetrainEvent::Started),
            retrain_successes: retrain(RetrainEvent::Succeeded),
            retrain_failures: retrain(RetrainEvent::Failed),
            retrain_rejected: retrain(RetrainEvent::Rejected),
            retrain_failures_by_reason,
            prediction_latency: LatencySummary::from_histogram(&inner.prediction_latency_seconds),
            batch_latency: LatencySummary::from_histogram(&inner.batch_latency_seconds),
            model_version: u64::try_from(inner.model_version.get()).unwrap_or(0),
            uptime_seconds: self.uptime_seconds(),
        }
    }

    /// Prometheus text exposition
    pub fn encode(&self) -> prometheus::Result<String> {
        let _exclusive = self.inner.gate.write().unwrap_or_else(PoisonError::into_inner);
        self.inner.uptime_seconds.set(self.uptime_seconds());

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.inner.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Aggregated view of one latency histogram
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub sum_ms: f64,
    pub mean_ms: f64,
    /// (upper bound in ms, cumulative count)
    pub buckets: Vec<(f64, u64)>,
}

impl LatencySummary {
    fn from_histogram(histogram: &Histogram) -> Self {
        let count = histogram.get_sample_count();
        let sum_ms = histogram.get_sample_sum() * 1000.0;
        let metric = histogram.metric();
        let buckets = metric
            .get_histogram()
            .get_bucket()
            .iter()
            .map(|b| (b.get_upper_bound() * 1000.0, b.get_cumulative_count()))
            .collect();
        Self {
            count,
            sum_ms,
            mean_ms: if count > 0 { sum_ms / count as f64 } else { 0.0 },
            buckets,
        }
    }
}

/// Consistent point-in-time view of the serving counters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub total_predictions: u64,
    pub predictions_by_class: BTreeMap<String, u64>,
    pub total_errors: u64,
    pub errors_by_kind: BTreeMap<String, u64>,
    pub retrain_attempts: u64,
    pub retrain_successes: u64,
    pub retrain_failures: u64,
    pub retrain_rejected: u64,
    pub retrain_failures_by_reason: BTreeMap<String, u64>,
    pub prediction_latency: LatencySummary,
    pub batch_latency: LatencySummary,
    pub model_version: u64,
    pub uptime_seconds: f64,
}

/// Structured logger for serving events
///
/// Provides consistent JSON-formatted logging for predictions,
/// retraining and other significant events.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Log a served single prediction
    pub fn log_prediction(&self, result: &PredictionResult, request_id: Option<&str>) {
        info!(
            event = "prediction_served",
            service = %self.service,
            prediction = %result.prediction,
            confidence = result.confidence,
            model_version = result.model_version,
            processing_time_ms = result.processing_time_ms,
            request_id = ?request_id,
            "Prediction served"
        );
    }

    pub fn log_batch(
        &self,
        batch_size: usize,
        model_version: u64,
        total_processing_time_ms: f64,
        request_id: Option<&str>,
    ) {
        info!(
            event = "batch_served",
            service = %self.service,
            batch_size,
            model_version,
            total_processing_time_ms,
            request_id = ?request_id,
            "Batch prediction served"
        );
    }

    pub fn log_rejection(&self, error: &ValidationError, request_id: Option<&str>) {
        warn!(
            event = "prediction_rejected",
            service = %self.service,
            failed_fields = error.details().len(),
            error = %error,
            request_id = ?request_id,
            "Prediction request rejected"
        );
    }

    pub fn log_out_of_range(&self, warning: &FeatureWarning) {
        warn!(
            event = "feature_out_of_range",
            service = %self.service,
            field = warning.field,
            value = warning.value,
            expected_min = warning.expected_min,
            expected_max = warning.expected_max,
            index = ?warning.index,
            "Feature outside training range"
        );
    }

    pub fn log_retrain_started(&self, job_id: u64, current_version: u64) {
        info!(
            event = "retrain_started",
            service = %self.service,
            job_id,
            current_version,
            "Retraining job started"
        );
    }

    /// Log model update
    pub fn log_model_update(
        &self,
        job_id: u64,
        old_version: u64,
        new_version: u64,
        model_type: &str,
        accuracy: Option<f64>,
    ) {
        info!(
            event = "model_updated",
            service = %self.service,
            job_id,
            old_version,
            new_version,
            model_type = %model_type,
            accuracy = ?accuracy,
            "Model artifact replaced"
        );
    }

    pub fn log_model_update_failed(&self, job_id: u64, current_version: u64, failure: &RetrainFailure) {
        warn!(
            event = "model_update_failed",
            service = %self.service,
            job_id,
            current_version,
            reason = %failure.reason,
            error = %failure.message,
            "Retraining failed, previous model kept"
        );
    }

    pub fn log_audit_dropped(&self, records: usize, reason: &str) {
        warn!(
            event = "audit_dropped",
            service = %self.service,
            records,
            reason = %reason,
            "Audit records dropped"
        );
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, model_version: u64, model_type: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            service_version = %version,
            model_version,
            model_type = %model_type,
            "Prediction service started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Prediction service shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = ServingMetrics::new().unwrap();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_predictions, 0);
        assert_eq!(snapshot.predictions_by_class.len(), 3);
        assert_eq!(snapshot.errors_by_kind["audit_write"], 0);
    }

    #[test]
    fn test_instances_are_isolated() {
        let a = ServingMetrics::new().unwrap();
        let b = ServingMetrics::new().unwrap();
        a.record_prediction(IrisClass::Setosa, 0.9, 1.0);
        assert_eq!(a.snapshot().total_predictions, 1);
        assert_eq!(b.snapshot().total_predictions, 0);
    }

    #[test]
    fn test_retrain_counters() {
        let metrics = ServingMetrics::new().unwrap();
        metrics.inc_retrain(RetrainEvent::Started);
        metrics.inc_retrain(RetrainEvent::Rejected);
        metrics.record_retrain_failure(FailureReason::Timeout);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.retrain_attempts, 1);
        assert_eq!(snapshot.retrain_rejected, 1);
        assert_eq!(snapshot.retrain_failures, 1);
        assert_eq!(snapshot.retrain_failures_by_reason["timeout"], 1);
        assert_eq!(snapshot.retrain_successes, 0);
    }

    #[test]
    fn test_encode_exposes_namespaced_series() {
        let metrics = ServingMetrics::new().unwrap();
        metrics.record_prediction(IrisClass::Virginica, 0.8, 2.0);
        metrics.set_model_version(3);

        let text = metrics.encode().unwrap();
        assert!(text.contains("iris_predictions_total{class=\"virginica\"} 1"));
        assert!(text.contains("iris_model_version 3"));
        assert!(text.contains("iris_prediction_latency_seconds_bucket"));
        assert!(text.contains("iris_uptime_seconds"));
    }

    #[test]
    fn test_snapshot_is_consistent_under_concurrency() {
        let metrics = ServingMetrics::new().unwrap();
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let metrics = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        metrics.record_prediction(IrisClass::Versicolor, 0.7, 0.5);
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            let snapshot = metrics.snapshot();
            assert_eq!(snapshot.total_predictions, snapshot.prediction_latency.count);
        }
        for writer in writers {
            writer.join().unwrap();
        }
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_predictions, 2000);
        assert!((snapshot.prediction_latency.mean_ms - 0.5).abs() < 1e-9);
    }
}
