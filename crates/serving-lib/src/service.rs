//! Prediction request pipeline
//!
//! Validator, engine, then the side effects: metrics, audit trail and
//! structured events. Rejected input never reaches the engine and never
//! produces an audit record.

use crate::audit::{AuditLogger, AuditRecord};
use crate::engine::PredictionEngine;
use crate::error::{ServingError, ValidationError};
use crate::models::{BatchPrediction, PredictionResult};
use crate::observability::{ErrorKind, ServingMetrics, StructuredLogger};
use crate::validation::{FeatureValidator, FeatureWarning, RawFeatures};
use serde::Serialize;
use std::sync::Arc;

/// A single prediction plus any out-of-range warnings on its input
#[derive(Debug, Clone, Serialize)]
pub struct ServedPrediction {
    #[serde(flatten)]
    pub result: PredictionResult,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<FeatureWarning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServedBatch {
    #[serde(flatten)]
    pub batch: BatchPrediction,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<FeatureWarning>,
}

/// Entry point for the request router
#[derive(Debug)]
pub struct PredictionService {
    validator: FeatureValidator,
    engine: Arc<PredictionEngine>,
    audit: Arc<AuditLogger>,
    metrics: ServingMetrics,
    logger: StructuredLogger,
}

impl PredictionService {
    pub fn new(
        validator: FeatureValidator,
        engine: Arc<PredictionEngine>,
        audit: Arc<AuditLogger>,
        metrics: ServingMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            validator,
            engine,
            audit,
            metrics,
            logger,
        }
    }

    pub fn engine(&self) -> &Arc<PredictionEngine> {
        &self.engine
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    pub fn max_batch_size(&self) -> usize {
        self.validator.max_batch_size()
    }

    pub async fn predict(
        &self,
        raw: &RawFeatures,
        request_id: Option<&str>,
    ) -> Result<ServedPrediction, ServingError> {
        let validated = self
            .validator
            .validate(raw)
            .map_err(|e| self.rejected(e, request_id))?;
        self.log_warnings(&validated.warnings);

        let result = self.engine.predict(&validated.vector).map_err(|e| {
            self.metrics.inc_error(ErrorKind::Inference);
            ServingError::from(e)
        })?;

        self.metrics.record_prediction(
            result.prediction,
            result.confidence,
            result.processing_time_ms,
        );
        self.logger.log_prediction(&result, request_id);
        self.audit
            .record(AuditRecord::from_prediction(
                validated.vector,
                &result,
                1,
                request_id,
            ))
            .await;

        Ok(ServedPrediction {
            result,
            warnings: validated.warnings,
        })
    }

    /// All-or-nothing: one invalid sample rejects the batch before any scoring
    pub async fn predict_batch(
        &self,
        raw: &[RawFeatures],
        request_id: Option<&str>,
    ) -> Result<ServedBatch, ServingError> {
        let validated = self
            .validator
            .validate_batch(raw)
            .map_err(|e| self.rejected(e, request_id))?;
        self.log_warnings(&validated.warnings);

        let batch = self
            .engine
            .predict_batch(&validated.vectors)
            .map_err(|e| {
                self.metrics.inc_error(ErrorKind::Inference);
                ServingError::from(e)
            })?;

        self.metrics
            .record_batch(&batch.predictions, batch.total_processing_time_ms);
        self.logger.log_batch(
            batch.predictions.len(),
            batch.model_version,
            batch.total_processing_time_ms,
            request_id,
        );
        let size = batch.predictions.len();
        let records = validated
            .vectors
            .iter()
            .zip(&batch.predictions)
            .map(|(features, result)| {
                AuditRecord::from_prediction(*features, result, size, request_id)
            })
            .collect();
        self.audit.record_all(records).await;

        Ok(ServedBatch {
            batch,
            warnings: validated.warnings,
        })
    }

    /// Count and log a request body that could not be decoded at all
    pub fn reject_malformed(&self, message: impl Into<String>, request_id: Option<&str>) -> ValidationError {
        self.rejected(ValidationError::MalformedBody(message.into()), request_id)
    }

    fn rejected(&self, error: ValidationError, request_id: Option<&str>) -> ValidationError {
        self.metrics.inc_error(ErrorKind::Validation);
        self.logger.log_rejection(&error, request_id);
        error
    }

    fn log_warnings(&self, warnings: &[FeatureWarning]) {
        for warning in warnings {
            self.logger.log_out_of_range(warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactStore, ModelArtifact};
    use crate::audit::{AuditConfig, AuditStore, MemoryAuditStore};
    use crate::models::IrisClass;
    use crate::retrain::{RetrainConfig, RetrainingCoordinator};
    use crate::training::IrisTrainer;
    use serde_json::json;

    struct Harness {
        service: PredictionService,
        store: Arc<ArtifactStore>,
        audit_store: Arc<MemoryAuditStore>,
        metrics: ServingMetrics,
    }

    fn harness() -> Harness {
        let trained = IrisTrainer::new().fit_best().unwrap();
        let store = Arc::new(ArtifactStore::new(ModelArtifact::from_candidate(trained, 1)).unwrap());
        let metrics = ServingMetrics::new().unwrap();
        let logger = StructuredLogger::new("test");
        let audit_store = Arc::new(MemoryAuditStore::new());
        let audit = AuditLogger::spawn(
            audit_store.clone(),
            AuditConfig::default(),
            metrics.clone(),
            logger.clone(),
        );
        let service = PredictionService::new(
            FeatureValidator::default(),
            Arc::new(PredictionEngine::new(Arc::clone(&store))),
            Arc::new(audit),
            metrics.clone(),
            logger,
        );
        Harness {
            service,
            store,
            audit_store,
            metrics,
        }
    }

    fn raw(values: serde_json::Value) -> RawFeatures {
        serde_json::from_value(values).unwrap()
    }

    fn setosa() -> RawFeatures {
        raw(json!({"sepal_length": 5.1, "sepal_width": 3.5, "petal_length": 1.4, "petal_width": 0.2}))
    }

    #[tokio::test]
    async fn test_canonical_setosa_prediction() {
        let h = harness();
        let served = h.service.predict(&setosa(), Some("req-1")).await.unwrap();
        assert_eq!(served.result.prediction, IrisClass::Setosa);
        assert!(served.result.confidence > 0.9);
        assert!(served.warnings.is_empty());

        h.service.audit().flush().await.unwrap();
        let rows = h.audit_store.query(&Default::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].request_id.as_deref(), Some("req-1"));
        assert_eq!(rows[0].model_version, 1);
        assert_eq!(h.metrics.snapshot().predictions_by_class["setosa"], 1);
    }

    #[tokio::test]
    async fn test_negative_value_is_rejected_without_audit() {
        let h = harness();
        let input = raw(json!({"sepal_length": -1.0, "sepal_width": 3.5, "petal_length": 1.4, "petal_width": 0.2}));
        let err = h.service.predict(&input, None).await.unwrap_err();
        assert!(matches!(err, ServingError::Validation(_)));

        h.service.audit().flush().await.unwrap();
        assert_eq!(h.audit_store.count().await.unwrap(), 0);
        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.errors_by_kind["validation"], 1);
        assert_eq!(snapshot.total_predictions, 0);
    }

    #[tokio::test]
    async fn test_batch_writes_one_record_per_sample() {
        let h = harness();
        let samples = vec![
            setosa(),
            raw(json!({"sepal_length": 6.7, "sepal_width": 3.0, "petal_length": 5.2, "petal_width": 2.3})),
            raw(json!({"sepal_length": 5.9, "sepal_width": 2.8, "petal_length": 4.3, "petal_width": 1.3})),
        ];
        let served = h.service.predict_batch(&samples, None).await.unwrap();
        let classes: Vec<IrisClass> = served
            .batch
            .predictions
            .iter()
            .map(|p| p.prediction)
            .collect();
        assert_eq!(
            classes,
            vec![IrisClass::Setosa, IrisClass::Virginica, IrisClass::Versicolor]
        );

        h.service.audit().flush().await.unwrap();
        let rows = h.audit_store.query(&Default::default()).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.batch_size == 3));
        assert_eq!(h.metrics.snapshot().total_predictions, 3);
    }

    #[tokio::test]
    async fn test_batch_with_one_bad_sample_scores_nothing() {
        let h = harness();
        let samples = vec![setosa(), raw(json!({"sepal_length": "wide"}))];
        let err = h.service.predict_batch(&samples, None).await.unwrap_err();
        match err {
            ServingError::Validation(e) => assert!(e.details().iter().all(|d| d.index == Some(1))),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(h.service.engine().stats().total_inferences, 0);
    }

    #[tokio::test]
    async fn test_out_of_range_value_is_served_with_warning() {
        let h = harness();
        let input = raw(json!({"sepal_length": 5.1, "sepal_width": 3.5, "petal_length": 1.4, "petal_width": 9.0}));
        let served = h.service.predict(&input, None).await.unwrap();
        assert_eq!(served.warnings.len(), 1);
        assert_eq!(served.warnings[0].field, "petal_width");

        let body = serde_json::to_value(&served).unwrap();
        assert!(body["prediction"].is_string());
        assert_eq!(body["warnings"][0]["field"], "petal_width");
    }

    #[tokio::test]
    async fn test_predictions_keep_flowing_during_retrain() {
        let h = harness();
        let coordinator = Arc::new(RetrainingCoordinator::new(
            Arc::clone(&h.store),
            Arc::new(IrisTrainer::new()),
            RetrainConfig::default(),
            h.metrics.clone(),
            StructuredLogger::new("test"),
        ));
        let ticket = coordinator.trigger().unwrap();

        let mut versions = Vec::new();
        for _ in 0..20 {
            let served = h.service.predict(&setosa(), None).await.unwrap();
            versions.push(served.result.model_version);
        }
        coordinator.wait_for_job(ticket.job_id).await.unwrap();
        let after = h.service.predict(&setosa(), None).await.unwrap();

        assert!(versions.iter().all(|v| *v == 1 || *v == 2));
        assert_eq!(after.result.model_version, 2);
        assert_eq!(after.result.prediction, IrisClass::Setosa);
    }
}
