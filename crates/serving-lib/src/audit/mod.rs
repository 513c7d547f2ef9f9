//! Prediction audit trail
//!
//! Every served prediction is mirrored into an append-only log. Writes go
//! through a bounded queue drained by a dedicated writer task so the request
//! path never waits on the database for more than a small bounded time.

mod logger;
mod memory;
mod sqlite;

pub use logger::{AuditConfig, AuditLogger, DeliveryStats};
pub use memory::{MemoryAuditStore, DEFAULT_MEMORY_CAPACITY};
pub use sqlite::SqliteAuditStore;

use crate::error::AuditError;
use crate::models::{FeatureVector, IrisClass, PredictionResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default number of rows returned by a query
pub const DEFAULT_QUERY_LIMIT: usize = 10;

/// Upper bound on rows returned by a query
pub const MAX_QUERY_LIMIT: usize = 1000;

/// One row per served prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Assigned by the store on append
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub features: FeatureVector,
    pub prediction: IrisClass,
    pub confidence: f64,
    pub model_version: u64,
    pub processing_time_ms: f64,
    /// 1 for single predictions
    pub batch_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AuditRecord {
    pub fn from_prediction(
        features: FeatureVector,
        result: &PredictionResult,
        batch_size: usize,
        request_id: Option<&str>,
    ) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            features,
            prediction: result.prediction,
            confidence: result.confidence,
            model_version: result.model_version,
            processing_time_ms: result.processing_time_ms,
            batch_size: u32::try_from(batch_size).unwrap_or(u32::MAX),
            request_id: request_id.map(str::to_string),
        }
    }
}

/// Selection for audit queries. Results are newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub prediction: Option<IrisClass>,
    pub model_version: Option<u64>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    /// Requested limit clamped to `1..=MAX_QUERY_LIMIT`
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT)
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.prediction.map_or(true, |p| p == record.prediction)
            && self.model_version.map_or(true, |v| v == record.model_version)
            && self.since.map_or(true, |t| record.timestamp >= t)
    }
}

/// Aggregates over a time window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditStats {
    pub since: Option<DateTime<Utc>>,
    pub total_predictions: u64,
    pub avg_confidence: Option<f64>,
    pub avg_processing_time_ms: Option<f64>,
    pub prediction_distribution: BTreeMap<String, u64>,
}

/// Durable sink for audit records
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append records atomically; ids are assigned by the store
    async fn append(&self, records: &[AuditRecord]) -> Result<(), AuditError>;

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError>;

    async fn stats(&self, since: DateTime<Utc>) -> Result<AuditStats, AuditError>;

    async fn count(&self) -> Result<u64, AuditError>;

    /// Cheap reachability check
    async fn ping(&self) -> Result<(), AuditError>;
}

#[cfg(test)]
pub(crate) fn sample_record(prediction: IrisClass, model_version: u64) -> AuditRecord {
    AuditRecord {
        id: None,
        timestamp: Utc::now(),
        features: FeatureVector::new(5.1, 3.5, 1.4, 0.2),
        prediction,
        confidence: 0.9,
        model_version,
        processing_time_ms: 0.4,
        batch_size: 1,
        request_id: None,
    }
}
