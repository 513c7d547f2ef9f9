//! In-process audit store
//!
//! Used when the database cannot be opened at startup, and in tests.
//! Holds at most `capacity` records; the oldest are evicted first.

use super::{AuditFilter, AuditRecord, AuditStats, AuditStore};
use crate::error::AuditError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::warn;

/// Records kept by `MemoryAuditStore::new`
pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

#[derive(Debug, Default)]
struct Ring {
    records: VecDeque<AuditRecord>,
    next_id: i64,
}

#[derive(Debug)]
pub struct MemoryAuditStore {
    ring: RwLock<Ring>,
    capacity: usize,
    evicted: AtomicU64,
    failing_appends: AtomicU32,
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: RwLock::new(Ring::default()),
            capacity: capacity.max(1),
            evicted: AtomicU64::new(0),
            failing_appends: AtomicU32::new(0),
        }
    }

    /// Records discarded to stay within capacity
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Make the next `n` appends fail, to exercise the writer's retry path
    pub fn fail_next_appends(&self, n: u32) {
        self.failing_appends.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, records: &[AuditRecord]) -> Result<(), AuditError> {
        let injected = self
            .failing_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(AuditError::Unavailable("injected append failure".to_string()));
        }

        let mut ring = self.ring.write().await;
        let mut evicted = 0;
        for record in records {
            ring.next_id += 1;
            let mut record = record.clone();
            record.id = Some(ring.next_id);
            if ring.records.len() == self.capacity {
                ring.records.pop_front();
                evicted += 1;
            }
            ring.records.push_back(record);
        }

        if evicted > 0 {
            let previous = self.evicted.fetch_add(evicted, Ordering::Relaxed);
            if previous == 0 {
                warn!(
                    capacity = self.capacity,
                    "In-memory audit store is full, evicting oldest records"
                );
            }
        }
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        let ring = self.ring.read().await;
        // Appends are in arrival order, so reverse iteration is newest first
        Ok(ring
            .records
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .take(filter.effective_limit())
            .cloned()
            .collect())
    }

    async fn stats(&self, since: DateTime<Utc>) -> Result<AuditStats, AuditError> {
        let ring = self.ring.read().await;
        let window: Vec<&AuditRecord> = ring
            .records
            .iter()
            .filter(|r| r.timestamp >= since)
            .collect();

        let mut stats = AuditStats {
            since: Some(since),
            total_predictions: window.len() as u64,
            ..Default::default()
        };
        if !window.is_empty() {
            let n = window.len() as f64;
            stats.avg_confidence = Some(window.iter().map(|r| r.confidence).sum::<f64>() / n);
            stats.avg_processing_time_ms =
                Some(window.iter().map(|r| r.processing_time_ms).sum::<f64>() / n);
        }
        for record in window {
            *stats
                .prediction_distribution
                .entry(record.prediction.to_string())
                .or_default() += 1;
        }
        Ok(stats)
    }

    async fn count(&self) -> Result<u64, AuditError> {
        Ok(self.ring.read().await.records.len() as u64)
    }

    async fn ping(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::sample_record;
    use crate::models::IrisClass;

    #[tokio::test]
    async fn test_query_is_newest_first_and_limited() {
        let store = MemoryAuditStore::new();
        for version in 1..=5 {
            store
                .append(&[sample_record(IrisClass::Setosa, version)])
                .await
                .unwrap();
        }
        let filter = AuditFilter {
            limit: Some(2),
            ..Default::default()
        };
        let rows = store.query(&filter).await.unwrap();
        let versions: Vec<u64> = rows.iter().map(|r| r.model_version).collect();
        assert_eq!(versions, vec![5, 4]);
        assert_eq!(rows[0].id, Some(5));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryAuditStore::new();
        store.fail_next_appends(1);
        let record = sample_record(IrisClass::Virginica, 1);
        assert!(store.append(&[record.clone()]).await.is_err());
        assert!(store.append(&[record]).await.is_ok());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let store = MemoryAuditStore::with_capacity(3);
        for version in 1..=5 {
            store
                .append(&[sample_record(IrisClass::Setosa, version)])
                .await
                .unwrap();
        }

        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(store.evicted(), 2);
        let rows = store.query(&AuditFilter::default()).await.unwrap();
        let versions: Vec<u64> = rows.iter().map(|r| r.model_version).collect();
        assert_eq!(versions, vec![5, 4, 3]);
        // ids keep increasing across evictions
        assert_eq!(rows[0].id, Some(5));
    }

    #[tokio::test]
    async fn test_stats_distribution() {
        let store = MemoryAuditStore::new();
        store
            .append(&[
                sample_record(IrisClass::Setosa, 1),
                sample_record(IrisClass::Setosa, 1),
                sample_record(IrisClass::Versicolor, 1),
            ])
            .await
            .unwrap();
        let stats = store
            .stats(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(stats.total_predictions, 3);
        assert_eq!(stats.prediction_distribution["setosa"], 2);
        assert!((stats.avg_confidence.unwrap() - 0.9).abs() < 1e-9);
    }
}
