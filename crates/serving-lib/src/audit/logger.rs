//! Bounded-queue audit writer
//!
//! `record` and `record_all` wait at most `enqueue_timeout` in total for queue
//! space and never fail the caller. A single writer task drains the queue into batches and retries
//! failed appends with linear backoff before dropping them.

use super::{AuditFilter, AuditRecord, AuditStats, AuditStore};
use crate::error::AuditError;
use crate::observability::{ErrorKind, ServingMetrics, StructuredLogger};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Configuration for the audit writer
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// When false `record` is a no-op
    pub enabled: bool,
    /// Channel buffer size for backpressure
    pub queue_capacity: usize,
    /// Longest a prediction may wait for queue space
    pub enqueue_timeout: Duration,
    /// Retries per batch before giving up
    pub max_retries: u32,
    /// Backoff step; attempt `n` waits `n * retry_backoff`
    pub retry_backoff: Duration,
    /// Maximum records per append
    pub max_batch_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 1024,
            enqueue_timeout: Duration::from_millis(50),
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            max_batch_size: 64,
        }
    }
}

/// Delivery counters for the audit pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub written: u64,
    pub dropped: u64,
}

enum Command {
    Record(AuditRecord),
    /// Acknowledged once every earlier record has been handled
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct Counters {
    written: AtomicU64,
    dropped: AtomicU64,
    /// Outcome of the most recent append
    healthy: AtomicBool,
}

struct Writer {
    store: Arc<dyn AuditStore>,
    config: AuditConfig,
    metrics: ServingMetrics,
    logger: StructuredLogger,
    counters: Arc<Counters>,
}

/// Front end of the audit pipeline
pub struct AuditLogger {
    config: AuditConfig,
    sender: mpsc::Sender<Command>,
    store: Arc<dyn AuditStore>,
    metrics: ServingMetrics,
    logger: StructuredLogger,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("config", &self.config)
            .field("delivery", &self.delivery())
            .finish_non_exhaustive()
    }
}

impl AuditLogger {
    /// Start the writer task on the current runtime
    pub fn spawn(
        store: Arc<dyn AuditStore>,
        config: AuditConfig,
        metrics: ServingMetrics,
        logger: StructuredLogger,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(Counters {
            healthy: AtomicBool::new(true),
            ..Default::default()
        });

        let writer = Writer {
            store: Arc::clone(&store),
            config: config.clone(),
            metrics: metrics.clone(),
            logger: logger.clone(),
            counters: Arc::clone(&counters),
        };
        tokio::spawn(writer.run(receiver));

        Self {
            config,
            sender,
            store,
            metrics,
            logger,
            counters,
        }
    }

    /// Queue a record. Never fails the caller; a record that cannot be queued
    /// in time is dropped and counted.
    pub async fn record(&self, record: AuditRecord) {
        self.record_all(vec![record]).await;
    }

    /// Queue records under one shared deadline. Once it passes, the rest of
    /// the records are dropped together.
    pub async fn record_all(&self, records: Vec<AuditRecord>) {
        if !self.config.enabled {
            return;
        }
        let deadline = tokio::time::Instant::now() + self.config.enqueue_timeout;
        let total = records.len();
        for (queued, record) in records.into_iter().enumerate() {
            let sent =
                tokio::time::timeout_at(deadline, self.sender.send(Command::Record(record))).await;
            match sent {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return self.drop_records(total - queued, "writer closed"),
                Err(_) => return self.drop_records(total - queued, "queue full"),
            }
        }
    }

    /// Wait until every record queued before this call has been written or dropped
    pub async fn flush(&self) -> Result<(), AuditError> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(Command::Flush(ack))
            .await
            .map_err(|_| AuditError::WriterClosed)?;
        done.await.map_err(|_| AuditError::WriterClosed)
    }

    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        self.store.query(filter).await
    }

    pub async fn stats(&self, since: DateTime<Utc>) -> Result<AuditStats, AuditError> {
        self.store.stats(since).await
    }

    pub async fn count(&self) -> Result<u64, AuditError> {
        self.store.count().await
    }

    /// Store reachable and the last append succeeded
    pub async fn is_healthy(&self) -> bool {
        self.counters.healthy.load(Ordering::Relaxed) && self.store.ping().await.is_ok()
    }

    pub fn delivery(&self) -> DeliveryStats {
        DeliveryStats {
            written: self.counters.written.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    fn drop_records(&self, n: usize, reason: &str) {
        self.counters
            .dropped
            .fetch_add(n as u64, Ordering::Relaxed);
        self.metrics.inc_error(ErrorKind::AuditWrite);
        self.logger.log_audit_dropped(n, reason);
    }
}

impl Writer {
    async fn run(self, mut receiver: mpsc::Receiver<Command>) {
        let mut batch = Vec::with_capacity(self.config.max_batch_size);
        let mut acks = Vec::new();

        while let Some(command) = receiver.recv().await {
            let mut next = Some(command);
            while let Some(command) = next.take() {
                match command {
                    Command::Record(record) => batch.push(record),
                    Command::Flush(ack) => acks.push(ack),
                }
                if batch.len() < self.config.max_batch_size.max(1) {
                    next = receiver.try_recv().ok();
                }
            }

            if !batch.is_empty() {
                self.write(&batch).await;
                batch.clear();
            }
            for ack in acks.drain(..) {
                let _ = ack.send(());
            }
        }
        debug!("Audit writer stopped");
    }

    async fn write(&self, batch: &[AuditRecord]) {
        let mut attempt = 0;
        loop {
            match self.store.append(batch).await {
                Ok(()) => {
                    self.counters
                        .written
                        .fetch_add(batch.len() as u64, Ordering::Relaxed);
                    self.counters.healthy.store(true, Ordering::Relaxed);
                    debug!(records = batch.len(), "Audit batch written");
                    return;
                }
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        records = batch.len(),
                        attempt,
                        error = %e,
                        "Audit append failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                Err(e) => {
                    self.counters.healthy.store(false, Ordering::Relaxed);
                    self.counters
                        .dropped
                        .fetch_add(batch.len() as u64, Ordering::Relaxed);
                    self.metrics.inc_error(ErrorKind::AuditWrite);
                    self.logger.log_audit_dropped(batch.len(), &e.to_string());
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{sample_record, MemoryAuditStore};
    use crate::models::IrisClass;
    use async_trait::async_trait;

    /// Accepts connections but never finishes an append
    struct StalledStore;

    #[async_trait]
    impl AuditStore for StalledStore {
        async fn append(&self, _records: &[AuditRecord]) -> Result<(), AuditError> {
            std::future::pending().await
        }

        async fn query(&self, _filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
            Ok(Vec::new())
        }

        async fn stats(&self, _since: DateTime<Utc>) -> Result<AuditStats, AuditError> {
            Ok(AuditStats::default())
        }

        async fn count(&self) -> Result<u64, AuditError> {
            Ok(0)
        }

        async fn ping(&self) -> Result<(), AuditError> {
            Ok(())
        }
    }

    fn fast_config() -> AuditConfig {
        AuditConfig {
            retry_backoff: Duration::from_millis(1),
            ..AuditConfig::default()
        }
    }

    fn spawn(store: Arc<MemoryAuditStore>, config: AuditConfig) -> (AuditLogger, ServingMetrics) {
        let metrics = ServingMetrics::new().unwrap();
        let logger = AuditLogger::spawn(store, config, metrics.clone(), StructuredLogger::new("test"));
        (logger, metrics)
    }

    #[tokio::test]
    async fn test_flush_waits_for_queued_records() {
        let store = Arc::new(MemoryAuditStore::new());
        let (logger, _) = spawn(Arc::clone(&store), fast_config());

        for _ in 0..10 {
            logger.record(sample_record(IrisClass::Setosa, 1)).await;
        }
        logger.flush().await.unwrap();

        assert_eq!(store.count().await.unwrap(), 10);
        assert_eq!(logger.delivery(), DeliveryStats { written: 10, dropped: 0 });
    }

    #[tokio::test]
    async fn test_disabled_logger_records_nothing() {
        let store = Arc::new(MemoryAuditStore::new());
        let config = AuditConfig {
            enabled: false,
            ..fast_config()
        };
        let (logger, _) = spawn(Arc::clone(&store), config);
        logger.record(sample_record(IrisClass::Setosa, 1)).await;
        logger.flush().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let store = Arc::new(MemoryAuditStore::new());
        store.fail_next_appends(2);
        let (logger, metrics) = spawn(Arc::clone(&store), fast_config());

        logger.record(sample_record(IrisClass::Versicolor, 1)).await;
        logger.flush().await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(metrics.snapshot().errors_by_kind["audit_write"], 0);
        assert!(logger.is_healthy().await);
    }

    #[tokio::test]
    async fn test_persistent_failure_drops_and_counts() {
        let store = Arc::new(MemoryAuditStore::new());
        store.fail_next_appends(100);
        let config = AuditConfig {
            max_retries: 2,
            ..fast_config()
        };
        let (logger, metrics) = spawn(Arc::clone(&store), config);

        logger.record(sample_record(IrisClass::Virginica, 1)).await;
        logger.flush().await.unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(logger.delivery().dropped, 1);
        assert_eq!(metrics.snapshot().errors_by_kind["audit_write"], 1);
        assert!(!logger.is_healthy().await);
    }

    #[tokio::test]
    async fn test_stalled_store_bounds_batch_enqueue() {
        let metrics = ServingMetrics::new().unwrap();
        let config = AuditConfig {
            queue_capacity: 1,
            enqueue_timeout: Duration::from_millis(50),
            ..fast_config()
        };
        let logger = AuditLogger::spawn(
            Arc::new(StalledStore),
            config,
            metrics.clone(),
            StructuredLogger::new("test"),
        );
        let records: Vec<AuditRecord> = (0..100)
            .map(|_| sample_record(IrisClass::Setosa, 1))
            .collect();

        let start = std::time::Instant::now();
        logger.record_all(records).await;
        let elapsed = start.elapsed();

        assert!(elapsed < Duration::from_millis(500), "blocked for {:?}", elapsed);
        assert!(logger.delivery().dropped >= 98);
        assert_eq!(metrics.snapshot().errors_by_kind["audit_write"], 1);
    }

    #[tokio::test]
    async fn test_query_goes_to_store() {
        let store = Arc::new(MemoryAuditStore::new());
        let (logger, _) = spawn(Arc::clone(&store), fast_config());
        logger
            .record_all(vec![
                sample_record(IrisClass::Setosa, 1),
                sample_record(IrisClass::Virginica, 1),
            ])
            .await;
        logger.flush().await.unwrap();

        let filter = AuditFilter {
            prediction: Some(IrisClass::Virginica),
            ..Default::default()
        };
        let rows = logger.query(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(logger.count().await.unwrap(), 2);
    }
}
