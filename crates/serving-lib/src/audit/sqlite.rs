//! SQLite-backed audit store

use super::{AuditFilter, AuditRecord, AuditStats, AuditStore};
use crate::error::AuditError;
use crate::models::{FeatureVector, IrisClass};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS prediction_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    sepal_length REAL NOT NULL,
    sepal_width REAL NOT NULL,
    petal_length REAL NOT NULL,
    petal_width REAL NOT NULL,
    prediction TEXT NOT NULL,
    confidence REAL NOT NULL,
    model_version INTEGER NOT NULL,
    processing_time_ms REAL NOT NULL,
    batch_size INTEGER NOT NULL DEFAULT 1,
    request_id TEXT
)
"#;

const TIMESTAMP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_prediction_logs_timestamp ON prediction_logs (timestamp)";

/// Audit rows in a `prediction_logs` table
#[derive(Debug, Clone)]
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct LogRow {
    id: i64,
    timestamp: String,
    sepal_length: f64,
    sepal_width: f64,
    petal_length: f64,
    petal_width: f64,
    prediction: String,
    confidence: f64,
    model_version: i64,
    processing_time_ms: f64,
    batch_size: i64,
    request_id: Option<String>,
}

impl TryFrom<LogRow> for AuditRecord {
    type Error = AuditError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
            .map_err(|e| AuditError::Encoding(format!("row {}: {}", row.id, e)))?
            .with_timezone(&Utc);
        let prediction = IrisClass::from_str(&row.prediction)
            .map_err(|e| AuditError::Encoding(format!("row {}: {}", row.id, e)))?;
        Ok(AuditRecord {
            id: Some(row.id),
            timestamp,
            features: FeatureVector::new(
                row.sepal_length,
                row.sepal_width,
                row.petal_length,
                row.petal_width,
            ),
            prediction,
            confidence: row.confidence,
            model_version: u64::try_from(row.model_version).unwrap_or(0),
            processing_time_ms: row.processing_time_ms,
            batch_size: u32::try_from(row.batch_size).unwrap_or(1),
            request_id: row.request_id,
        })
    }
}

/// Fixed-width UTC text so lexicographic order is chronological order
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl SqliteAuditStore {
    /// Open (creating if needed) the database and ensure the schema exists
    pub async fn connect(database_url: &str) -> Result<Self, AuditError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Every pooled connection to `:memory:` would be a separate database
        let in_memory = database_url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(options).await?;

        sqlx::query(SCHEMA).execute(&pool).await?;
        sqlx::query(TIMESTAMP_INDEX).execute(&pool).await?;

        info!(database_url = %database_url, "Audit database ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn append(&self, records: &[AuditRecord]) -> Result<(), AuditError> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO prediction_logs (
                    timestamp, sepal_length, sepal_width, petal_length, petal_width,
                    prediction, confidence, model_version, processing_time_ms,
                    batch_size, request_id
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(encode_timestamp(&record.timestamp))
            .bind(record.features.sepal_length)
            .bind(record.features.sepal_width)
            .bind(record.features.petal_length)
            .bind(record.features.petal_width)
            .bind(record.prediction.as_str())
            .bind(record.confidence)
            .bind(i64::try_from(record.model_version).unwrap_or(i64::MAX))
            .bind(record.processing_time_ms)
            .bind(i64::from(record.batch_size))
            .bind(record.request_id.as_deref())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        let rows: Vec<LogRow> = sqlx::query_as(
            r#"
            SELECT id, timestamp, sepal_length, sepal_width, petal_length, petal_width,
                   prediction, confidence, model_version, processing_time_ms,
                   batch_size, request_id
            FROM prediction_logs
            WHERE (?1 IS NULL OR prediction = ?1)
              AND (?2 IS NULL OR model_version = ?2)
              AND (?3 IS NULL OR timestamp >= ?3)
            ORDER BY timestamp DESC, id DESC
            LIMIT ?4
            "#,
        )
        .bind(filter.prediction.map(IrisClass::as_str))
        .bind(
            filter
                .model_version
                .map(|v| i64::try_from(v).unwrap_or(i64::MAX)),
        )
        .bind(filter.since.as_ref().map(encode_timestamp))
        .bind(filter.effective_limit() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AuditRecord::try_from).collect()
    }

    async fn stats(&self, since: DateTime<Utc>) -> Result<AuditStats, AuditError> {
        let since_text = encode_timestamp(&since);

        let (total, avg_confidence, avg_processing_time_ms): (i64, Option<f64>, Option<f64>) =
            sqlx::query_as(
                r#"
                SELECT COUNT(*), AVG(confidence), AVG(processing_time_ms)
                FROM prediction_logs
                WHERE timestamp >= ?
                "#,
            )
            .bind(since_text.as_str())
            .fetch_one(&self.pool)
            .await?;

        let distribution: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT prediction, COUNT(*)
            FROM prediction_logs
            WHERE timestamp >= ?
            GROUP BY prediction
            "#,
        )
        .bind(since_text.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(AuditStats {
            since: Some(since),
            total_predictions: u64::try_from(total).unwrap_or(0),
            avg_confidence,
            avg_processing_time_ms,
            prediction_distribution: distribution
                .into_iter()
                .map(|(class, n)| (class, u64::try_from(n).unwrap_or(0)))
                .collect::<BTreeMap<_, _>>(),
        })
    }

    async fn count(&self) -> Result<u64, AuditError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM prediction_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn ping(&self) -> Result<(), AuditError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::sample_record;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_query_in_memory() {
        let store = SqliteAuditStore::connect("sqlite::memory:").await.unwrap();
        store
            .append(&[
                sample_record(IrisClass::Setosa, 1),
                sample_record(IrisClass::Virginica, 2),
            ])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 2);

        let rows = store.query(&AuditFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].prediction, IrisClass::Virginica);
        assert!(rows.iter().all(|r| r.id.is_some()));

        let filter = AuditFilter {
            prediction: Some(IrisClass::Setosa),
            ..Default::default()
        };
        let rows = store.query(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].features, FeatureVector::new(5.1, 3.5, 1.4, 0.2));
    }

    #[tokio::test]
    async fn test_model_version_and_since_filters() {
        let store = SqliteAuditStore::connect("sqlite::memory:").await.unwrap();
        let mut old = sample_record(IrisClass::Setosa, 1);
        old.timestamp = Utc::now() - chrono::Duration::hours(48);
        let mut tagged = sample_record(IrisClass::Setosa, 2);
        tagged.request_id = Some("req-7".to_string());
        store.append(&[old, tagged]).await.unwrap();

        let filter = AuditFilter {
            model_version: Some(2),
            ..Default::default()
        };
        let rows = store.query(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].request_id.as_deref(), Some("req-7"));

        let stats = store
            .stats(Utc::now() - chrono::Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(stats.total_predictions, 1);
        assert_eq!(stats.prediction_distribution["setosa"], 1);
    }

    #[tokio::test]
    async fn test_file_database_persists_across_connections() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("logs.db").display());

        let store = SqliteAuditStore::connect(&url).await.unwrap();
        store
            .append(&[sample_record(IrisClass::Versicolor, 1)])
            .await
            .unwrap();
        store.pool().close().await;

        let reopened = SqliteAuditStore::connect(&url).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        assert!(reopened.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_window_has_no_averages() {
        let store = SqliteAuditStore::connect("sqlite::memory:").await.unwrap();
        let stats = store.stats(Utc::now()).await.unwrap();
        assert_eq!(stats.total_predictions, 0);
        assert_eq!(stats.avg_confidence, None);
    }
}
