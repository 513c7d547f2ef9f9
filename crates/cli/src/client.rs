//! API client for communicating with the iris prediction service

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Non-success response from the service
#[derive(Debug, Clone, Error)]
#[error("API error ({status}): {message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    /// Decoded error body, when the service returned JSON
    pub body: Option<serde_json::Value>,
}

impl ApiError {
    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }
}

/// API client for the prediction service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        // Without a trailing slash `join` would replace the last path segment
        let mut base_url = Url::parse(base_url).context("Invalid API URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .context("Invalid path")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path)?)
            .send()
            .await
            .context("Failed to send request")?;

        check(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// Make a GET request and return the raw body
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let response = self
            .client
            .get(self.url(path)?)
            .send()
            .await
            .context("Failed to send request")?;

        check(response)
            .await?
            .text()
            .await
            .context("Failed to read response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.url(path)?)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        check(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    pub async fn predict(&self, features: &Features) -> Result<Prediction> {
        self.post("predict", features).await
    }

    pub async fn predict_batch(&self, samples: &[serde_json::Value]) -> Result<BatchPrediction> {
        self.post("predict/batch", &serde_json::json!({ "samples": samples }))
            .await
    }

    pub async fn model_info(&self) -> Result<ModelInfo> {
        self.get("model/info").await
    }

    pub async fn health(&self) -> Result<HealthReport> {
        self.get("health").await
    }

    pub async fn metrics_summary(&self) -> Result<MetricsSummary> {
        self.get("metrics/summary").await
    }

    pub async fn start_retrain(&self) -> Result<RetrainAccepted> {
        self.post("retrain", &serde_json::json!({})).await
    }

    pub async fn retrain_status(&self) -> Result<RetrainStatus> {
        self.get("retrain/status").await
    }

    pub async fn recent_predictions(
        &self,
        limit: usize,
        class: Option<&str>,
    ) -> Result<RecentPredictions> {
        let mut path = format!("predictions/recent?limit={}", limit);
        if let Some(class) = class {
            path.push_str(&format!("&prediction={}", class));
        }
        self.get(&path).await
    }

    pub async fn prediction_stats(&self, hours: u32) -> Result<PredictionStats> {
        self.get(&format!("predictions/stats?hours={}", hours))
            .await
    }
}

/// Turn a non-success status into an `ApiError`
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let body: Option<serde_json::Value> = serde_json::from_str(&text).ok();
    let message = body
        .as_ref()
        .and_then(|b| b.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or(text);
    Err(ApiError {
        status: status.as_u16(),
        message,
        body,
    }
    .into())
}

// API request and response types

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Features {
    pub sepal_length: f64,
    pub sepal_width: f64,
    pub petal_length: f64,
    pub petal_width: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureWarning {
    #[serde(default)]
    pub index: Option<usize>,
    pub field: String,
    pub value: f64,
    pub expected_min: f64,
    pub expected_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction: String,
    pub confidence: f64,
    #[serde(default)]
    pub probabilities: BTreeMap<String, f64>,
    pub model_version: u64,
    pub processing_time_ms: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<FeatureWarning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPrediction {
    pub predictions: Vec<Prediction>,
    pub model_version: u64,
    pub total_processing_time_ms: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<FeatureWarning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_version: u64,
    pub model_type: String,
    pub classes: Vec<String>,
    pub features: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub f1_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub model_loaded: bool,
    pub model_version: u64,
    pub uptime_seconds: f64,
    pub version: String,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentHealth>,
    #[serde(default)]
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: u64,
    pub mean_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_predictions: u64,
    pub predictions_by_class: BTreeMap<String, u64>,
    pub total_errors: u64,
    pub errors_by_kind: BTreeMap<String, u64>,
    pub retrain_attempts: u64,
    pub retrain_successes: u64,
    pub retrain_failures: u64,
    pub retrain_rejected: u64,
    pub prediction_latency: LatencySummary,
    pub batch_latency: LatencySummary,
    pub model_version: u64,
    pub uptime_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainAccepted {
    pub status: String,
    pub job_id: u64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningJob {
    pub job_id: u64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == "succeeded"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainStatus {
    pub state: String,
    pub model_version: u64,
    #[serde(default)]
    pub current_job: Option<RunningJob>,
    #[serde(default)]
    pub last_job: Option<JobReport>,
    pub jobs_completed: u64,
}

impl RetrainStatus {
    /// Report for `job_id` once that job has finished
    pub fn finished_job(&self, job_id: u64) -> Option<&JobReport> {
        self.last_job.as_ref().filter(|job| job.job_id >= job_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(default)]
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub features: Features,
    pub prediction: String,
    pub confidence: f64,
    pub model_version: u64,
    pub processing_time_ms: f64,
    pub batch_size: u32,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentPredictions {
    pub count: usize,
    pub predictions: Vec<AuditEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionStats {
    pub window_hours: u32,
    pub total_predictions: u64,
    #[serde(default)]
    pub avg_confidence: Option<f64>,
    #[serde(default)]
    pub avg_processing_time_ms: Option<f64>,
    #[serde(default)]
    pub prediction_distribution: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_predict_posts_features() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/predict")
            .match_body(Matcher::PartialJson(json!({"sepal_length": 5.1})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "prediction": "setosa",
                    "confidence": 0.97,
                    "probabilities": {"setosa": 0.97, "versicolor": 0.02, "virginica": 0.01},
                    "model_version": 3,
                    "processing_time_ms": 0.2
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let prediction = client
            .predict(&Features {
                sepal_length: 5.1,
                sepal_width: 3.5,
                petal_length: 1.4,
                petal_width: 0.2,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(prediction.prediction, "setosa");
        assert_eq!(prediction.model_version, 3);
        assert!(prediction.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_conflict_surfaces_as_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/retrain")
            .with_status(409)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "error": "conflict",
                    "message": "retraining job 4 is already running",
                    "running_job_id": 4
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.start_retrain().await.unwrap_err();
        let api_error = err.downcast_ref::<ApiError>().unwrap();
        assert!(api_error.is_conflict());
        assert_eq!(api_error.message, "retraining job 4 is already running");
        assert_eq!(api_error.body.as_ref().unwrap()["running_job_id"], 4);
    }

    #[tokio::test]
    async fn test_base_path_is_preserved() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/iris/retrain/status")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "state": "idle",
                    "model_version": 2,
                    "last_job": {
                        "job_id": 1,
                        "started_at": "2024-05-01T10:00:00Z",
                        "finished_at": "2024-05-01T10:00:02Z",
                        "outcome": "succeeded",
                        "old_version": 1,
                        "new_version": 2,
                        "model_type": "LogisticRegression",
                        "accuracy": 0.97,
                        "f1_score": 0.97
                    },
                    "jobs_completed": 1
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&format!("{}/iris", server.url())).unwrap();
        let status = client.retrain_status().await.unwrap();

        mock.assert_async().await;
        let job = status.finished_job(1).unwrap();
        assert!(job.succeeded());
        assert_eq!(job.new_version, Some(2));
        assert!(status.finished_job(2).is_none());
    }

    #[tokio::test]
    async fn test_recent_predictions_query_string() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/predictions/recent")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("limit".into(), "5".into()),
                Matcher::UrlEncoded("prediction".into(), "virginica".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"count": 0, "predictions": []}).to_string())
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let recent = client
            .recent_predictions(5, Some("virginica"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(recent.count, 0);
    }
}
