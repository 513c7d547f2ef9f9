//! HTTP API for predictions, model management, health and metrics

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use serving_lib::{
    audit::AuditStats,
    engine::EngineStats,
    health::components,
    ArtifactStore, AuditFilter, ConflictError, HealthRegistry, InferenceError, IrisClass,
    MetricsSnapshot, PredictionService, RawFeatures, RetrainingCoordinator, ServingError,
    ServingMetrics, StructuredLogger, ValidationError,
};
use std::sync::Arc;
use tracing::{error, info};

/// Header carrying the caller's correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Default window for prediction statistics
const DEFAULT_STATS_HOURS: u32 = 24;

/// Widest statistics window, one year
const MAX_STATS_HOURS: u32 = 24 * 365;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub store: Arc<ArtifactStore>,
    pub coordinator: Arc<RetrainingCoordinator>,
    pub health_registry: HealthRegistry,
    pub metrics: ServingMetrics,
    pub logger: StructuredLogger,
    pub service_name: String,
    /// Audit records are kept in memory because the database could not be opened
    pub audit_fallback: bool,
}

/// Errors surfaced by handlers
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    Inference(InferenceError),
    Conflict(ConflictError),
    Unavailable(String),
    Internal(String),
}

impl From<ServingError> for ApiError {
    fn from(err: ServingError) -> Self {
        match err {
            ServingError::Validation(e) => ApiError::Validation(e),
            ServingError::Inference(e) => ApiError::Inference(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": "validation_error",
                    "message": e.to_string(),
                    "details": e.details(),
                }),
            ),
            ApiError::Inference(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "inference_error", "message": e.to_string()}),
            ),
            ApiError::Conflict(e) => (
                StatusCode::CONFLICT,
                json!({
                    "error": "conflict",
                    "message": e.to_string(),
                    "running_job_id": e.running_job_id,
                }),
            ),
            ApiError::Unavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"error": "unavailable", "message": message}),
            ),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "internal_error", "message": message}),
            ),
        };
        (status, Json(body)).into_response()
    }
}

fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Echo the caller's request id back on the response
fn with_request_id(request_id: Option<String>, response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    if let Some(value) = request_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "service": state.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "model_version": state.store.version(),
        "endpoints": [
            "POST /predict",
            "POST /predict/batch",
            "GET /model/info",
            "GET /health",
            "GET /ready",
            "GET /metrics",
            "GET /metrics/summary",
            "POST /retrain",
            "GET /retrain/status",
            "GET /predictions/recent",
            "GET /predictions/stats",
        ],
    }))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<RawFeatures>, JsonRejection>,
) -> Response {
    let request_id = request_id(&headers);
    let result = match body {
        Ok(Json(raw)) => state
            .service
            .predict(&raw, request_id.as_deref())
            .await
            .map(Json)
            .map_err(ApiError::from),
        Err(rejection) => Err(ApiError::Validation(
            state
                .service
                .reject_malformed(rejection.body_text(), request_id.as_deref()),
        )),
    };
    with_request_id(request_id, result)
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub samples: Vec<RawFeatures>,
}

async fn predict_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Response {
    let request_id = request_id(&headers);
    let result = match body {
        Ok(Json(request)) => state
            .service
            .predict_batch(&request.samples, request_id.as_deref())
            .await
            .map(Json)
            .map_err(ApiError::from),
        Err(rejection) => Err(ApiError::Validation(
            state
                .service
                .reject_malformed(rejection.body_text(), request_id.as_deref()),
        )),
    };
    with_request_id(request_id, result)
}

async fn model_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.current().info())
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if !state.audit_fallback {
        if state.service.audit().is_healthy().await {
            state.health_registry.set_healthy(components::AUDIT_LOG).await;
        } else {
            state
                .health_registry
                .set_degraded(components::AUDIT_LOG, "audit store unreachable or failing")
                .await;
        }
    }

    let report = state
        .health_registry
        .report(&state.store, state.metrics.uptime_seconds())
        .await;
    let status_code = if report.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(report))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let body = state.metrics.encode().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        ApiError::Internal(e.to_string())
    })?;
    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    #[serde(flatten)]
    metrics: MetricsSnapshot,
    engine: EngineStats,
}

async fn metrics_summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(SummaryResponse {
        metrics: state.metrics.snapshot(),
        engine: state.service.engine().stats(),
    })
}

#[derive(Debug, Serialize)]
struct RetrainAccepted {
    status: &'static str,
    job_id: u64,
    started_at: DateTime<Utc>,
}

async fn retrain(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let ticket = state.coordinator.trigger().map_err(ApiError::Conflict)?;
    info!(job_id = ticket.job_id, "Retraining accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(RetrainAccepted {
            status: "accepted",
            job_id: ticket.job_id,
            started_at: ticket.started_at,
        }),
    )
        .into_response())
}

async fn retrain_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.coordinator.status())
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
    pub prediction: Option<IrisClass>,
    pub model_version: Option<u64>,
}

async fn recent_predictions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Result<Response, ApiError> {
    let filter = AuditFilter {
        prediction: query.prediction,
        model_version: query.model_version,
        since: None,
        limit: query.limit,
    };
    let records = state
        .service
        .audit()
        .query(&filter)
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    Ok(Json(json!({ "count": records.len(), "predictions": records })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub hours: Option<u32>,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    window_hours: u32,
    #[serde(flatten)]
    stats: AuditStats,
}

async fn prediction_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Response, ApiError> {
    let window_hours = query
        .hours
        .unwrap_or(DEFAULT_STATS_HOURS)
        .clamp(1, MAX_STATS_HOURS);
    let since = Utc::now() - chrono::Duration::hours(i64::from(window_hours));
    let stats = state
        .service
        .audit()
        .stats(since)
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    Ok(Json(StatsResponse {
        window_hours,
        stats,
    })
    .into_response())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .route("/model/info", get(model_info))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/metrics/summary", get(metrics_summary))
        .route("/retrain", post(retrain))
        .route("/retrain/status", get(retrain_status))
        .route("/predictions/recent", get(recent_predictions))
        .route("/predictions/stats", get(prediction_stats))
        .with_state(state)
}
