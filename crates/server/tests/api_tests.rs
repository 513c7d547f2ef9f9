//! Integration tests for the prediction API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use iris_server::{build_state, create_router, AppState, ServerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    _dir: TempDir,
}

async fn setup_with(database_url: &str) -> TestApp {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig {
        model_dir: dir.path().join("models").display().to_string(),
        database_url: database_url.to_string(),
        ..ServerConfig::default()
    };
    let state = Arc::new(build_state(&config).await.unwrap());
    let router = create_router(state.clone());
    TestApp {
        router,
        state,
        _dir: dir,
    }
}

async fn setup_test_app() -> TestApp {
    setup_with("sqlite::memory:").await
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into()))
    };
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn setosa() -> Value {
    json!({"sepal_length": 5.1, "sepal_width": 3.5, "petal_length": 1.4, "petal_width": 0.2})
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let app = setup_test_app().await;
    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "iris-classifier");
    assert_eq!(body["model_version"], 1);
    assert!(body["endpoints"].as_array().unwrap().len() >= 7);
}

#[tokio::test]
async fn test_predict_classifies_setosa() {
    let app = setup_test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .header("x-request-id", "req-42")
        .body(Body::from(setosa().to_string()))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-42");

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let prediction: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(prediction["prediction"], "setosa");
    assert!(prediction["confidence"].as_f64().unwrap() > 0.9);
    assert!(prediction["processing_time_ms"].as_f64().unwrap() >= 0.0);
    assert_eq!(prediction["model_version"], 1);
}

#[tokio::test]
async fn test_predict_rejects_negative_value() {
    let app = setup_test_app().await;
    let (status, body) = send(
        &app,
        post_json(
            "/predict",
            json!({"sepal_length": -1.0, "sepal_width": 3.5, "petal_length": 1.4, "petal_width": 0.2}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["details"][0]["field"], "sepal_length");
    assert_eq!(body["details"][0]["issue"], "negative");

    app.state.service.audit().flush().await.unwrap();
    assert_eq!(app.state.service.audit().count().await.unwrap(), 0);
    assert_eq!(app.state.metrics.snapshot().errors_by_kind["validation"], 1);
}

#[tokio::test]
async fn test_predict_reports_every_bad_field() {
    let app = setup_test_app().await;
    let (status, body) = send(
        &app,
        post_json("/predict", json!({"sepal_length": "long", "petal_width": 0.2})),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["sepal_length", "sepal_width", "petal_length"]);
}

#[tokio::test]
async fn test_malformed_body_is_validation_error() {
    let app = setup_test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_batch_preserves_order() {
    let app = setup_test_app().await;
    let samples = json!({"samples": [
        setosa(),
        {"sepal_length": 6.7, "sepal_width": 3.0, "petal_length": 5.2, "petal_width": 2.3},
        {"sepal_length": 5.9, "sepal_width": 2.8, "petal_length": 4.3, "petal_width": 1.3},
    ]});
    let (status, body) = send(&app, post_json("/predict/batch", samples)).await;

    assert_eq!(status, StatusCode::OK);
    let labels: Vec<&str> = body["predictions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["prediction"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["setosa", "virginica", "versicolor"]);
    assert!(body["total_processing_time_ms"].as_f64().is_some());

    app.state.service.audit().flush().await.unwrap();
    assert_eq!(app.state.service.audit().count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_batch_with_invalid_element_is_rejected_wholesale() {
    let app = setup_test_app().await;
    let samples = json!({"samples": [
        setosa(),
        {"sepal_length": 5.1, "sepal_width": 3.5, "petal_length": 1.4, "petal_width": -0.2},
    ]});
    let (status, body) = send(&app, post_json("/predict/batch", samples)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"][0]["index"], 1);
    assert!(body.get("predictions").is_none());

    app.state.service.audit().flush().await.unwrap();
    assert_eq!(app.state.service.audit().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_batch_non_object_element_is_reported_by_index() {
    let app = setup_test_app().await;
    let (status, body) = send(
        &app,
        post_json("/predict/batch", json!({"samples": [setosa(), 1]})),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["details"][0]["index"], 1);
    assert_eq!(body["details"][0]["field"], "sample");
    assert_eq!(body["details"][0]["issue"], "not_an_object");
}

#[tokio::test]
async fn test_measurement_above_ten_centimeters_is_rejected() {
    let app = setup_test_app().await;
    let (status, body) = send(
        &app,
        post_json(
            "/predict",
            json!({"sepal_length": 12.0, "sepal_width": 3.5, "petal_length": 1.4, "petal_width": 0.2}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"][0]["field"], "sepal_length");
    assert_eq!(body["details"][0]["issue"], "too_large");
}

#[tokio::test]
async fn test_batch_size_is_bounded() {
    let app = setup_test_app().await;
    let samples: Vec<Value> = (0..101).map(|_| setosa()).collect();
    let (status, body) = send(&app, post_json("/predict/batch", json!({ "samples": samples }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("exceeds maximum of 100"));

    let (status, _) = send(&app, post_json("/predict/batch", json!({"samples": []}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_model_info() {
    let app = setup_test_app().await;
    let (status, body) = send(&app, get("/model/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_version"], 1);
    assert_eq!(body["classes"], json!(["setosa", "versicolor", "virginica"]));
    assert!(body["model_type"].is_string());
}

#[tokio::test]
async fn test_health_and_readiness() {
    let app = setup_test_app().await;
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], true);
    assert!(body["uptime_seconds"].as_f64().unwrap() >= 0.0);

    let (status, body) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn test_unreachable_database_degrades_but_serves() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("missing/dir/logs.db").display());
    let app = setup_with(&url).await;

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["components"]["audit_log"]["status"], "degraded");

    let (status, _) = send(&app, post_json("/predict", setosa())).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_exposition_and_summary() {
    let app = setup_test_app().await;
    send(&app, post_json("/predict", setosa())).await;

    let response = app.router.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("iris_predictions_total"));
    assert!(text.contains("iris_prediction_latency_seconds"));

    let (status, summary) = send(&app, get("/metrics/summary")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total_predictions"], 1);
    assert_eq!(summary["predictions_by_class"]["setosa"], 1);
    assert_eq!(summary["engine"]["total_inferences"], 1);
}

#[tokio::test]
async fn test_retrain_conflict_then_new_version() {
    let app = setup_test_app().await;

    let (status, first) = send(&app, post_json("/retrain", json!({}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(first["status"], "accepted");
    let job_id = first["job_id"].as_u64().unwrap();

    let (status, second) = send(&app, post_json("/retrain", json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(second["running_job_id"], job_id);

    let report = app.state.coordinator.wait_for_job(job_id).await.unwrap();
    assert!(report.outcome.is_success());

    let (_, status_body) = send(&app, get("/retrain/status")).await;
    assert_eq!(status_body["state"], "idle");
    assert_eq!(status_body["model_version"], 2);
    assert_eq!(status_body["last_job"]["outcome"], "succeeded");

    let (_, info) = send(&app, get("/model/info")).await;
    assert_eq!(info["model_version"], 2);

    let (_, prediction) = send(&app, post_json("/predict", setosa())).await;
    assert_eq!(prediction["model_version"], 2);
}

#[tokio::test]
async fn test_recent_predictions_and_stats() {
    let app = setup_test_app().await;
    send(&app, post_json("/predict", setosa())).await;
    send(
        &app,
        post_json(
            "/predict",
            json!({"sepal_length": 6.7, "sepal_width": 3.0, "petal_length": 5.2, "petal_width": 2.3}),
        ),
    )
    .await;
    app.state.service.audit().flush().await.unwrap();

    let (status, body) = send(&app, get("/predictions/recent?limit=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["predictions"][0]["prediction"], "virginica");

    let (_, body) = send(&app, get("/predictions/recent?prediction=setosa")).await;
    assert_eq!(body["count"], 1);

    let (status, stats) = send(&app, get("/predictions/stats?hours=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["window_hours"], 1);
    assert_eq!(stats["total_predictions"], 2);
    assert_eq!(stats["prediction_distribution"]["virginica"], 1);
}

#[tokio::test]
async fn test_stats_window_is_capped() {
    let app = setup_test_app().await;
    let (status, stats) = send(&app, get("/predictions/stats?hours=4294967295")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["window_hours"], 24 * 365);

    let (status, stats) = send(&app, get("/predictions/stats?hours=0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["window_hours"], 1);
}
