/// Integration tests for the predictor HTTP API
///
/// These tests drive the axum router directly:
/// - Health and reload status
/// - Request validation and error bodies
/// - Predictions from a trained pipeline
/// - Metrics exposition

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use false_alarm_classifier::{
    api::{build_router, AppState},
    metrics,
    ml::{
        recommendation, training_fixture, ForestConfig, InMemoryModelRepository,
        ModelRepository, PredictorService, Trainer, TrainingConfig,
    },
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn quick_config() -> TrainingConfig {
    TrainingConfig {
        forest: ForestConfig {
            n_estimators: 30,
            ..ForestConfig::default()
        },
        ..TrainingConfig::default()
    }
}

fn setup() -> (Router, Arc<InMemoryModelRepository>) {
    let repo = Arc::new(InMemoryModelRepository::new());
    let predictor = Arc::new(PredictorService::new(repo.clone()));
    (build_router(AppState::new(predictor)), repo)
}

fn train_into(repo: Arc<InMemoryModelRepository>) {
    let mut trainer = Trainer::new(quick_config(), repo);
    trainer.run(&training_fixture()).unwrap();
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn sample_body() -> Value {
    json!({
        "description": "Un enfant présente des traces de coups répétées",
        "incidentType": "VIOLENCE",
        "urgencyLevel": "CRITIQUE",
        "aiSuspicionScore": 88
    })
}

#[tokio::test]
async fn test_health_without_model() {
    let (app, _) = setup();

    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "model_loaded": false}));
}

#[tokio::test]
async fn test_predict_without_model() {
    let (app, _) = setup();

    let (status, body) = send(&app, post_json("/predict", sample_body())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Model not loaded. Please train the model first.");
}

#[tokio::test]
async fn test_predict_missing_fields() {
    let (app, _) = setup();

    let (status, body) = send(
        &app,
        post_json("/predict", json!({"description": "Test", "urgencyLevel": "BAS"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Missing required fields: incidentType, aiSuspicionScore"
    );
}

#[tokio::test]
async fn test_predict_names_each_missing_field() {
    let (app, _) = setup();

    for field in ["description", "incidentType", "urgencyLevel", "aiSuspicionScore"] {
        let mut body = sample_body();
        body.as_object_mut().unwrap().remove(field);

        let (status, response) = send(&app, post_json("/predict", body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "field {}", field);
        assert_eq!(
            response["error"],
            format!("Missing required fields: {}", field)
        );
    }
}

#[tokio::test]
async fn test_predict_rejects_non_object_body() {
    let (app, _) = setup();

    let (status, body) = send(&app, post_json("/predict", json!([1, 2, 3]))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_reload_after_training() {
    let (app, repo) = setup();

    let (_, before) = send(&app, post_empty("/reload-model")).await;
    assert_eq!(before["model_loaded"], false);

    train_into(repo);

    let (status, after) = send(&app, post_empty("/reload-model")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(after, json!({"status": "ok", "model_loaded": true}));

    let (_, health) = send(&app, get("/health")).await;
    assert_eq!(health["model_loaded"], true);
}

#[tokio::test]
async fn test_predict_with_model() {
    let (app, repo) = setup();
    train_into(repo);
    send(&app, post_empty("/reload-model")).await;

    let (status, body) = send(&app, post_json("/predict", sample_body())).await;
    assert_eq!(status, StatusCode::OK);

    let is_false_alarm = body["is_false_alarm"].as_bool().unwrap();
    let confidence = body["confidence"].as_f64().unwrap();
    let real = body["probabilities"]["real_signalement"].as_f64().unwrap();
    let false_alarm = body["probabilities"]["false_alarm"].as_f64().unwrap();

    assert!((real + false_alarm - 100.0).abs() < 0.02);
    assert_eq!(confidence, if is_false_alarm { false_alarm } else { real });
    assert_eq!(
        body["recommendation"],
        recommendation(is_false_alarm, confidence / 100.0)
    );
}

#[tokio::test]
async fn test_predict_accepts_unknown_categories() {
    let (app, repo) = setup();
    train_into(repo);
    send(&app, post_empty("/reload-model")).await;

    let (status, body) = send(
        &app,
        post_json(
            "/predict",
            json!({
                "description": "Signalement inhabituel",
                "incidentType": "INCENDIE",
                "urgencyLevel": "EXTREME",
                "aiSuspicionScore": "50"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["confidence"].as_f64().unwrap() >= 50.0);
}

#[tokio::test]
async fn test_reload_keeps_model_when_artifact_disappears() {
    let (app, repo) = setup();
    train_into(repo.clone());
    send(&app, post_empty("/reload-model")).await;

    repo.remove().unwrap();
    assert!(repo.load().unwrap().is_none());

    let (_, body) = send(&app, post_empty("/reload-model")).await;
    assert_eq!(body["model_loaded"], true);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    metrics::init_metrics().unwrap();
    let (app, _) = setup();
    send(&app, post_empty("/reload-model")).await;

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("false_alarm_classifier_model_reloads_total"));
}
