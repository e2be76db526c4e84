use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::metrics::gather_metrics;
use crate::ml::{ModelStatus, PredictRequest, PredictionResponse};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::IntoResponse,
    Json,
};

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<ModelStatus> {
    Json(state.predictor.health())
}

/// Classify one signalement
pub async fn predict(
    State(state): State<AppState>,
    payload: std::result::Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictionResponse>> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let response = state.predictor.predict(request)?;
    Ok(Json(response))
}

/// Reload the persisted model
pub async fn reload_model(State(state): State<AppState>) -> Json<ModelStatus> {
    let predictor = state.predictor.clone();
    let status = tokio::task::spawn_blocking(move || predictor.reload())
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Model reload task failed: {}", e);
            state.predictor.health()
        });

    Json(status)
}

/// Prometheus text exposition
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}
