use false_alarm_classifier::{
    api::{build_router, AppState},
    config::Config,
    ml::{FileModelRepository, PredictorService},
    observability::init_tracing,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize tracing
    if let Err(e) = init_tracing(&config.observability) {
        eprintln!("Failed to initialize tracing: {}", e);
    }

    tracing::info!("Starting False Alarm Classifier v{}", env!("CARGO_PKG_VERSION"));

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        if let Err(e) = false_alarm_classifier::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        } else {
            tracing::info!("✅ Prometheus metrics initialized");
        }
    } else {
        tracing::info!("⚠️  Prometheus metrics disabled in configuration");
    }

    // Load the persisted pipeline, if any
    let repository = Arc::new(FileModelRepository::new(&config.model.model_path));
    let predictor = Arc::new(PredictorService::new(repository));
    let status = predictor.reload();
    if !status.model_loaded {
        tracing::warn!("⚠️  Serving without a model; train one and call /reload-model");
    }

    let app = build_router(AppState::new(predictor));

    // Start HTTP server
    let http_addr = config.bind_address();
    let http_listener = tokio::net::TcpListener::bind(&http_addr).await?;

    tracing::info!("🚀 HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   Predict: http://{}/predict", http_addr);
    tracing::info!("   Reload model: http://{}/reload-model", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(http_listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down gracefully...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
