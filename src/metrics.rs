//! Prometheus metrics for the predictor service.
//!
//! Collectors are process-global and registered into [`PROMETHEUS_REGISTRY`]
//! by [`init_metrics`]; `GET /metrics` renders them with [`gather_metrics`].

use lazy_static::lazy_static;
use prometheus::{CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};

const NAMESPACE: &str = "false_alarm_classifier";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    /// Predictions served
    ///
    /// Labels: outcome (false_alarm, real_signalement, invalid, not_loaded, error)
    pub static ref PREDICTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("predictions_total", "Total number of prediction requests")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create PREDICTIONS_TOTAL metric");

    /// Time spent scoring a single record
    pub static ref PREDICTION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "prediction_duration_seconds",
            "Time spent scoring a single record in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0])
    ).expect("Failed to create PREDICTION_DURATION_SECONDS metric");

    /// Model reload attempts
    ///
    /// Labels: result (loaded, missing, error)
    pub static ref MODEL_RELOADS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("model_reloads_total", "Total number of model reload attempts")
            .namespace(NAMESPACE),
        &["result"]
    ).expect("Failed to create MODEL_RELOADS_TOTAL metric");

    /// 1 when a pipeline is loaded, 0 otherwise
    pub static ref MODEL_LOADED: Gauge = Gauge::with_opts(
        Opts::new("model_loaded", "Whether a trained pipeline is loaded")
            .namespace(NAMESPACE)
    ).expect("Failed to create MODEL_LOADED metric");
}

/// Register all collectors with the global registry.
///
/// Calling it more than once is harmless.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    register(Box::new(PREDICTIONS_TOTAL.clone()))?;
    register(Box::new(PREDICTION_DURATION_SECONDS.clone()))?;
    register(Box::new(MODEL_RELOADS_TOTAL.clone()))?;
    register(Box::new(MODEL_LOADED.clone()))?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

fn register(collector: Box<dyn prometheus::core::Collector>) -> Result<(), prometheus::Error> {
    match PROMETHEUS_REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Generate Prometheus text format metrics
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
