use crate::error::{AppError, Result};
use crate::metrics::{MODEL_LOADED, MODEL_RELOADS_TOTAL, PREDICTIONS_TOTAL, PREDICTION_DURATION_SECONDS};
use crate::ml::pipeline::FalseAlarmPipeline;
use crate::ml::repository::ModelRepository;
use crate::models::IncidentRecord;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Prediction request body.
///
/// Fields stay untyped until [`PredictRequest::into_record`] so that absent,
/// null and mistyped fields can be told apart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
    #[serde(default)]
    pub description: Option<Value>,
    #[serde(default)]
    pub incident_type: Option<Value>,
    #[serde(default)]
    pub urgency_level: Option<Value>,
    #[serde(default)]
    pub ai_suspicion_score: Option<Value>,
}

impl PredictRequest {
    /// Build a request from a typed record
    pub fn from_record(record: &IncidentRecord) -> Self {
        Self {
            description: Some(Value::from(record.description.as_str())),
            incident_type: Some(Value::from(record.incident_type.as_str())),
            urgency_level: Some(Value::from(record.urgency_level.as_str())),
            ai_suspicion_score: Some(Value::from(record.ai_suspicion_score)),
        }
    }

    /// Check presence and types of every field
    pub fn into_record(self) -> Result<IncidentRecord> {
        let fields = [
            ("description", &self.description),
            ("incidentType", &self.incident_type),
            ("urgencyLevel", &self.urgency_level),
            ("aiSuspicionScore", &self.ai_suspicion_score),
        ];

        let missing: Vec<String> = fields
            .iter()
            .filter(|(_, value)| matches!(value, None | Some(Value::Null)))
            .map(|(name, _)| name.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(AppError::MissingFields(missing));
        }

        Ok(IncidentRecord::from_raw(
            string_field("description", self.description)?,
            string_field("incidentType", self.incident_type)?,
            string_field("urgencyLevel", self.urgency_level)?,
            number_field("aiSuspicionScore", self.ai_suspicion_score)?,
        ))
    }
}

fn string_field(name: &str, value: Option<Value>) -> Result<String> {
    match value {
        Some(Value::String(s)) => Ok(s),
        _ => Err(AppError::Validation(format!("{} must be a string", name))),
    }
}

fn number_field(name: &str, value: Option<Value>) -> Result<f64> {
    let number = match &value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    number
        .filter(|n| n.is_finite())
        .ok_or_else(|| AppError::Validation(format!("{} must be a number", name)))
}

/// Class probabilities as percentages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityPercentages {
    pub real_signalement: f64,
    pub false_alarm: f64,
}

/// Prediction response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub is_false_alarm: bool,
    /// Probability of the predicted class, as a percentage
    pub confidence: f64,
    pub probabilities: ProbabilityPercentages,
    pub recommendation: String,
}

/// Health and reload response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub status: String,
    pub model_loaded: bool,
}

impl ModelStatus {
    fn ok(model_loaded: bool) -> Self {
        Self {
            status: "ok".to_string(),
            model_loaded,
        }
    }
}

/// Confidence band of a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    High,
    Moderate,
    Low,
}

impl ConfidenceBand {
    /// Band for a probability in `[0, 1]`; boundaries belong to the lower band
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 0.8 {
            ConfidenceBand::High
        } else if confidence > 0.6 {
            ConfidenceBand::Moderate
        } else {
            ConfidenceBand::Low
        }
    }
}

/// Recommendation text for a label and its confidence
pub fn recommendation(is_false_alarm: bool, confidence: f64) -> &'static str {
    match (is_false_alarm, ConfidenceBand::from_confidence(confidence)) {
        (true, ConfidenceBand::High) => {
            "Forte probabilité de fausse alarme - Peut être marqué comme tel"
        }
        (true, ConfidenceBand::Moderate) => {
            "Probabilité modérée de fausse alarme - Vérifier les détails"
        }
        (false, ConfidenceBand::High) => {
            "Forte probabilité de signalement réel - Ne pas marquer comme fausse alarme"
        }
        (false, ConfidenceBand::Moderate) => {
            "Probabilité modérée de signalement réel - Procéder avec prudence"
        }
        (_, ConfidenceBand::Low) => "Faible certitude - Investigation supplémentaire recommandée",
    }
}

fn percentage(probability: f64) -> f64 {
    (probability * 100.0 * 100.0).round() / 100.0
}

/// Serves predictions from the currently loaded pipeline
pub struct PredictorService {
    repository: Arc<dyn ModelRepository>,
    pipeline: RwLock<Option<Arc<FalseAlarmPipeline>>>,
}

impl PredictorService {
    /// Create a service with no pipeline loaded
    pub fn new(repository: Arc<dyn ModelRepository>) -> Self {
        Self {
            repository,
            pipeline: RwLock::new(None),
        }
    }

    /// Create a service around an already fitted pipeline
    pub fn with_pipeline(repository: Arc<dyn ModelRepository>, pipeline: FalseAlarmPipeline) -> Self {
        Self {
            repository,
            pipeline: RwLock::new(Some(Arc::new(pipeline))),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.pipeline.read().is_some()
    }

    /// Currently loaded pipeline, if any
    pub fn current(&self) -> Option<Arc<FalseAlarmPipeline>> {
        self.pipeline.read().clone()
    }

    pub fn health(&self) -> ModelStatus {
        ModelStatus::ok(self.is_loaded())
    }

    /// Load the persisted pipeline, replacing the current one if found.
    ///
    /// Never fails: a missing or unreadable artifact keeps whatever is loaded.
    pub fn reload(&self) -> ModelStatus {
        match self.repository.load() {
            Ok(Some(pipeline)) => {
                let metadata = pipeline.metadata();
                info!(
                    location = %self.repository.location(),
                    trained_at = %metadata.trained_at,
                    n_features = metadata.n_features,
                    "✅ Model loaded"
                );
                *self.pipeline.write() = Some(Arc::new(pipeline));
                MODEL_RELOADS_TOTAL.with_label_values(&["loaded"]).inc();
            }
            Ok(None) => {
                warn!(
                    location = %self.repository.location(),
                    "Model not found. Please train the model first."
                );
                MODEL_RELOADS_TOTAL.with_label_values(&["missing"]).inc();
            }
            Err(e) => {
                error!(location = %self.repository.location(), "Failed to load model: {}", e);
                MODEL_RELOADS_TOTAL.with_label_values(&["error"]).inc();
            }
        }

        let loaded = self.is_loaded();
        MODEL_LOADED.set(if loaded { 1.0 } else { 0.0 });
        ModelStatus::ok(loaded)
    }

    /// Score one request against the loaded pipeline
    pub fn predict(&self, request: PredictRequest) -> Result<PredictionResponse> {
        let record = request.into_record().map_err(|e| {
            PREDICTIONS_TOTAL.with_label_values(&["invalid"]).inc();
            e
        })?;

        let pipeline = self.current().ok_or_else(|| {
            PREDICTIONS_TOTAL.with_label_values(&["not_loaded"]).inc();
            AppError::ModelNotLoaded
        })?;

        let timer = Instant::now();
        let classification = pipeline.classify(&record).map_err(|e| {
            error!("Prediction failed: {}", e);
            PREDICTIONS_TOTAL.with_label_values(&["error"]).inc();
            AppError::Prediction(e.to_string())
        })?;
        PREDICTION_DURATION_SECONDS.observe(timer.elapsed().as_secs_f64());

        let confidence = classification.confidence();
        let outcome = if classification.is_false_alarm {
            "false_alarm"
        } else {
            "real_signalement"
        };
        PREDICTIONS_TOTAL.with_label_values(&[outcome]).inc();

        debug!(
            incident_type = %record.incident_type,
            urgency_level = %record.urgency_level,
            is_false_alarm = classification.is_false_alarm,
            confidence,
            "Scored signalement"
        );

        Ok(PredictionResponse {
            is_false_alarm: classification.is_false_alarm,
            confidence: percentage(confidence),
            probabilities: ProbabilityPercentages {
                real_signalement: percentage(classification.probabilities.real_signalement),
                false_alarm: percentage(classification.probabilities.false_alarm),
            },
            recommendation: recommendation(classification.is_false_alarm, confidence).to_string(),
        })
    }
}
