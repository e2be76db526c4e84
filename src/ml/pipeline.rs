use crate::error::{AppError, Result};
use crate::ml::classifier::{RandomForestClassifier, FALSE_ALARM, GENUINE};
use crate::ml::dataset::TrainingDataset;
use crate::ml::features::FeatureExtractor;
use crate::ml::models::{
    ClassProbabilities, Classification, ModelMetadata, ModelMetrics, TrainingConfig,
};
use crate::models::IncidentRecord;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Feature extraction and forest, fit together and persisted as one artifact.
///
/// The extractor fit at training time is the one used at inference.
#[derive(Debug, Serialize, Deserialize)]
pub struct FalseAlarmPipeline {
    features: FeatureExtractor,
    classifier: RandomForestClassifier,
    metadata: ModelMetadata,
}

impl FalseAlarmPipeline {
    /// Fit a fresh pipeline on the given dataset
    pub fn fit(dataset: &TrainingDataset, config: &TrainingConfig) -> Result<Self> {
        let mut features = FeatureExtractor::new(&config.features);
        let x = features.fit_transform(dataset.records())?;

        let mut classifier = RandomForestClassifier::new(config.forest.clone());
        classifier.fit(&x, dataset.labels())?;

        let mut pipeline = Self {
            metadata: ModelMetadata {
                name: "False Alarm Random Forest".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                trained_at: chrono::Utc::now(),
                n_training_samples: dataset.len(),
                n_features: features.n_features(),
                vocab_size: features.vocab_size(),
                training_metrics: ModelMetrics::new(),
                validation_metrics: None,
                hyperparameters: hyperparameters(config),
            },
            features,
            classifier,
        };

        pipeline.metadata.training_metrics = pipeline.evaluate(dataset)?;

        Ok(pipeline)
    }

    /// Feature matrix for a batch of records
    pub fn transform(&self, records: &[IncidentRecord]) -> Result<Array2<f64>> {
        self.features.transform_batch(records)
    }

    /// Labels for a batch; `true` means false alarm
    pub fn predict(&self, records: &[IncidentRecord]) -> Result<Vec<bool>> {
        self.classifier.predict(&self.transform(records)?)
    }

    /// `[genuine, false_alarm]` probabilities for a batch
    pub fn predict_proba(&self, records: &[IncidentRecord]) -> Result<Array2<f64>> {
        self.classifier.predict_proba(&self.transform(records)?)
    }

    /// Score a single record
    pub fn classify(&self, record: &IncidentRecord) -> Result<Classification> {
        let proba = self.predict_proba(std::slice::from_ref(record))?;
        if proba.nrows() != 1 {
            return Err(AppError::Internal(format!(
                "Expected one probability row, got {}",
                proba.nrows()
            )));
        }

        let probabilities = ClassProbabilities {
            real_signalement: proba[[0, GENUINE]],
            false_alarm: proba[[0, FALSE_ALARM]],
        };

        Ok(Classification {
            is_false_alarm: probabilities.false_alarm > probabilities.real_signalement,
            probabilities,
        })
    }

    /// Full binary metrics on a labeled dataset
    pub fn evaluate(&self, dataset: &TrainingDataset) -> Result<ModelMetrics> {
        if dataset.is_empty() {
            return Ok(ModelMetrics::new());
        }
        let predictions = self.predict(dataset.records())?;
        Ok(ModelMetrics::calculate(dataset.labels(), &predictions))
    }

    pub(crate) fn set_validation_metrics(&mut self, metrics: ModelMetrics) {
        self.metadata.validation_metrics = Some(metrics);
    }

    /// Serialize into the opaque artifact format
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Restore a pipeline from artifact bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let pipeline: Self = bincode::deserialize(bytes)?;
        if !pipeline.classifier.is_trained() || !pipeline.features.is_fitted() {
            return Err(AppError::Serialization(
                "Artifact does not contain a fitted pipeline".to_string(),
            ));
        }
        Ok(pipeline)
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

fn hyperparameters(config: &TrainingConfig) -> BTreeMap<String, String> {
    [
        ("max_features", config.features.max_features.to_string()),
        (
            "ngram_range",
            format!("{}-{}", config.features.ngram_range.0, config.features.ngram_range.1),
        ),
        ("n_estimators", config.forest.n_estimators.to_string()),
        ("max_depth", config.forest.max_depth.to_string()),
        ("seed", config.forest.seed.to_string()),
        ("class_weight", format!("{:?}", config.forest.class_weight).to_lowercase()),
        ("feature_fraction", config.forest.feature_fraction.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}
