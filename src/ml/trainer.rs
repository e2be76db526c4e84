use crate::error::{AppError, Result};
use crate::ml::dataset::TrainingDataset;
use crate::ml::models::{TrainingConfig, TrainingReport};
use crate::ml::pipeline::FalseAlarmPipeline;
use crate::ml::repository::{ModelRepository, StagedFile};
use crate::models::{FeatureInfo, LabeledRecord};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use strum::Display;
use tracing::{error, info, warn};

/// Lifecycle of a training run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum TrainingState {
    Idle,
    Fitting,
    Persisted,
}

/// Offline trainer: split, fit, evaluate, persist
pub struct Trainer {
    config: TrainingConfig,
    repository: Arc<dyn ModelRepository>,
    feature_info_path: Option<PathBuf>,
    state: TrainingState,
}

impl Trainer {
    pub fn new(config: TrainingConfig, repository: Arc<dyn ModelRepository>) -> Self {
        Self {
            config,
            repository,
            feature_info_path: None,
            state: TrainingState::Idle,
        }
    }

    /// Also write the closed-vocabulary document on success
    pub fn with_feature_info_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.feature_info_path = Some(path.into());
        self
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    /// Run a full training pass over `examples`.
    ///
    /// Nothing is persisted unless fitting and evaluation both succeed; on
    /// failure the trainer returns to `Idle`.
    pub fn run(&mut self, examples: &[LabeledRecord]) -> Result<TrainingReport> {
        if self.state == TrainingState::Fitting {
            return Err(AppError::Training("A training run is already in progress".to_string()));
        }

        self.state = TrainingState::Fitting;
        match self.fit_and_persist(examples) {
            Ok(report) => {
                self.state = TrainingState::Persisted;
                Ok(report)
            }
            Err(e) => {
                error!("Training failed: {}", e);
                self.state = TrainingState::Idle;
                Err(e)
            }
        }
    }

    fn fit_and_persist(&self, examples: &[LabeledRecord]) -> Result<TrainingReport> {
        let started = Instant::now();
        let dataset = TrainingDataset::from_examples(examples)?;
        info!(
            false_alarm_ratio = dataset.false_alarm_ratio(),
            "Starting model training on {} examples ({} false alarms)",
            dataset.len(),
            dataset.n_false_alarms()
        );

        let (train, test) = dataset.stratified_split(self.config.test_size, self.config.seed)?;
        info!("Split dataset: {} train / {} test", train.len(), test.len());

        let mut pipeline = FalseAlarmPipeline::fit(&train, &self.config)?;

        let train_metrics = pipeline.metadata().training_metrics.clone();
        let test_metrics = pipeline.evaluate(&test)?;
        pipeline.set_validation_metrics(test_metrics.clone());

        for (partition, metrics) in [("Training", &train_metrics), ("Testing", &test_metrics)] {
            info!(
                precision = metrics.precision,
                recall = metrics.recall,
                f1_score = metrics.f1_score,
                confusion_matrix = ?metrics.confusion_matrix,
                "{} accuracy: {:.2}%",
                partition,
                metrics.accuracy * 100.0
            );
        }

        // Feature info is staged before the model is saved and committed after;
        // a failed commit rolls the model back
        let feature_info = serde_json::to_vec_pretty(&FeatureInfo::closed_vocabularies())?;
        let staged_info = match &self.feature_info_path {
            Some(path) => Some((path, StagedFile::write(path, &feature_info)?)),
            None => None,
        };

        let previous = match staged_info {
            Some(_) => self.repository.load().unwrap_or_else(|e| {
                warn!("Previous model is unreadable and will not be restored: {}", e);
                None
            }),
            None => None,
        };

        self.repository.save(&pipeline)?;
        info!("Model saved to {}", self.repository.location());

        if let Some((path, staged)) = staged_info {
            if let Err(e) = staged.commit() {
                self.restore(previous);
                return Err(e);
            }
            info!("Feature info saved to {}", path.display());
        }

        let metadata = pipeline.metadata();
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            n_features = metadata.n_features,
            vocab_size = metadata.vocab_size,
            "✅ Model training complete"
        );

        Ok(TrainingReport {
            n_train: train.len(),
            n_test: test.len(),
            n_features: metadata.n_features,
            vocab_size: metadata.vocab_size,
            train_metrics,
            test_metrics,
        })
    }

    /// Put back the model that was stored before this run
    fn restore(&self, previous: Option<FalseAlarmPipeline>) {
        let result = match &previous {
            Some(pipeline) => self.repository.save(pipeline),
            None => self.repository.remove(),
        };

        if let Err(e) = result {
            error!(
                "Failed to roll back model at {}: {}",
                self.repository.location(),
                e
            );
        }
    }
}
