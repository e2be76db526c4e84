use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Feature extraction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Maximum vocabulary size for text features
    #[serde(default = "default_max_features")]
    pub max_features: usize,

    /// N-gram range (min, max)
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            max_features: default_max_features(),
            ngram_range: default_ngram_range(),
        }
    }
}

/// How tree bootstraps treat the label distribution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
    /// Draw the same number of rows from each class
    #[default]
    Balanced,

    /// Keep the observed class proportions
    None,
}

/// Random forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,

    /// Depth cap for every tree
    #[serde(default = "default_max_depth")]
    pub max_depth: u16,

    /// Base seed; tree `i` uses `seed + i`
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default)]
    pub class_weight: ClassWeight,

    /// Share of feature columns each tree is allowed to split on
    #[serde(default = "default_feature_fraction")]
    pub feature_fraction: f64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: default_max_depth(),
            seed: default_seed(),
            class_weight: ClassWeight::default(),
            feature_fraction: default_feature_fraction(),
        }
    }
}

/// Training run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Share of the dataset held out for evaluation
    #[serde(default = "default_test_size")]
    pub test_size: f64,

    /// Seed for the stratified split
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default)]
    pub features: FeatureConfig,

    #[serde(default)]
    pub forest: ForestConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: default_test_size(),
            seed: default_seed(),
            features: FeatureConfig::default(),
            forest: ForestConfig::default(),
        }
    }
}

/// Class probabilities for one record (each in 0.0 - 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub real_signalement: f64,
    pub false_alarm: f64,
}

/// Outcome of scoring a single record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub is_false_alarm: bool,
    pub probabilities: ClassProbabilities,
}

impl Classification {
    /// Probability of the predicted class
    pub fn confidence(&self) -> f64 {
        if self.is_false_alarm {
            self.probabilities.false_alarm
        } else {
            self.probabilities.real_signalement
        }
    }
}

/// Binary evaluation metrics, with "false alarm" as the positive class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,

    /// `[[tn, fp], [fn, tp]]`
    pub confusion_matrix: [[usize; 2]; 2],

    pub support: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            confusion_matrix: [[0, 0], [0, 0]],
            support: 0,
        }
    }

    /// Compute metrics from true and predicted labels
    pub fn calculate(y_true: &[bool], y_pred: &[bool]) -> Self {
        let n_samples = y_true.len().min(y_pred.len());
        if n_samples == 0 {
            return Self::new();
        }

        let mut matrix = [[0usize; 2]; 2];
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            matrix[t as usize][p as usize] += 1;
        }

        let tp = matrix[1][1];
        let fp = matrix[0][1];
        let fn_count = matrix[1][0];
        let correct = matrix[0][0] + tp;

        let precision = if tp + fp > 0 {
            tp as f64 / (tp + fp) as f64
        } else {
            0.0
        };

        let recall = if tp + fn_count > 0 {
            tp as f64 / (tp + fn_count) as f64
        } else {
            0.0
        };

        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            accuracy: correct as f64 / n_samples as f64,
            precision,
            recall,
            f1_score,
            confusion_matrix: matrix,
            support: n_samples,
        }
    }
}

impl Default for ModelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata stored inside the persisted pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,

    /// Crate version that produced the artifact
    pub version: String,

    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,

    pub n_training_samples: usize,
    pub n_features: usize,
    pub vocab_size: usize,

    pub training_metrics: ModelMetrics,
    pub validation_metrics: Option<ModelMetrics>,

    pub hyperparameters: BTreeMap<String, String>,
}

/// Summary of a completed training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub n_train: usize,
    pub n_test: usize,
    pub n_features: usize,
    pub vocab_size: usize,
    pub train_metrics: ModelMetrics,
    pub test_metrics: ModelMetrics,
}

impl TrainingReport {
    pub fn train_accuracy(&self) -> f64 {
        self.train_metrics.accuracy
    }

    pub fn test_accuracy(&self) -> f64 {
        self.test_metrics.accuracy
    }
}

fn default_max_features() -> usize {
    100
}

fn default_ngram_range() -> (usize, usize) {
    (1, 2) // Unigrams and bigrams
}

fn default_n_estimators() -> usize {
    100
}

fn default_max_depth() -> u16 {
    10
}

fn default_seed() -> u64 {
    42
}

fn default_feature_fraction() -> f64 {
    0.7
}

fn default_test_size() -> f64 {
    0.2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.test_size, 0.2);
        assert_eq!(config.seed, 42);
        assert_eq!(config.features.max_features, 100);
        assert_eq!(config.features.ngram_range, (1, 2));
        assert_eq!(config.forest.n_estimators, 100);
        assert_eq!(config.forest.max_depth, 10);
        assert_eq!(config.forest.class_weight, ClassWeight::Balanced);
    }

    #[test]
    fn test_metrics_calculation() {
        let y_true = [true, true, false, false, true];
        let y_pred = [true, false, false, true, true];

        let metrics = ModelMetrics::calculate(&y_true, &y_pred);

        assert_eq!(metrics.support, 5);
        assert_eq!(metrics.confusion_matrix, [[1, 1], [1, 2]]);
        assert!((metrics.accuracy - 0.6).abs() < 1e-9);
        assert!((metrics.precision - 2.0 / 3.0).abs() < 1e-9);
        assert!((metrics.recall - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_empty() {
        let metrics = ModelMetrics::calculate(&[], &[]);
        assert_eq!(metrics, ModelMetrics::new());
    }

    #[test]
    fn test_classification_confidence() {
        let classification = Classification {
            is_false_alarm: false,
            probabilities: ClassProbabilities {
                real_signalement: 0.73,
                false_alarm: 0.27,
            },
        };
        assert_eq!(classification.confidence(), 0.73);
    }

    #[test]
    fn test_class_weight_serde() {
        let weight: ClassWeight = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(weight, ClassWeight::None);
        assert_eq!(
            serde_json::to_string(&ClassWeight::Balanced).unwrap(),
            "\"balanced\""
        );
    }
}
