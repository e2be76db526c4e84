/// Machine learning for false-alarm classification
///
/// This module provides:
/// - Feature extraction (TF-IDF over descriptions, one-hot categories, score passthrough)
/// - A seeded random forest over smartcore decision trees
/// - Stratified dataset splitting and offline training
/// - Artifact persistence and the request-time predictor service

pub mod classifier;
pub mod dataset;
pub mod features;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod service;
pub mod trainer;

pub use classifier::RandomForestClassifier;
pub use dataset::{training_fixture, TrainingDataset};
pub use features::{FeatureExtractor, OneHotEncoder, TfidfVectorizer};
pub use models::{
    ClassProbabilities, ClassWeight, Classification, FeatureConfig, ForestConfig, ModelMetadata,
    ModelMetrics, TrainingConfig, TrainingReport,
};
pub use pipeline::FalseAlarmPipeline;
pub use repository::{
    read_feature_info, FileModelRepository, InMemoryModelRepository, ModelRepository,
};
pub use service::{
    recommendation, ConfidenceBand, ModelStatus, PredictRequest, PredictionResponse,
    PredictorService, ProbabilityPercentages,
};
pub use trainer::{Trainer, TrainingState};
