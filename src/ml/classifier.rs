use crate::error::{AppError, Result};
use crate::ml::models::{ClassWeight, ForestConfig};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters, SplitCriterion,
};

/// Class index for genuine signalements
pub const GENUINE: usize = 0;

/// Class index for false alarms
pub const FALSE_ALARM: usize = 1;

const N_CLASSES: usize = 2;

type Tree = DecisionTreeClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;

/// One ensemble member: a CART tree restricted to a subset of columns
#[derive(Serialize, Deserialize)]
struct VotingTree {
    /// Columns of the full feature matrix this tree was fit on
    features: Vec<usize>,

    model: Tree,
}

impl VotingTree {
    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let subset = x.select(Axis(1), &self.features);
        let predictions = self
            .model
            .predict(&ndarray_to_densematrix(&subset))
            .map_err(|e| AppError::Internal(format!("Prediction failed: {}", e)))?;

        Ok(predictions.iter().map(|&p| p as usize).collect())
    }
}

/// Random forest binary classifier.
///
/// Every tree is fit on a class-aware bootstrap of the training rows and a
/// random subset of the columns; probabilities are the share of tree votes.
#[derive(Serialize, Deserialize)]
pub struct RandomForestClassifier {
    config: ForestConfig,
    trees: Vec<VotingTree>,
    n_features: usize,
}

impl RandomForestClassifier {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    /// Fit the forest from scratch, discarding any previous trees
    pub fn fit(&mut self, features: &Array2<f64>, labels: &[bool]) -> Result<()> {
        let (n_samples, n_features) = features.dim();

        if n_samples != labels.len() {
            return Err(AppError::Training(format!(
                "Feature rows ({}) and labels ({}) differ in length",
                n_samples,
                labels.len()
            )));
        }
        if n_features == 0 {
            return Err(AppError::Training("No feature columns to fit on".to_string()));
        }
        if self.config.n_estimators == 0 {
            return Err(AppError::Configuration(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if !(self.config.feature_fraction > 0.0 && self.config.feature_fraction <= 1.0) {
            return Err(AppError::Configuration(format!(
                "feature_fraction must be in (0, 1], got {}",
                self.config.feature_fraction
            )));
        }

        let mut by_class: [Vec<usize>; N_CLASSES] = [Vec::new(), Vec::new()];
        for (idx, &label) in labels.iter().enumerate() {
            by_class[label as usize].push(idx);
        }
        if by_class.iter().any(|rows| rows.is_empty()) {
            return Err(AppError::Training(
                "Training data must contain both genuine and false alarm examples".to_string(),
            ));
        }

        let max_features =
            ((self.config.feature_fraction * n_features as f64).round() as usize).clamp(1, n_features);
        let y: Vec<i32> = labels.iter().map(|&l| l as i32).collect();
        let config = &self.config;

        let trees = (0..config.n_estimators)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(i as u64));
                fit_tree(features, &y, &by_class, max_features, config, &mut rng)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.n_features = n_features;

        Ok(())
    }

    /// Predict class probabilities, one `[genuine, false_alarm]` row per sample
    pub fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_trained() {
            return Err(AppError::Internal("Model not trained".to_string()));
        }
        if features.ncols() != self.n_features {
            return Err(AppError::Internal(format!(
                "Expected {} features, got {}",
                self.n_features,
                features.ncols()
            )));
        }

        let mut votes = Array2::<f64>::zeros((features.nrows(), N_CLASSES));
        for tree in &self.trees {
            for (row, class) in tree.predict(features)?.into_iter().enumerate() {
                if class < N_CLASSES {
                    votes[[row, class]] += 1.0;
                }
            }
        }

        Ok(votes / self.trees.len() as f64)
    }

    /// Predict labels; `true` means false alarm
    pub fn predict(&self, features: &Array2<f64>) -> Result<Vec<bool>> {
        let proba = self.predict_proba(features)?;
        Ok(proba
            .outer_iter()
            .map(|row| row[FALSE_ALARM] > row[GENUINE])
            .collect())
    }

    pub fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }
}

impl std::fmt::Debug for RandomForestClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomForestClassifier")
            .field("config", &self.config)
            .field("n_trees", &self.trees.len())
            .field("n_features", &self.n_features)
            .finish()
    }
}

fn fit_tree(
    features: &Array2<f64>,
    y: &[i32],
    by_class: &[Vec<usize>; N_CLASSES],
    max_features: usize,
    config: &ForestConfig,
    rng: &mut StdRng,
) -> Result<VotingTree> {
    let rows = bootstrap_rows(by_class, y.len(), config.class_weight, rng);

    let mut columns = sample(rng, features.ncols(), max_features).into_vec();
    columns.sort_unstable();

    let x = features.select(Axis(0), &rows).select(Axis(1), &columns);
    let y_boot: Vec<i32> = rows.iter().map(|&r| y[r]).collect();

    let params = DecisionTreeClassifierParameters::default()
        .with_max_depth(config.max_depth)
        .with_criterion(SplitCriterion::Gini);

    let model = DecisionTreeClassifier::fit(&ndarray_to_densematrix(&x), &y_boot, params)
        .map_err(|e| AppError::Training(format!("Failed to train decision tree: {}", e)))?;

    Ok(VotingTree {
        features: columns,
        model,
    })
}

/// Draw a bootstrap sample that always contains both classes.
///
/// `Balanced` draws `n / 2` rows per class, `None` keeps each class's share.
fn bootstrap_rows(
    by_class: &[Vec<usize>; N_CLASSES],
    n_samples: usize,
    class_weight: ClassWeight,
    rng: &mut StdRng,
) -> Vec<usize> {
    let mut rows = Vec::with_capacity(n_samples);

    for (class, members) in by_class.iter().enumerate() {
        let draws = match class_weight {
            ClassWeight::Balanced => {
                if class == GENUINE {
                    n_samples.div_ceil(N_CLASSES)
                } else {
                    n_samples / N_CLASSES
                }
            }
            ClassWeight::None => members.len(),
        }
        .max(1);

        for _ in 0..draws {
            rows.push(members[rng.gen_range(0..members.len())]);
        }
    }

    rows
}

fn ndarray_to_densematrix(arr: &Array2<f64>) -> DenseMatrix<f64> {
    let shape = arr.shape();
    let data: Vec<f64> = arr.iter().copied().collect();
    DenseMatrix::new(shape[0], shape[1], data, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_data() -> (Array2<f64>, Vec<bool>) {
        // Second column separates the classes, first one is noise
        let rows = 40;
        let mut data = Vec::with_capacity(rows * 2);
        let mut labels = Vec::with_capacity(rows);
        for i in 0..rows {
            let is_false_alarm = i % 3 == 0;
            data.push((i % 7) as f64);
            data.push(if is_false_alarm { 10.0 + (i % 5) as f64 } else { 80.0 + (i % 5) as f64 });
            labels.push(is_false_alarm);
        }
        (Array2::from_shape_vec((rows, 2), data).unwrap(), labels)
    }

    fn small_config() -> ForestConfig {
        ForestConfig {
            n_estimators: 15,
            feature_fraction: 1.0,
            ..ForestConfig::default()
        }
    }

    #[test]
    fn test_forest_learns_separable_data() {
        let (x, y) = create_test_data();
        let mut forest = RandomForestClassifier::new(small_config());

        assert!(!forest.is_trained());
        forest.fit(&x, &y).unwrap();

        assert!(forest.is_trained());
        assert_eq!(forest.n_trees(), 15);
        assert_eq!(forest.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = create_test_data();
        let mut forest = RandomForestClassifier::new(ForestConfig {
            n_estimators: 20,
            ..ForestConfig::default()
        });
        forest.fit(&x, &y).unwrap();

        let proba = forest.predict_proba(&x).unwrap();
        assert_eq!(proba.shape(), &[40, 2]);
        for row in proba.outer_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = create_test_data();
        let mut first = RandomForestClassifier::new(ForestConfig::default());
        let mut second = RandomForestClassifier::new(ForestConfig::default());

        first.fit(&x, &y).unwrap();
        second.fit(&x, &y).unwrap();

        assert_eq!(
            first.predict_proba(&x).unwrap(),
            second.predict_proba(&x).unwrap()
        );
    }

    #[test]
    fn test_balanced_bootstrap_draws_both_classes_equally() {
        let by_class = [vec![0, 1, 2, 3, 4, 5, 6, 7, 8], vec![9]];
        let mut rng = StdRng::seed_from_u64(7);

        let rows = bootstrap_rows(&by_class, 10, ClassWeight::Balanced, &mut rng);

        assert_eq!(rows.len(), 10);
        assert_eq!(rows.iter().filter(|&&r| r == 9).count(), 5);
    }

    #[test]
    fn test_unweighted_bootstrap_keeps_proportions() {
        let by_class = [vec![0, 1, 2, 3, 4, 5, 6, 7, 8], vec![9]];
        let mut rng = StdRng::seed_from_u64(7);

        let rows = bootstrap_rows(&by_class, 10, ClassWeight::None, &mut rng);

        assert_eq!(rows.len(), 10);
        assert_eq!(rows.iter().filter(|&&r| r == 9).count(), 1);
    }

    #[test]
    fn test_single_class_is_rejected() {
        let x = Array2::from_shape_vec((3, 1), vec![1.0, 2.0, 3.0]).unwrap();
        let mut forest = RandomForestClassifier::new(small_config());

        assert!(forest.fit(&x, &[true, true, true]).is_err());
    }

    #[test]
    fn test_label_length_mismatch_is_rejected() {
        let x = Array2::from_shape_vec((3, 1), vec![1.0, 2.0, 3.0]).unwrap();
        let mut forest = RandomForestClassifier::new(small_config());

        assert!(forest.fit(&x, &[true, false]).is_err());
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let forest = RandomForestClassifier::new(small_config());
        let x = Array2::zeros((1, 2));
        assert!(forest.predict_proba(&x).is_err());
    }

    #[test]
    fn test_feature_count_mismatch_fails() {
        let (x, y) = create_test_data();
        let mut forest = RandomForestClassifier::new(small_config());
        forest.fit(&x, &y).unwrap();

        assert!(forest.predict(&Array2::zeros((1, 3))).is_err());
    }

    #[test]
    fn test_serialization_roundtrip_preserves_votes() {
        let (x, y) = create_test_data();
        let mut forest = RandomForestClassifier::new(small_config());
        forest.fit(&x, &y).unwrap();

        let bytes = bincode::serialize(&forest).unwrap();
        let restored: RandomForestClassifier = bincode::deserialize(&bytes).unwrap();

        assert_eq!(
            forest.predict_proba(&x).unwrap(),
            restored.predict_proba(&x).unwrap()
        );
    }
}
