use crate::error::{AppError, Result};
use crate::models::{IncidentRecord, IncidentType, LabeledRecord, UrgencyLevel};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use validator::Validate;

/// Inline sample of labeled signalements.
///
/// A placeholder fixture: it says nothing about real-world class balance.
pub fn training_fixture() -> Vec<LabeledRecord> {
    use IncidentType::*;
    use UrgencyLevel::*;

    let rows: [(&str, IncidentType, UrgencyLevel, f64, bool); 15] = [
        ("Un enfant a été blessé gravement lors d'une bagarre avec un autre enfant", Violence, Critique, 85.0, false),
        ("Je pense que quelque chose ne va pas mais je ne suis pas sûr", Autre, Bas, 40.0, true),
        ("Un enfant montre des signes de négligence sévère, très maigre et sale", Negligence, Eleve, 75.0, false),
        ("Un enfant a dit qu'il n'aimait pas la nourriture", Autre, Bas, 20.0, true),
        ("Abus sexuel signalé par l'enfant lui-même avec des détails précis", AbusSexuel, Critique, 90.0, false),
        ("Je veux juste vérifier si tout va bien", Autre, Bas, 15.0, true),
        ("Un enfant s'est plaint d'un adulte qui le frappe régulièrement", Violence, Eleve, 80.0, false),
        ("Un adulte a crié sur un enfant", Violence, Moyen, 35.0, true),
        ("Un enfant manque souvent l'école et semble déprimé", Negligence, Moyen, 60.0, false),
        ("Rien de grave, juste une petite question", Autre, Bas, 10.0, true),
        ("Violence physique répétée avec traces visibles de coups", Violence, Critique, 95.0, false),
        ("Test du système", Autre, Bas, 5.0, true),
        ("Un enfant ne reçoit pas ses repas régulièrement et semble affamé", Negligence, Eleve, 78.0, false),
        ("Un enfant a pleuré aujourd'hui", Autre, Bas, 25.0, true),
        ("Abus verbal constant et humiliation publique d'un enfant", Violence, Eleve, 72.0, false),
    ];

    rows.into_iter()
        .map(|(description, incident_type, urgency_level, score, is_false_alarm)| {
            LabeledRecord::new(
                IncidentRecord::new(description, incident_type, urgency_level, score),
                is_false_alarm,
            )
        })
        .collect()
}

/// Column-split labeled dataset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingDataset {
    records: Vec<IncidentRecord>,
    labels: Vec<bool>,
}

impl TrainingDataset {
    /// Build a dataset, validating every record
    pub fn from_examples(examples: &[LabeledRecord]) -> Result<Self> {
        for (idx, example) in examples.iter().enumerate() {
            example.validate().map_err(|e| {
                AppError::Validation(format!("Training example {} is invalid: {}", idx, e))
            })?;
        }

        Ok(Self {
            records: examples.iter().map(|e| e.record.clone()).collect(),
            labels: examples.iter().map(|e| e.is_false_alarm).collect(),
        })
    }

    pub fn records(&self) -> &[IncidentRecord] {
        &self.records
    }

    pub fn labels(&self) -> &[bool] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of false alarm examples
    pub fn n_false_alarms(&self) -> usize {
        self.labels.iter().filter(|&&l| l).count()
    }

    /// Share of false alarms (0.0 for an empty dataset)
    pub fn false_alarm_ratio(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.n_false_alarms() as f64 / self.len() as f64
        }
    }

    /// Split into train/test sets, preserving the label ratio in both.
    ///
    /// `ceil(test_size * n)` rows go to the test set. Per-class test counts
    /// are proportional, remainders assigned by largest fractional part.
    pub fn stratified_split(
        &self,
        test_size: f64,
        seed: u64,
    ) -> Result<(TrainingDataset, TrainingDataset)> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(AppError::Configuration(format!(
                "test_size must be in (0, 1), got {}",
                test_size
            )));
        }

        let n_samples = self.len();
        let mut by_class: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
        for (idx, &label) in self.labels.iter().enumerate() {
            by_class[label as usize].push(idx);
        }

        if let Some(class) = by_class.iter().position(|rows| rows.len() < 2) {
            return Err(AppError::Training(format!(
                "The least populated class ({}) has fewer than 2 members",
                if class == 1 { "false alarm" } else { "genuine" }
            )));
        }

        let n_test = (test_size * n_samples as f64).ceil() as usize;
        if n_test < 2 || n_samples - n_test < 2 {
            return Err(AppError::Training(format!(
                "Cannot split {} samples into stratified sets with test_size {}",
                n_samples, test_size
            )));
        }

        let test_counts = allocate_test_counts(&by_class, n_samples, n_test);

        let mut rng = StdRng::seed_from_u64(seed);
        let mut train_idx = Vec::with_capacity(n_samples - n_test);
        let mut test_idx = Vec::with_capacity(n_test);

        for (members, &n_class_test) in by_class.iter().zip(test_counts.iter()) {
            let mut shuffled = members.clone();
            shuffled.shuffle(&mut rng);
            test_idx.extend_from_slice(&shuffled[..n_class_test]);
            train_idx.extend_from_slice(&shuffled[n_class_test..]);
        }

        train_idx.sort_unstable();
        test_idx.sort_unstable();

        Ok((self.subset(&train_idx), self.subset(&test_idx)))
    }

    fn subset(&self, indices: &[usize]) -> TrainingDataset {
        TrainingDataset {
            records: indices.iter().map(|&i| self.records[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

/// Per-class test counts summing to `n_test`; each class keeps a training row
fn allocate_test_counts(by_class: &[Vec<usize>; 2], n_samples: usize, n_test: usize) -> [usize; 2] {
    let exact: Vec<f64> = by_class
        .iter()
        .map(|rows| rows.len() as f64 * n_test as f64 / n_samples as f64)
        .collect();

    let mut counts = [exact[0].floor() as usize, exact[1].floor() as usize];
    let mut remaining = n_test - counts[0] - counts[1];

    let mut order = [0usize, 1];
    order.sort_by(|&a, &b| {
        let frac_a = exact[a] - exact[a].floor();
        let frac_b = exact[b] - exact[b].floor();
        frac_b
            .partial_cmp(&frac_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| by_class[b].len().cmp(&by_class[a].len()))
    });

    for &class in order.iter().cycle() {
        if remaining == 0 {
            break;
        }
        if counts[class] + 1 < by_class[class].len() {
            counts[class] += 1;
            remaining -= 1;
        }
    }

    counts
}
