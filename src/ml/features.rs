use crate::error::{AppError, Result};
use crate::ml::models::FeatureConfig;
use crate::models::IncidentRecord;
use lazy_static::lazy_static;
use ndarray::Array2;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

lazy_static! {
    /// Words of two or more Unicode word characters
    static ref TOKEN_PATTERN: Regex =
        Regex::new(r"\b\w\w+\b").expect("token pattern is a valid regex");
}

/// TF-IDF vectorizer over word n-grams
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    /// Maximum vocabulary size
    max_features: usize,

    /// N-gram range (min, max)
    ngram_range: (usize, usize),

    /// Vocabulary mapping (term -> column)
    vocabulary: BTreeMap<String, usize>,

    /// Smoothed inverse document frequency per column
    idf: Vec<f64>,

    is_fitted: bool,
}

impl TfidfVectorizer {
    pub fn new(max_features: usize, ngram_range: (usize, usize)) -> Self {
        Self {
            max_features,
            ngram_range,
            vocabulary: BTreeMap::new(),
            idf: Vec::new(),
            is_fitted: false,
        }
    }

    /// Learn the vocabulary and IDF weights from a corpus
    pub fn fit<S: AsRef<str>>(&mut self, documents: &[S]) -> Result<()> {
        let (min_n, max_n) = self.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(AppError::Configuration(format!(
                "Invalid n-gram range ({}, {})",
                min_n, max_n
            )));
        }

        let mut term_counts: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for document in documents {
            let terms = self.extract_terms(document.as_ref());
            let unique_terms: HashSet<&String> = terms.iter().collect();

            for term in unique_terms {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            for term in terms {
                *term_counts.entry(term).or_insert(0) += 1;
            }
        }

        // Keep the most frequent terms, ties broken alphabetically
        let mut ranked: Vec<(String, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.max_features);

        let selected: BTreeSet<String> = ranked.into_iter().map(|(term, _)| term).collect();

        self.vocabulary = selected
            .into_iter()
            .enumerate()
            .map(|(idx, term)| (term, idx))
            .collect();

        let n_docs = documents.len() as f64;
        let mut idf = vec![0.0; self.vocabulary.len()];
        for (term, &idx) in &self.vocabulary {
            let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
            idf[idx] = ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0;
        }
        self.idf = idf;
        self.is_fitted = true;

        Ok(())
    }

    /// L2-normalised TF-IDF row for one document
    pub fn transform(&self, document: &str) -> Result<Vec<f64>> {
        if !self.is_fitted {
            return Err(AppError::Internal(
                "TfidfVectorizer must be fitted before transform".to_string(),
            ));
        }

        let mut row = vec![0.0; self.vocabulary.len()];
        for term in self.extract_terms(document) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                row[idx] += 1.0;
            }
        }

        for (value, idf) in row.iter_mut().zip(self.idf.iter()) {
            *value *= idf;
        }

        let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            row.iter_mut().for_each(|v| *v /= norm);
        }

        Ok(row)
    }

    /// Lowercase, tokenize and expand into n-grams
    fn extract_terms(&self, text: &str) -> Vec<String> {
        let text = text.to_lowercase();
        let words: Vec<&str> = TOKEN_PATTERN.find_iter(&text).map(|m| m.as_str()).collect();

        let mut terms = Vec::new();
        for n in self.ngram_range.0..=self.ngram_range.1 {
            for window in words.windows(n) {
                terms.push(window.join(" "));
            }
        }
        terms
    }

    pub fn vocab_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.vocabulary.contains_key(term)
    }

    /// Terms in column order
    pub fn terms(&self) -> Vec<&str> {
        // BTreeMap iteration is alphabetical, which is also column order
        self.vocabulary.keys().map(String::as_str).collect()
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}

/// One-hot encoder for a single categorical column.
///
/// Categories unseen during `fit` encode to an all-zero block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OneHotEncoder {
    categories: Vec<String>,
    is_fitted: bool,
}

impl OneHotEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit<S: AsRef<str>>(&mut self, values: &[S]) {
        let unique: BTreeSet<&str> = values.iter().map(|v| v.as_ref()).collect();
        self.categories = unique.into_iter().map(str::to_string).collect();
        self.is_fitted = true;
    }

    pub fn transform(&self, value: &str) -> Result<Vec<f64>> {
        if !self.is_fitted {
            return Err(AppError::Internal(
                "OneHotEncoder must be fitted before transform".to_string(),
            ));
        }

        let mut row = vec![0.0; self.categories.len()];
        if let Ok(idx) = self.categories.binary_search_by(|c| c.as_str().cmp(value)) {
            row[idx] = 1.0;
        }
        Ok(row)
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn n_columns(&self) -> usize {
        self.categories.len()
    }
}

/// Column transformer turning incident records into a dense feature matrix.
///
/// Column layout: description TF-IDF, incident type one-hot, urgency level
/// one-hot, suspicion score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureExtractor {
    text: TfidfVectorizer,
    incident_type: OneHotEncoder,
    urgency_level: OneHotEncoder,
    n_features: usize,
    is_fitted: bool,
}

impl FeatureExtractor {
    /// Create a new feature extractor
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            text: TfidfVectorizer::new(config.max_features, config.ngram_range),
            incident_type: OneHotEncoder::new(),
            urgency_level: OneHotEncoder::new(),
            n_features: 0,
            is_fitted: false,
        }
    }

    /// Fit every column transformer on the training records
    pub fn fit(&mut self, records: &[IncidentRecord]) -> Result<()> {
        if records.is_empty() {
            return Err(AppError::Training(
                "Cannot fit features on an empty dataset".to_string(),
            ));
        }

        let descriptions: Vec<&str> = records.iter().map(|r| r.description.as_str()).collect();
        let incident_types: Vec<&str> = records.iter().map(|r| r.incident_type.as_str()).collect();
        let urgency_levels: Vec<&str> = records.iter().map(|r| r.urgency_level.as_str()).collect();

        self.text.fit(&descriptions[..])?;
        self.incident_type.fit(&incident_types[..]);
        self.urgency_level.fit(&urgency_levels[..]);

        self.n_features = self.text.vocab_size()
            + self.incident_type.n_columns()
            + self.urgency_level.n_columns()
            + 1; // ai_suspicion_score
        self.is_fitted = true;

        Ok(())
    }

    /// Transform a single record into a feature row
    pub fn transform(&self, record: &IncidentRecord) -> Result<Vec<f64>> {
        if !self.is_fitted {
            return Err(AppError::Internal(
                "FeatureExtractor must be fitted before transform".to_string(),
            ));
        }

        let mut features = Vec::with_capacity(self.n_features);
        features.extend(self.text.transform(&record.description)?);
        features.extend(self.incident_type.transform(&record.incident_type)?);
        features.extend(self.urgency_level.transform(&record.urgency_level)?);
        features.push(record.ai_suspicion_score);

        Ok(features)
    }

    /// Transform a batch of records into an `n_records x n_features` matrix
    pub fn transform_batch(&self, records: &[IncidentRecord]) -> Result<Array2<f64>> {
        let mut data = Vec::with_capacity(records.len() * self.n_features);
        for record in records {
            data.extend(self.transform(record)?);
        }

        Array2::from_shape_vec((records.len(), self.n_features), data)
            .map_err(|e| AppError::Internal(format!("Failed to create feature array: {}", e)))
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, records: &[IncidentRecord]) -> Result<Array2<f64>> {
        self.fit(records)?;
        self.transform_batch(records)
    }

    /// Human-readable column names, in column order
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .text
            .terms()
            .into_iter()
            .map(|t| format!("description:{}", t))
            .collect();
        names.extend(
            self.incident_type
                .categories()
                .iter()
                .map(|c| format!("incidentType={}", c)),
        );
        names.extend(
            self.urgency_level
                .categories()
                .iter()
                .map(|c| format!("urgencyLevel={}", c)),
        );
        names.push("aiSuspicionScore".to_string());
        names
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn vocab_size(&self) -> usize {
        self.text.vocab_size()
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IncidentType, UrgencyLevel};

    fn sample_records() -> Vec<IncidentRecord> {
        vec![
            IncidentRecord::new(
                "Violence physique répétée avec traces visibles de coups",
                IncidentType::Violence,
                UrgencyLevel::Critique,
                95.0,
            ),
            IncidentRecord::new("Test du système", IncidentType::Autre, UrgencyLevel::Bas, 5.0),
            IncidentRecord::new(
                "Un enfant a pleuré aujourd'hui",
                IncidentType::Autre,
                UrgencyLevel::Bas,
                25.0,
            ),
        ]
    }

    #[test]
    fn test_tfidf_unigrams_and_bigrams() {
        let mut vectorizer = TfidfVectorizer::new(100, (1, 2));
        vectorizer
            .fit(&["Un enfant a pleuré", "un enfant triste"])
            .unwrap();

        // "a" is a single character and never becomes a token
        assert!(!vectorizer.contains("a"));
        assert!(vectorizer.contains("enfant"));
        assert!(vectorizer.contains("un enfant"));
        assert!(vectorizer.contains("pleuré"));
        assert!(vectorizer.contains("enfant pleuré"));
    }

    #[test]
    fn test_tfidf_max_features_keeps_most_frequent() {
        let mut vectorizer = TfidfVectorizer::new(2, (1, 1));
        vectorizer
            .fit(&["enfant enfant école", "enfant repas", "repas"])
            .unwrap();

        assert_eq!(vectorizer.vocab_size(), 2);
        assert!(vectorizer.contains("enfant"));
        assert!(vectorizer.contains("repas"));
        assert!(!vectorizer.contains("école"));
    }

    #[test]
    fn test_tfidf_rows_are_l2_normalised() {
        let mut vectorizer = TfidfVectorizer::new(100, (1, 2));
        vectorizer
            .fit(&["abus verbal constant", "abus sexuel signalé"])
            .unwrap();

        let row = vectorizer.transform("abus verbal").unwrap();
        let norm: f64 = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);

        let empty = vectorizer.transform("rien").unwrap();
        assert!(empty.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_tfidf_rare_terms_weigh_more() {
        let mut vectorizer = TfidfVectorizer::new(100, (1, 1));
        vectorizer
            .fit(&["enfant blessé", "enfant affamé", "enfant déprimé"])
            .unwrap();

        let terms = vectorizer.terms();
        let row = vectorizer.transform("enfant blessé").unwrap();
        let enfant = row[terms.iter().position(|t| *t == "enfant").unwrap()];
        let blesse = row[terms.iter().position(|t| *t == "blessé").unwrap()];
        assert!(blesse > enfant);
    }

    #[test]
    fn test_invalid_ngram_range() {
        let mut vectorizer = TfidfVectorizer::new(10, (2, 1));
        assert!(vectorizer.fit(&["texte"]).is_err());
    }

    #[test]
    fn test_one_hot_unknown_category_is_all_zero() {
        let mut encoder = OneHotEncoder::new();
        encoder.fit(&["VIOLENCE", "AUTRE", "VIOLENCE"]);

        assert_eq!(encoder.categories(), &["AUTRE", "VIOLENCE"]);
        assert_eq!(encoder.transform("VIOLENCE").unwrap(), vec![0.0, 1.0]);
        assert_eq!(encoder.transform("INCENDIE").unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_feature_extractor_layout() {
        let records = sample_records();
        let mut extractor = FeatureExtractor::new(&FeatureConfig::default());

        assert!(!extractor.is_fitted());
        let matrix = extractor.fit_transform(&records).unwrap();

        assert!(extractor.is_fitted());
        assert_eq!(matrix.shape(), &[3, extractor.n_features()]);
        // 2 incident types + 2 urgency levels + score
        assert_eq!(extractor.n_features(), extractor.vocab_size() + 5);
        assert_eq!(extractor.feature_names().len(), extractor.n_features());

        // Score passes through unchanged in the last column
        let last = extractor.n_features() - 1;
        assert_eq!(matrix[[0, last]], 95.0);
        assert_eq!(matrix[[1, last]], 5.0);
    }

    #[test]
    fn test_feature_extractor_is_deterministic() {
        let records = sample_records();
        let mut first = FeatureExtractor::new(&FeatureConfig::default());
        let mut second = FeatureExtractor::new(&FeatureConfig::default());

        assert_eq!(
            first.fit_transform(&records).unwrap(),
            second.fit_transform(&records).unwrap()
        );
    }

    #[test]
    fn test_feature_extractor_unknown_categories() {
        let records = sample_records();
        let mut extractor = FeatureExtractor::new(&FeatureConfig::default());
        extractor.fit(&records).unwrap();

        let unknown = IncidentRecord::from_raw("Test du système", "INCENDIE", "EXTREME", 50.0);
        let row = extractor.transform(&unknown).unwrap();

        let vocab = extractor.vocab_size();
        assert!(row[vocab..vocab + 4].iter().all(|&v| v == 0.0));
        assert_eq!(row[vocab + 4], 50.0);
    }

    #[test]
    fn test_transform_before_fit_fails() {
        let extractor = FeatureExtractor::new(&FeatureConfig::default());
        let record = &sample_records()[0];
        assert!(extractor.transform(record).is_err());
    }

    #[test]
    fn test_fit_empty_dataset_fails() {
        let mut extractor = FeatureExtractor::new(&FeatureConfig::default());
        assert!(extractor.fit(&[]).is_err());
    }
}
