use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use validator::Validate;

/// Kind of incident described by a signalement
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentType {
    Violence,
    Negligence,
    AbusSexuel,
    Autre,
}

/// Urgency declared by the reporter
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UrgencyLevel {
    Bas,
    Moyen,
    Eleve,
    Critique,
}

/// A single incident report as seen by the feature pipeline.
///
/// Categorical fields are kept as raw strings: values outside the closed
/// vocabularies are legal input and encode to all-zero indicator columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    /// Free-text description written by the reporter
    #[validate(length(min = 1))]
    pub description: String,

    /// Incident type (see [`IncidentType`])
    pub incident_type: String,

    /// Urgency level (see [`UrgencyLevel`])
    pub urgency_level: String,

    /// Suspicion score assigned upstream (0-100)
    #[validate(range(min = 0.0, max = 100.0))]
    pub ai_suspicion_score: f64,
}

impl IncidentRecord {
    /// Create a record from the closed vocabularies
    pub fn new(
        description: impl Into<String>,
        incident_type: IncidentType,
        urgency_level: UrgencyLevel,
        ai_suspicion_score: f64,
    ) -> Self {
        Self {
            description: description.into(),
            incident_type: incident_type.to_string(),
            urgency_level: urgency_level.to_string(),
            ai_suspicion_score,
        }
    }

    /// Create a record from raw field values, without checking the vocabularies
    pub fn from_raw(
        description: impl Into<String>,
        incident_type: impl Into<String>,
        urgency_level: impl Into<String>,
        ai_suspicion_score: f64,
    ) -> Self {
        Self {
            description: description.into(),
            incident_type: incident_type.into(),
            urgency_level: urgency_level.into(),
            ai_suspicion_score,
        }
    }
}

/// Training example: a record and whether it turned out to be a false alarm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LabeledRecord {
    #[validate(nested)]
    #[serde(flatten)]
    pub record: IncidentRecord,

    #[serde(rename = "isFalseAlarm")]
    pub is_false_alarm: bool,
}

impl LabeledRecord {
    pub fn new(record: IncidentRecord, is_false_alarm: bool) -> Self {
        Self {
            record,
            is_false_alarm,
        }
    }
}

/// Side document written next to the model, listing the closed vocabularies.
///
/// Meant for clients and documentation; inference never reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub incident_types: Vec<String>,
    pub urgency_levels: Vec<String>,
}

impl FeatureInfo {
    /// Enumerate both vocabularies in declaration order
    pub fn closed_vocabularies() -> Self {
        Self {
            incident_types: IncidentType::iter().map(|t| t.to_string()).collect(),
            urgency_levels: UrgencyLevel::iter().map(|u| u.to_string()).collect(),
        }
    }
}
