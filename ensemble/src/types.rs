//! Core types shared by every stage of the ensemble pipeline
//!
//! These types describe one analysis request: the raw classifier output,
//! the canonical severity space it is normalized into, and the per-model
//! normalized prediction that the gap detector and consensus engine consume.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier for the classifiers participating in the ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelId {
    /// Depression severity classifier
    Depression,
    /// Sentiment classifier (Very Negative .. Very Positive)
    Sentiment,
    /// Emotional distress classifier
    EmotionalDistress,
}

impl ModelId {
    /// All model IDs in canonical order
    pub fn all() -> &'static [ModelId] {
        &[
            ModelId::Depression,
            ModelId::Sentiment,
            ModelId::EmotionalDistress,
        ]
    }

    /// Stable name used in config files, env vars, and serialized output
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Depression => "depression",
            ModelId::Sentiment => "sentiment",
            ModelId::EmotionalDistress => "emotional_distress",
        }
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "depression" => Ok(ModelId::Depression),
            "sentiment" => Ok(ModelId::Sentiment),
            "emotional_distress" | "distress" => Ok(ModelId::EmotionalDistress),
            other => Err(format!("unknown model: {other}")),
        }
    }
}

/// Canonical severity bucket every model's raw label is mapped into
///
/// Ordering is by severity, so `Severe` is the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityClass {
    None,
    Mild,
    Moderate,
    Severe,
}

impl SeverityClass {
    /// Position of this class on the shared crisis axis (0.0 - 1.0)
    pub fn weight(&self) -> f64 {
        match self {
            SeverityClass::None => 0.0,
            SeverityClass::Mild => 0.3,
            SeverityClass::Moderate => 0.6,
            SeverityClass::Severe => 1.0,
        }
    }

    /// Classes from most to least severe (rule evaluation order)
    pub fn by_severity_desc() -> &'static [SeverityClass] {
        &[
            SeverityClass::Severe,
            SeverityClass::Moderate,
            SeverityClass::Mild,
            SeverityClass::None,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityClass::None => "none",
            SeverityClass::Mild => "mild",
            SeverityClass::Moderate => "moderate",
            SeverityClass::Severe => "severe",
        }
    }
}

impl std::fmt::Display for SeverityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single (label, score) entry from a classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Raw output of one classifier for one message
///
/// Entries are expected in descending score order, but consumers must not
/// rely on it (see [`crate::confidence::top`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub model: ModelId,
    pub scores: Vec<LabelScore>,
}

impl ModelPrediction {
    pub fn new(model: ModelId, scores: Vec<LabelScore>) -> Self {
        Self { model, scores }
    }
}

/// A model's top prediction mapped into the canonical severity space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPrediction {
    pub model: ModelId,
    /// Label exactly as the classifier returned it
    pub raw_label: String,
    pub class: SeverityClass,
    /// Score of the top label, clamped to [0, 1]
    pub score: f64,
    /// True when no rule matched and the model default was used
    pub fallback: bool,
}

impl NormalizedPrediction {
    /// Score projected onto the shared crisis axis
    pub fn crisis_signal(&self) -> f64 {
        self.class.weight() * self.score
    }
}

/// Normalized predictions keyed by model, in canonical model order
pub type NormalizedSet = BTreeMap<ModelId, NormalizedPrediction>;

/// Final crisis level reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrisisLevel {
    None,
    Low,
    Medium,
    High,
}

impl std::fmt::Display for CrisisLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrisisLevel::None => write!(f, "none"),
            CrisisLevel::Low => write!(f, "low"),
            CrisisLevel::Medium => write!(f, "medium"),
            CrisisLevel::High => write!(f, "high"),
        }
    }
}
