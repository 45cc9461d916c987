//! Consensus engine - combines per-model predictions into one decision
//!
//! Implements three strategies selected by [`ConsensusMode`]:
//! majority vote, weighted vote, and agreement-based consensus with an
//! explicit highest-score fallback. Every outcome names the path that
//! produced it so downstream audit can tell them apart.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{ModelId, NormalizedPrediction, NormalizedSet, SeverityClass};

/// Tolerance for treating two float tallies as tied
const TIE_EPSILON: f64 = 1e-9;

/// Error type for consensus computation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("No predictions available for consensus")]
    NoPredictions,
}

/// Per-model weights for weighted voting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelWeights {
    pub depression: f64,
    pub sentiment: f64,
    pub emotional_distress: f64,
}

impl Default for ModelWeights {
    fn default() -> Self {
        Self {
            depression: 0.6,
            sentiment: 0.15,
            emotional_distress: 0.25,
        }
    }
}

impl ModelWeights {
    pub fn new(depression: f64, sentiment: f64, emotional_distress: f64) -> Self {
        Self {
            depression,
            sentiment,
            emotional_distress,
        }
    }

    pub fn weight(&self, model: ModelId) -> f64 {
        match model {
            ModelId::Depression => self.depression,
            ModelId::Sentiment => self.sentiment,
            ModelId::EmotionalDistress => self.emotional_distress,
        }
    }

    pub fn sum(&self) -> f64 {
        self.depression + self.sentiment + self.emotional_distress
    }
}

/// How many models must agree in consensus mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// At least two models share a class
    #[default]
    TwoOfThree,
    /// Every participating model (at least two) shares a class
    Unanimous,
}

/// Selectable combination strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsensusMode {
    Majority,
    Weighted(ModelWeights),
    Consensus(Strictness),
}

impl ConsensusMode {
    pub fn name(&self) -> &'static str {
        match self {
            ConsensusMode::Majority => "majority",
            ConsensusMode::Weighted(_) => "weighted",
            ConsensusMode::Consensus(_) => "consensus",
        }
    }
}

/// Which path produced the outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMethod {
    Majority,
    MajorityTiebreak,
    Weighted,
    Consensus,
    NoConsensusFallback,
}

impl std::fmt::Display for ConsensusMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsensusMethod::Majority => write!(f, "majority"),
            ConsensusMethod::MajorityTiebreak => write!(f, "majority_tiebreak"),
            ConsensusMethod::Weighted => write!(f, "weighted"),
            ConsensusMethod::Consensus => write!(f, "consensus"),
            ConsensusMethod::NoConsensusFallback => write!(f, "no_consensus_fallback"),
        }
    }
}

/// Combined prediction for one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub prediction: SeverityClass,
    /// Confidence in the prediction (0.0 - 1.0)
    pub confidence: f64,
    pub method: ConsensusMethod,
    /// Models whose class matched the prediction
    pub supporting_models: Vec<ModelId>,
}

/// Per-class vote tally
#[derive(Debug, Default, Clone)]
struct Tally {
    votes: usize,
    score_sum: f64,
    models: Vec<ModelId>,
}

fn tally(normalized: &NormalizedSet) -> BTreeMap<SeverityClass, Tally> {
    let mut tallies: BTreeMap<SeverityClass, Tally> = BTreeMap::new();
    for pred in normalized.values() {
        let t = tallies.entry(pred.class).or_default();
        t.votes += 1;
        t.score_sum += pred.score;
        t.models.push(pred.model);
    }
    tallies
}

fn supporters(normalized: &NormalizedSet, class: SeverityClass) -> Vec<ModelId> {
    normalized
        .values()
        .filter(|p| p.class == class)
        .map(|p| p.model)
        .collect()
}

/// Combines normalized predictions under a fixed mode
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    mode: ConsensusMode,
}

impl ConsensusEngine {
    pub fn new(mode: ConsensusMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ConsensusMode {
        self.mode
    }

    /// Combine predictions using the configured mode
    pub fn combine(&self, normalized: &NormalizedSet) -> Result<ConsensusOutcome, ConsensusError> {
        if normalized.is_empty() {
            return Err(ConsensusError::NoPredictions);
        }

        let outcome = match self.mode {
            ConsensusMode::Majority => majority(normalized)?,
            ConsensusMode::Weighted(weights) => weighted(normalized, &weights)?,
            ConsensusMode::Consensus(strictness) => consensus(normalized, strictness)?,
        };

        debug!(
            mode = self.mode.name(),
            prediction = %outcome.prediction,
            confidence = outcome.confidence,
            method = %outcome.method,
            "Consensus computed"
        );

        Ok(outcome)
    }
}

/// Most votes wins; ties go to the higher score sum, then the more severe class
fn majority(normalized: &NormalizedSet) -> Result<ConsensusOutcome, ConsensusError> {
    let tallies = tally(normalized);
    let max_votes = tallies.values().map(|t| t.votes).max().unwrap_or(0);

    let tied: Vec<(SeverityClass, &Tally)> = tallies
        .iter()
        .filter(|(_, t)| t.votes == max_votes)
        .map(|(c, t)| (*c, t))
        .collect();

    // BTreeMap iterates least severe first, so `>=` lets a later (more
    // severe) class win an exact score tie.
    let mut winner = *tied.first().ok_or(ConsensusError::NoPredictions)?;
    for candidate in tied.iter().skip(1) {
        if candidate.1.score_sum >= winner.1.score_sum - TIE_EPSILON {
            winner = *candidate;
        }
    }

    let (class, t) = winner;
    Ok(ConsensusOutcome {
        prediction: class,
        confidence: t.score_sum / t.votes as f64,
        method: if tied.len() > 1 {
            ConsensusMethod::MajorityTiebreak
        } else {
            ConsensusMethod::Majority
        },
        supporting_models: t.models.clone(),
    })
}

/// Highest `weight * score` sum wins; confidence is normalized by the
/// weight of the models that actually participated
fn weighted(
    normalized: &NormalizedSet,
    weights: &ModelWeights,
) -> Result<ConsensusOutcome, ConsensusError> {
    let total_weight: f64 = normalized.keys().map(|m| weights.weight(*m)).sum();
    if total_weight <= 0.0 {
        debug!("Participating models carry no weight, using majority vote");
        return majority(normalized);
    }

    let mut sums: BTreeMap<SeverityClass, f64> = BTreeMap::new();
    for pred in normalized.values() {
        *sums.entry(pred.class).or_insert(0.0) += weights.weight(pred.model) * pred.score;
    }

    let (class, sum) = sums
        .iter()
        .fold(None::<(SeverityClass, f64)>, |best, (c, s)| match best {
            Some((_, b)) if *s < b - TIE_EPSILON => best,
            _ => Some((*c, *s)),
        })
        .ok_or(ConsensusError::NoPredictions)?;

    Ok(ConsensusOutcome {
        prediction: class,
        confidence: (sum / total_weight).clamp(0.0, 1.0),
        method: ConsensusMethod::Weighted,
        supporting_models: supporters(normalized, class),
    })
}

/// Agreement on one class, or an explicit fallback to the strongest model
fn consensus(
    normalized: &NormalizedSet,
    strictness: Strictness,
) -> Result<ConsensusOutcome, ConsensusError> {
    let tallies = tally(normalized);
    let participants = normalized.len();
    let required = match strictness {
        Strictness::TwoOfThree => 2,
        Strictness::Unanimous => participants.max(2),
    };

    // With three models at most one class can reach two votes; scanning
    // most severe first keeps the choice deterministic regardless.
    let agreed = tallies.iter().rev().find(|(_, t)| t.votes >= required);

    if let Some((class, t)) = agreed {
        return Ok(ConsensusOutcome {
            prediction: *class,
            confidence: t.score_sum / t.votes as f64,
            method: ConsensusMethod::Consensus,
            supporting_models: t.models.clone(),
        });
    }

    let strongest = strongest_model(normalized).ok_or(ConsensusError::NoPredictions)?;
    Ok(ConsensusOutcome {
        prediction: strongest.class,
        confidence: strongest.score,
        method: ConsensusMethod::NoConsensusFallback,
        supporting_models: vec![strongest.model],
    })
}

/// Highest-score prediction; equal scores go to the more severe class
fn strongest_model(normalized: &NormalizedSet) -> Option<&NormalizedPrediction> {
    let mut iter = normalized.values();
    let mut best = iter.next()?;
    for pred in iter {
        let higher = pred.score > best.score + TIE_EPSILON;
        let tied_more_severe =
            (pred.score - best.score).abs() <= TIE_EPSILON && pred.class > best.class;
        if higher || tied_more_severe {
            best = pred;
        }
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pred(model: ModelId, class: SeverityClass, score: f64) -> NormalizedPrediction {
        NormalizedPrediction {
            model,
            raw_label: class.to_string(),
            class,
            score,
            fallback: false,
        }
    }

    fn set(preds: Vec<NormalizedPrediction>) -> NormalizedSet {
        preds.into_iter().map(|p| (p.model, p)).collect()
    }

    fn all_modes() -> Vec<ConsensusMode> {
        vec![
            ConsensusMode::Majority,
            ConsensusMode::Weighted(ModelWeights::default()),
            ConsensusMode::Consensus(Strictness::TwoOfThree),
            ConsensusMode::Consensus(Strictness::Unanimous),
        ]
    }

    #[test]
    fn test_unanimous_class_wins_in_every_mode() {
        let input = set(vec![
            pred(ModelId::Depression, SeverityClass::Moderate, 0.7),
            pred(ModelId::Sentiment, SeverityClass::Moderate, 0.6),
            pred(ModelId::EmotionalDistress, SeverityClass::Moderate, 0.8),
        ]);
        for mode in all_modes() {
            let outcome = ConsensusEngine::new(mode).combine(&input).unwrap();
            assert_eq!(outcome.prediction, SeverityClass::Moderate, "{mode:?}");
            assert!(outcome.confidence > 0.0, "{mode:?}");
            assert_eq!(outcome.supporting_models.len(), 3);
        }
    }

    #[test]
    fn test_empty_input_errors() {
        let engine = ConsensusEngine::new(ConsensusMode::Majority);
        assert_eq!(
            engine.combine(&NormalizedSet::new()),
            Err(ConsensusError::NoPredictions)
        );
    }

    #[test]
    fn test_majority_vote() {
        let input = set(vec![
            pred(ModelId::Depression, SeverityClass::None, 0.9),
            pred(ModelId::Sentiment, SeverityClass::Severe, 0.8),
            pred(ModelId::EmotionalDistress, SeverityClass::Severe, 0.6),
        ]);
        let outcome = ConsensusEngine::new(ConsensusMode::Majority)
            .combine(&input)
            .unwrap();
        assert_eq!(outcome.prediction, SeverityClass::Severe);
        assert_eq!(outcome.method, ConsensusMethod::Majority);
        assert!((outcome.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_majority_tie_broken_by_score_sum() {
        let input = set(vec![
            pred(ModelId::Depression, SeverityClass::Mild, 0.9),
            pred(ModelId::Sentiment, SeverityClass::Severe, 0.5),
        ]);
        let outcome = ConsensusEngine::new(ConsensusMode::Majority)
            .combine(&input)
            .unwrap();
        assert_eq!(outcome.prediction, SeverityClass::Mild);
        assert_eq!(outcome.method, ConsensusMethod::MajorityTiebreak);
    }

    #[test]
    fn test_majority_exact_tie_prefers_more_severe() {
        let input = set(vec![
            pred(ModelId::Depression, SeverityClass::None, 0.7),
            pred(ModelId::Sentiment, SeverityClass::Moderate, 0.7),
        ]);
        let outcome = ConsensusEngine::new(ConsensusMode::Majority)
            .combine(&input)
            .unwrap();
        assert_eq!(outcome.prediction, SeverityClass::Moderate);
    }

    #[test]
    fn test_weighted_vote_respects_weights() {
        // depression carries 0.6 of the weight
        let input = set(vec![
            pred(ModelId::Depression, SeverityClass::Moderate, 0.8),
            pred(ModelId::Sentiment, SeverityClass::None, 0.9),
            pred(ModelId::EmotionalDistress, SeverityClass::None, 0.9),
        ]);
        let outcome = ConsensusEngine::new(ConsensusMode::Weighted(ModelWeights::default()))
            .combine(&input)
            .unwrap();
        assert_eq!(outcome.prediction, SeverityClass::Moderate);
        assert_eq!(outcome.method, ConsensusMethod::Weighted);
        assert!((outcome.confidence - 0.48).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_confidence_normalized_by_participants() {
        let input = set(vec![
            pred(ModelId::Sentiment, SeverityClass::Severe, 0.8),
            pred(ModelId::EmotionalDistress, SeverityClass::Severe, 0.8),
        ]);
        let outcome = ConsensusEngine::new(ConsensusMode::Weighted(ModelWeights::default()))
            .combine(&input)
            .unwrap();
        assert!((outcome.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_zero_weight_falls_back_to_majority() {
        let weights = ModelWeights::new(1.0, 0.0, 0.0);
        let input = set(vec![pred(ModelId::Sentiment, SeverityClass::Mild, 0.6)]);
        let outcome = ConsensusEngine::new(ConsensusMode::Weighted(weights))
            .combine(&input)
            .unwrap();
        assert_eq!(outcome.method, ConsensusMethod::Majority);
        assert_eq!(outcome.prediction, SeverityClass::Mild);
    }

    #[test]
    fn test_consensus_two_of_three() {
        let input = set(vec![
            pred(ModelId::Depression, SeverityClass::None, 0.95),
            pred(ModelId::Sentiment, SeverityClass::Severe, 0.9),
            pred(ModelId::EmotionalDistress, SeverityClass::Severe, 0.8),
        ]);
        let outcome = ConsensusEngine::new(ConsensusMode::Consensus(Strictness::TwoOfThree))
            .combine(&input)
            .unwrap();
        assert_eq!(outcome.prediction, SeverityClass::Severe);
        assert_eq!(outcome.method, ConsensusMethod::Consensus);
        assert!((outcome.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_consensus_unanimous_falls_back_explicitly() {
        let input = set(vec![
            pred(ModelId::Depression, SeverityClass::None, 0.95),
            pred(ModelId::Sentiment, SeverityClass::Severe, 0.9),
            pred(ModelId::EmotionalDistress, SeverityClass::Severe, 0.8),
        ]);
        let outcome = ConsensusEngine::new(ConsensusMode::Consensus(Strictness::Unanimous))
            .combine(&input)
            .unwrap();
        assert_eq!(outcome.method, ConsensusMethod::NoConsensusFallback);
        assert_eq!(outcome.prediction, SeverityClass::None);
        assert_eq!(outcome.supporting_models, vec![ModelId::Depression]);
        assert!((outcome.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_consensus_single_model_is_fallback() {
        let input = set(vec![pred(ModelId::Sentiment, SeverityClass::Moderate, 0.6)]);
        let outcome = ConsensusEngine::new(ConsensusMode::Consensus(Strictness::TwoOfThree))
            .combine(&input)
            .unwrap();
        assert_eq!(outcome.method, ConsensusMethod::NoConsensusFallback);
        assert_eq!(outcome.prediction, SeverityClass::Moderate);
    }

    #[test]
    fn test_fallback_tie_prefers_more_severe() {
        let input = set(vec![
            pred(ModelId::Depression, SeverityClass::Mild, 0.7),
            pred(ModelId::Sentiment, SeverityClass::Severe, 0.7),
            pred(ModelId::EmotionalDistress, SeverityClass::None, 0.7),
        ]);
        let outcome = ConsensusEngine::new(ConsensusMode::Consensus(Strictness::TwoOfThree))
            .combine(&input)
            .unwrap();
        assert_eq!(outcome.method, ConsensusMethod::NoConsensusFallback);
        assert_eq!(outcome.prediction, SeverityClass::Severe);
    }

    #[test]
    fn test_method_names() {
        let json = serde_json::to_string(&ConsensusMethod::NoConsensusFallback).unwrap();
        assert_eq!(json, "\"no_consensus_fallback\"");
        assert_eq!(ConsensusMethod::MajorityTiebreak.to_string(), "majority_tiebreak");
    }
}
