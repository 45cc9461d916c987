//! Structured analysis result handed back to the caller
//!
//! Fields are private and only the coordinator constructs results, so the
//! derived flags (`needs_response`, `requires_staff_review`) can never
//! disagree with the crisis level and review reasons they come from.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::consensus::{ConsensusMethod, ConsensusOutcome};
use crate::gap::GapResult;
use crate::threshold::{ReviewReason, ThresholdDecision};
use crate::types::{CrisisLevel, ModelId, NormalizedSet, SeverityClass};

/// A model excluded from this analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelFailure {
    pub model: ModelId,
    pub reason: String,
}

/// A label that no rule matched, so the model default was used
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelFallback {
    pub model: ModelId,
    pub raw_label: String,
    pub default_class: SeverityClass,
}

/// Complete ensemble output for one message
#[derive(Debug, Clone, Serialize)]
pub struct EnsembleResult {
    analysis_id: String,
    analyzed_at: DateTime<Utc>,
    crisis_level: CrisisLevel,
    needs_response: bool,
    requires_staff_review: bool,
    review_reasons: Vec<ReviewReason>,
    /// Crisis score after safety bias, in [0, 1]
    crisis_score: f64,
    /// Crisis score before safety bias
    raw_crisis_score: f64,
    confidence_score: f64,
    consensus: ConsensusOutcome,
    mode: &'static str,
    predictions: NormalizedSet,
    gap: GapResult,
    models_used: usize,
    unavailable_models: Vec<ModelFailure>,
    label_fallbacks: Vec<LabelFallback>,
    processing_time_ms: u64,
}

impl EnsembleResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        mode: &'static str,
        predictions: NormalizedSet,
        consensus: ConsensusOutcome,
        gap: GapResult,
        raw_crisis_score: f64,
        decision: ThresholdDecision,
        unavailable_models: Vec<ModelFailure>,
        label_fallbacks: Vec<LabelFallback>,
    ) -> Self {
        Self {
            analysis_id: uuid::Uuid::new_v4().to_string(),
            analyzed_at: Utc::now(),
            crisis_level: decision.crisis_level,
            needs_response: decision.needs_response(),
            requires_staff_review: decision.requires_staff_review(),
            crisis_score: decision.biased_score,
            review_reasons: decision.review_reasons,
            raw_crisis_score,
            confidence_score: consensus.confidence,
            consensus,
            mode,
            models_used: predictions.len(),
            predictions,
            gap,
            unavailable_models,
            label_fallbacks,
            processing_time_ms: 0,
        }
    }

    pub(crate) fn with_processing_time(mut self, ms: u64) -> Self {
        self.processing_time_ms = ms;
        self
    }

    pub fn analysis_id(&self) -> &str {
        &self.analysis_id
    }

    pub fn analyzed_at(&self) -> DateTime<Utc> {
        self.analyzed_at
    }

    pub fn crisis_level(&self) -> CrisisLevel {
        self.crisis_level
    }

    pub fn needs_response(&self) -> bool {
        self.needs_response
    }

    pub fn requires_staff_review(&self) -> bool {
        self.requires_staff_review
    }

    pub fn review_reasons(&self) -> &[ReviewReason] {
        &self.review_reasons
    }

    pub fn crisis_score(&self) -> f64 {
        self.crisis_score
    }

    pub fn raw_crisis_score(&self) -> f64 {
        self.raw_crisis_score
    }

    pub fn confidence_score(&self) -> f64 {
        self.confidence_score
    }

    pub fn consensus(&self) -> &ConsensusOutcome {
        &self.consensus
    }

    pub fn method(&self) -> ConsensusMethod {
        self.consensus.method
    }

    /// Name of the consensus mode that was configured for this analysis
    pub fn mode(&self) -> &'static str {
        self.mode
    }

    pub fn predictions(&self) -> &NormalizedSet {
        &self.predictions
    }

    pub fn gap(&self) -> &GapResult {
        &self.gap
    }

    pub fn models_used(&self) -> usize {
        self.models_used
    }

    pub fn participating_models(&self) -> Vec<ModelId> {
        self.predictions.keys().copied().collect()
    }

    pub fn unavailable_models(&self) -> &[ModelFailure] {
        &self.unavailable_models
    }

    pub fn label_fallbacks(&self) -> &[LabelFallback] {
        &self.label_fallbacks
    }

    pub fn processing_time_ms(&self) -> u64 {
        self.processing_time_ms
    }

    /// Compact summary for logging
    pub fn summary(&self) -> String {
        format!(
            "level={} score={:.3} confidence={:.3} method={} models={} review={}",
            self.crisis_level,
            self.crisis_score,
            self.confidence_score,
            self.consensus.method,
            self.models_used,
            self.requires_staff_review
        )
    }
}
