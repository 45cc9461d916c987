//! Threshold mapping - crisis score to crisis level and staff-review flag
//!
//! Cut-points are evaluated top-down and are inclusive. A small additive
//! safety bias is applied first so borderline scores lean toward flagging.
//! Staff review is asymmetric: the less confident a medium or low
//! prediction, the more likely it is routed to a human.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigResult};
use crate::gap::GapResult;
use crate::types::CrisisLevel;

/// Ordered cut-points and staff-review confidence floors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdConfig {
    /// Score at or above this maps to `high`
    pub crisis_to_high: f64,
    /// Score at or above this maps to `medium`
    pub crisis_to_medium: f64,
    /// Score at or above this maps to `low`
    pub mild_crisis_to_low: f64,
    /// A `medium` result below this confidence needs staff review
    pub medium_confidence_threshold: f64,
    /// A `low` result below this confidence needs staff review
    pub low_confidence_threshold: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            crisis_to_high: 0.65,
            crisis_to_medium: 0.35,
            mild_crisis_to_low: 0.15,
            medium_confidence_threshold: 0.60,
            low_confidence_threshold: 0.75,
        }
    }
}

impl ThresholdConfig {
    /// Validate ordering and ranges of all cut-points
    pub fn validate(&self) -> ConfigResult<()> {
        let fields = [
            ("crisis_to_high", self.crisis_to_high),
            ("crisis_to_medium", self.crisis_to_medium),
            ("mild_crisis_to_low", self.mild_crisis_to_low),
            ("medium_confidence_threshold", self.medium_confidence_threshold),
            ("low_confidence_threshold", self.low_confidence_threshold),
        ];
        for (name, value) in fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvariantViolation(format!(
                    "thresholds.{name} must be in [0, 1], got {value}"
                )));
            }
        }

        if self.crisis_to_high <= self.crisis_to_medium {
            return Err(ConfigError::InvariantViolation(format!(
                "crisis_to_high ({}) must be greater than crisis_to_medium ({})",
                self.crisis_to_high, self.crisis_to_medium
            )));
        }
        if self.crisis_to_medium <= self.mild_crisis_to_low {
            return Err(ConfigError::InvariantViolation(format!(
                "crisis_to_medium ({}) must be greater than mild_crisis_to_low ({})",
                self.crisis_to_medium, self.mild_crisis_to_low
            )));
        }
        if self.mild_crisis_to_low <= 0.0 {
            return Err(ConfigError::InvariantViolation(format!(
                "mild_crisis_to_low must be greater than 0, got {}",
                self.mild_crisis_to_low
            )));
        }
        if self.low_confidence_threshold < self.medium_confidence_threshold {
            return Err(ConfigError::InvariantViolation(format!(
                "low_confidence_threshold ({}) must not be below medium_confidence_threshold ({})",
                self.low_confidence_threshold, self.medium_confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Why a result was routed to staff review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    HighCrisis,
    LowConfidenceMedium,
    LowConfidenceLow,
    ModelDisagreement,
}

/// Outcome of threshold mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdDecision {
    pub crisis_level: CrisisLevel,
    /// Score after safety bias and clamping
    pub biased_score: f64,
    pub review_reasons: Vec<ReviewReason>,
}

impl ThresholdDecision {
    pub fn needs_response(&self) -> bool {
        self.crisis_level != CrisisLevel::None
    }

    pub fn requires_staff_review(&self) -> bool {
        !self.review_reasons.is_empty()
    }
}

/// Maps a crisis score to a crisis level using validated cut-points
#[derive(Debug, Clone)]
pub struct ThresholdMapper {
    config: ThresholdConfig,
    safety_bias: f64,
}

impl ThresholdMapper {
    pub fn new(config: ThresholdConfig, safety_bias: f64) -> Self {
        Self {
            config,
            safety_bias,
        }
    }

    /// Apply the safety bias; the result always lies in [0, 1]
    pub fn apply_bias(&self, crisis_score: f64) -> f64 {
        let score = if crisis_score.is_finite() {
            crisis_score
        } else {
            0.0
        };
        (score + self.safety_bias).clamp(0.0, 1.0)
    }

    /// Crisis level for an already-biased score
    pub fn level_for(&self, score: f64) -> CrisisLevel {
        if score >= self.config.crisis_to_high {
            CrisisLevel::High
        } else if score >= self.config.crisis_to_medium {
            CrisisLevel::Medium
        } else if score >= self.config.mild_crisis_to_low {
            CrisisLevel::Low
        } else {
            CrisisLevel::None
        }
    }

    pub fn map(&self, crisis_score: f64, confidence: f64, gap: &GapResult) -> ThresholdDecision {
        let biased_score = self.apply_bias(crisis_score);
        let crisis_level = self.level_for(biased_score);

        let mut review_reasons = Vec::new();
        match crisis_level {
            CrisisLevel::High => review_reasons.push(ReviewReason::HighCrisis),
            CrisisLevel::Medium if confidence < self.config.medium_confidence_threshold => {
                review_reasons.push(ReviewReason::LowConfidenceMedium)
            }
            CrisisLevel::Low if confidence < self.config.low_confidence_threshold => {
                review_reasons.push(ReviewReason::LowConfidenceLow)
            }
            _ => {}
        }
        if gap.requires_review {
            review_reasons.push(ReviewReason::ModelDisagreement);
        }

        ThresholdDecision {
            crisis_level,
            biased_score,
            review_reasons,
        }
    }
}
