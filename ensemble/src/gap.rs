//! Gap detection - flags material disagreement between models
//!
//! Models are compared on the shared crisis axis (`class weight * score`),
//! and only pairs whose canonical classes differ are considered. The result
//! is advisory: it routes a message to human review but never changes the
//! crisis score.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{ModelId, NormalizedSet, SeverityClass};

/// One disagreeing model pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapDetail {
    pub models: (ModelId, ModelId),
    pub classes: (SeverityClass, SeverityClass),
    /// Absolute difference of the two crisis signals
    pub spread: f64,
}

/// Outcome of gap detection for one message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GapResult {
    /// Spread exceeded the (looser) gap threshold
    pub gap_detected: bool,
    /// Spread exceeded the (stricter) disagreement threshold
    pub requires_review: bool,
    pub max_spread: f64,
    pub details: Vec<GapDetail>,
}

/// Compares normalized predictions across models
#[derive(Debug, Clone)]
pub struct GapDetector {
    gap_threshold: f64,
    disagreement_threshold: f64,
}

impl GapDetector {
    /// Thresholds must satisfy `gap_threshold < disagreement_threshold`;
    /// config validation enforces this before a detector is built.
    pub fn new(gap_threshold: f64, disagreement_threshold: f64) -> Self {
        Self {
            gap_threshold,
            disagreement_threshold,
        }
    }

    pub fn detect(&self, normalized: &NormalizedSet) -> GapResult {
        let preds: Vec<_> = normalized.values().collect();
        let mut details = Vec::new();

        for (i, a) in preds.iter().enumerate() {
            for b in &preds[i + 1..] {
                if a.class == b.class {
                    continue;
                }
                details.push(GapDetail {
                    models: (a.model, b.model),
                    classes: (a.class, b.class),
                    spread: (a.crisis_signal() - b.crisis_signal()).abs(),
                });
            }
        }

        let max_spread = details.iter().map(|d| d.spread).fold(0.0, f64::max);
        let result = GapResult {
            gap_detected: max_spread > self.gap_threshold,
            requires_review: max_spread > self.disagreement_threshold,
            max_spread,
            details,
        };

        debug!(
            pairs = result.details.len(),
            max_spread = result.max_spread,
            gap_detected = result.gap_detected,
            requires_review = result.requires_review,
            "Gap detection complete"
        );

        result
    }
}
