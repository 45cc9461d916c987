//! Ensemble coordinator - orchestrates one end-to-end crisis analysis
//!
//! Classifiers are invoked through either the async or the blocking seam;
//! both paths collect raw outputs and hand them to [`EnsembleCoordinator::decide`],
//! the single pure pipeline: extract → normalize → gap detection →
//! consensus → safety bias + thresholds → result.
//!
//! Failed or empty models are excluded rather than counted as "no crisis".
//! A timeout is reported as a failure, never as a partial result.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::classifier::{BlockingClassifier, Classifier, ClassifierError};
use crate::confidence;
use crate::config::{ConfigError, EnsembleConfig, EnsembleMode};
use crate::consensus::ConsensusEngine;
use crate::gap::GapDetector;
use crate::normalizer::LabelNormalizer;
use crate::result::{EnsembleResult, LabelFallback, ModelFailure};
use crate::threshold::ThresholdMapper;
use crate::types::{LabelScore, ModelId, ModelPrediction, NormalizedSet};

/// Error type for coordinator operations
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Ensemble analysis timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Analysis unavailable: none of {attempted} models produced a usable prediction")]
    NoUsablePredictions { attempted: usize },
}

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Shared reference to EnsembleCoordinator
pub type SharedEnsembleCoordinator = Arc<EnsembleCoordinator>;

/// Raw output of one classifier call
pub type ClassifierOutput = (ModelId, Result<Vec<LabelScore>, ClassifierError>);

/// Central orchestrator for the crisis ensemble
#[derive(Debug, Clone)]
pub struct EnsembleCoordinator {
    config: Arc<EnsembleConfig>,
    normalizer: LabelNormalizer,
    gap: GapDetector,
    consensus: ConsensusEngine,
    thresholds: ThresholdMapper,
}

impl EnsembleCoordinator {
    /// Validate the configuration and build every pipeline stage from it
    pub fn new(config: EnsembleConfig) -> CoordinatorResult<Self> {
        Self::from_shared(Arc::new(config))
    }

    /// Build from an already shared configuration
    pub fn from_shared(config: Arc<EnsembleConfig>) -> CoordinatorResult<Self> {
        config.validate()?;

        let normalizer = LabelNormalizer::new(&config.labels);
        let gap = GapDetector::new(config.gap.gap_threshold, config.gap.disagreement_threshold);
        let consensus = ConsensusEngine::new(config.consensus_mode());
        let thresholds = ThresholdMapper::new(config.thresholds.clone(), config.safety_bias);

        debug!(mode = %config.mode, "Ensemble coordinator ready");

        Ok(Self {
            config,
            normalizer,
            gap,
            consensus,
            thresholds,
        })
    }

    /// Create a shared reference to this coordinator
    pub fn shared(self) -> SharedEnsembleCoordinator {
        Arc::new(self)
    }

    /// Same configuration, different consensus mode
    pub fn with_mode(&self, mode: EnsembleMode) -> Self {
        let mut coordinator = self.clone();
        coordinator.consensus = ConsensusEngine::new(self.config.consensus_mode_for(mode));
        coordinator
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Run all classifiers concurrently and decide, under the configured timeout
    pub async fn analyze(
        &self,
        text: &str,
        classifiers: &[Arc<dyn Classifier>],
    ) -> CoordinatorResult<EnsembleResult> {
        let start = Instant::now();
        let timeout = self.config.timeout();

        let calls = classifiers.iter().map(|c| async move {
            let output = c.classify(text).await;
            (c.model(), output)
        });

        let outputs = match tokio::time::timeout(timeout, join_all(calls)).await {
            Ok(outputs) => outputs,
            Err(_) => {
                error!(
                    timeout_ms = self.config.timeout_ms,
                    classifiers = classifiers.len(),
                    "Ensemble analysis timed out"
                );
                return Err(CoordinatorError::Timeout {
                    timeout_ms: self.config.timeout_ms,
                });
            }
        };

        let result = self.decide(outputs)?;
        Ok(result.with_processing_time(start.elapsed().as_millis() as u64))
    }

    /// Run classifiers one after another on the calling thread
    ///
    /// Blocking calls cannot be interrupted; exceeding the timeout is
    /// detected after each call and reported as a failure.
    pub fn analyze_blocking(
        &self,
        text: &str,
        classifiers: &[Arc<dyn BlockingClassifier>],
    ) -> CoordinatorResult<EnsembleResult> {
        let start = Instant::now();
        let timeout = self.config.timeout();

        let mut outputs = Vec::with_capacity(classifiers.len());
        for classifier in classifiers {
            outputs.push((classifier.model(), classifier.classify(text)));

            if start.elapsed() > timeout {
                error!(
                    timeout_ms = self.config.timeout_ms,
                    model = %classifier.model(),
                    "Ensemble analysis timed out"
                );
                return Err(CoordinatorError::Timeout {
                    timeout_ms: self.config.timeout_ms,
                });
            }
        }

        let result = self.decide(outputs)?;
        Ok(result.with_processing_time(start.elapsed().as_millis() as u64))
    }

    // =========================================================================
    // Pure decision pipeline
    // =========================================================================

    /// Turn raw classifier outputs into an [`EnsembleResult`]
    pub fn decide(&self, outputs: Vec<ClassifierOutput>) -> CoordinatorResult<EnsembleResult> {
        let start = Instant::now();
        let attempted = outputs.len();

        let mut seen: BTreeSet<ModelId> = BTreeSet::new();
        let mut normalized = NormalizedSet::new();
        let mut failures = Vec::new();
        let mut fallbacks = Vec::new();

        for (model, output) in outputs {
            if !seen.insert(model) {
                warn!(model = %model, "Duplicate classifier output ignored");
                continue;
            }

            let scores = match output {
                Ok(scores) => scores,
                Err(e) => {
                    warn!(model = %model, error = %e, "Model excluded from ensemble");
                    failures.push(ModelFailure {
                        model,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let prediction = ModelPrediction::new(model, scores);
            match confidence::extract(&prediction, &self.normalizer) {
                Ok(pred) => {
                    if pred.fallback {
                        warn!(
                            model = %model,
                            raw_label = %pred.raw_label,
                            default = %pred.class,
                            "Unknown label, using model default"
                        );
                        fallbacks.push(LabelFallback {
                            model,
                            raw_label: pred.raw_label.clone(),
                            default_class: pred.class,
                        });
                    }
                    normalized.insert(model, pred);
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Model excluded from ensemble");
                    failures.push(ModelFailure {
                        model,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if normalized.is_empty() {
            error!(attempted, "No model produced a usable prediction");
            return Err(CoordinatorError::NoUsablePredictions { attempted });
        }

        let gap = self.gap.detect(&normalized);
        let consensus = self
            .consensus
            .combine(&normalized)
            .map_err(|_| CoordinatorError::NoUsablePredictions { attempted })?;

        let raw_score = consensus.prediction.weight() * consensus.confidence;
        let decision = self.thresholds.map(raw_score, consensus.confidence, &gap);

        let result = EnsembleResult::new(
            self.consensus.mode().name(),
            normalized,
            consensus,
            gap,
            raw_score,
            decision,
            failures,
            fallbacks,
        )
        .with_processing_time(start.elapsed().as_millis() as u64);

        info!(
            analysis_id = %result.analysis_id(),
            summary = %result.summary(),
            "Ensemble analysis complete"
        );

        Ok(result)
    }
}
