//! Crisis Ensemble Library
//!
//! Deterministic decision engine for multi-model crisis detection. Three
//! independently trained classifiers (depression, sentiment, emotional
//! distress) each label a message; this crate turns their raw outputs into
//! one crisis level with a confidence score and a staff-review flag.
//!
//! # Pipeline
//!
//! ```text
//!  Classifier (external) ─┐
//!  Classifier (external) ─┼─► extract top ─► normalize label ─► NormalizedSet
//!  Classifier (external) ─┘                                        │
//!                                  ┌───────────────────────────────┤
//!                                  ▼                               ▼
//!                            GapDetector                    ConsensusEngine
//!                                  │                               │
//!                                  └──────────► ThresholdMapper ◄──┘
//!                                                     │
//!                                                     ▼
//!                                              EnsembleResult
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use crisis_ensemble::{EnsembleConfig, EnsembleCoordinator};
//!
//! let config = EnsembleConfig::load(Some(Path::new("ensemble.toml")))?;
//! let coordinator = EnsembleCoordinator::new(config)?.shared();
//!
//! let result = coordinator.analyze(&message, &classifiers).await?;
//! println!("{}", result.summary());
//! ```

pub mod classifier;
pub mod confidence;
pub mod config;
pub mod consensus;
pub mod coordinator;
pub mod gap;
pub mod normalizer;
pub mod result;
pub mod threshold;
pub mod types;

pub use classifier::{BlockingClassifier, Classifier, ClassifierError, StaticClassifier};
pub use confidence::MissingPredictionError;
pub use config::{ConfigError, ConfigResult, EnsembleConfig, EnsembleMode, GapConfig};
pub use consensus::{
    ConsensusEngine, ConsensusError, ConsensusMethod, ConsensusMode, ConsensusOutcome,
    ModelWeights, Strictness,
};
pub use coordinator::{
    ClassifierOutput, CoordinatorError, CoordinatorResult, EnsembleCoordinator,
    SharedEnsembleCoordinator,
};
pub use gap::{GapDetail, GapDetector, GapResult};
pub use normalizer::{LabelMatch, LabelNormalizer, LabelRule, LabelRules, ModelRules};
pub use result::{EnsembleResult, LabelFallback, ModelFailure};
pub use threshold::{ReviewReason, ThresholdConfig, ThresholdDecision, ThresholdMapper};
pub use types::{
    CrisisLevel, LabelScore, ModelId, ModelPrediction, NormalizedPrediction, NormalizedSet,
    SeverityClass,
};
