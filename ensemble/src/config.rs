//! Ensemble configuration
//!
//! A single immutable [`EnsembleConfig`] is loaded once at startup (file,
//! then environment overrides), validated, and handed to the coordinator.
//! Nothing reads the environment after load, and an invalid configuration
//! never reaches request handling.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::consensus::{ConsensusMode, ModelWeights, Strictness};
use crate::normalizer::LabelRules;
use crate::threshold::ThresholdConfig;

/// Tolerance on the weight sum
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Safety bias above this is accepted but logged as a warning on load
pub const SAFETY_BIAS_WARN: f64 = 0.1;

/// Hard upper bound for the safety bias
pub const SAFETY_BIAS_MAX: f64 = 0.25;

/// Error type for configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid JSON label rules: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {var}: {value:?}")]
    Env { var: String, value: String },

    /// Thresholds out of order, weights not summing to 1, gap >= disagreement, ...
    #[error("Configuration invariant violated: {0}")]
    InvariantViolation(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Consensus strategy name as written in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleMode {
    Consensus,
    Majority,
    #[default]
    Weighted,
}

impl std::str::FromStr for EnsembleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "consensus" => Ok(EnsembleMode::Consensus),
            "majority" => Ok(EnsembleMode::Majority),
            "weighted" => Ok(EnsembleMode::Weighted),
            other => Err(format!("unknown ensemble mode: {other}")),
        }
    }
}

impl std::fmt::Display for EnsembleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnsembleMode::Consensus => write!(f, "consensus"),
            EnsembleMode::Majority => write!(f, "majority"),
            EnsembleMode::Weighted => write!(f, "weighted"),
        }
    }
}

/// Gap detection thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GapConfig {
    /// Spread above this flags a gap
    pub gap_threshold: f64,
    /// Spread above this requires staff review
    pub disagreement_threshold: f64,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            gap_threshold: 0.25,
            disagreement_threshold: 0.35,
        }
    }
}

/// Complete configuration for the ensemble decision engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnsembleConfig {
    pub mode: EnsembleMode,
    /// Agreement required in consensus mode
    pub strictness: Strictness,
    pub weights: ModelWeights,
    pub thresholds: ThresholdConfig,
    pub gap: GapConfig,
    /// Added to the crisis score before thresholding
    pub safety_bias: f64,
    /// Whole-analysis timeout in milliseconds
    pub timeout_ms: u64,
    pub labels: LabelRules,
    /// Optional JSON file replacing `labels`, resolved relative to the config file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_rules_file: Option<PathBuf>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            mode: EnsembleMode::default(),
            strictness: Strictness::default(),
            weights: ModelWeights::default(),
            thresholds: ThresholdConfig::default(),
            gap: GapConfig::default(),
            safety_bias: 0.03,
            timeout_ms: 1000,
            labels: LabelRules::default(),
            label_rules_file: None,
        }
    }
}

impl EnsembleConfig {
    /// Load configuration: file (or defaults), then env overrides, then validate
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        }
        .with_env_overrides()?;

        config.validate()?;
        if config.safety_bias > SAFETY_BIAS_WARN {
            warn!(
                safety_bias = config.safety_bias,
                "Safety bias above {SAFETY_BIAS_WARN} will flag many borderline messages"
            );
        }

        info!(
            mode = %config.mode,
            safety_bias = config.safety_bias,
            timeout_ms = config.timeout_ms,
            source = %path.map(|p| p.display().to_string()).unwrap_or_else(|| "defaults".into()),
            "Ensemble configuration loaded"
        );

        Ok(config)
    }

    /// Parse a TOML config; label rules file paths resolve against the
    /// current directory
    pub fn from_toml_str(toml_str: &str) -> ConfigResult<Self> {
        let mut config: EnsembleConfig = toml::from_str(toml_str)?;
        config.resolve_label_rules(None)?;
        Ok(config)
    }

    /// Read and parse a TOML config file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: EnsembleConfig = toml::from_str(&content)?;
        config.resolve_label_rules(path.parent())?;
        Ok(config)
    }

    fn resolve_label_rules(&mut self, base: Option<&Path>) -> ConfigResult<()> {
        let Some(ref file) = self.label_rules_file else {
            return Ok(());
        };
        if self.labels != LabelRules::default() {
            return Err(ConfigError::InvariantViolation(
                "set either [labels] or label_rules_file, not both".to_string(),
            ));
        }
        let path = match base {
            Some(dir) if file.is_relative() => dir.join(file),
            _ => file.clone(),
        };
        let json = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        self.labels = LabelRules::from_json(&json)?;
        Ok(())
    }

    /// Apply `CRISIS_*` environment overrides
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(var: &str, value: String) -> ConfigResult<T> {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|_| ConfigError::Env {
                var: var.to_string(),
                value,
            })
        }

        if let Some(v) = lookup("CRISIS_ENSEMBLE_MODE") {
            self.mode = parse("CRISIS_ENSEMBLE_MODE", v)?;
        }
        if let Some(v) = lookup("CRISIS_ENSEMBLE_STRICTNESS") {
            self.strictness = match v.trim().to_ascii_lowercase().as_str() {
                "two_of_three" => Strictness::TwoOfThree,
                "unanimous" => Strictness::Unanimous,
                _ => {
                    return Err(ConfigError::Env {
                        var: "CRISIS_ENSEMBLE_STRICTNESS".to_string(),
                        value: v,
                    })
                }
            };
        }
        if let Some(v) = lookup("CRISIS_SAFETY_BIAS") {
            self.safety_bias = parse("CRISIS_SAFETY_BIAS", v)?;
        }
        if let Some(v) = lookup("CRISIS_ENSEMBLE_TIMEOUT_MS") {
            self.timeout_ms = parse("CRISIS_ENSEMBLE_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("CRISIS_GAP_THRESHOLD") {
            self.gap.gap_threshold = parse("CRISIS_GAP_THRESHOLD", v)?;
        }
        if let Some(v) = lookup("CRISIS_DISAGREEMENT_THRESHOLD") {
            self.gap.disagreement_threshold = parse("CRISIS_DISAGREEMENT_THRESHOLD", v)?;
        }
        Ok(self)
    }

    /// Validate every cross-field invariant
    pub fn validate(&self) -> ConfigResult<()> {
        self.validate_weights()?;
        self.thresholds.validate()?;

        let gap = &self.gap;
        for (name, value) in [
            ("gap_threshold", gap.gap_threshold),
            ("disagreement_threshold", gap.disagreement_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvariantViolation(format!(
                    "gap.{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if gap.gap_threshold >= gap.disagreement_threshold {
            return Err(ConfigError::InvariantViolation(format!(
                "gap_threshold ({}) must be less than disagreement_threshold ({})",
                gap.gap_threshold, gap.disagreement_threshold
            )));
        }

        if !self.safety_bias.is_finite() || !(0.0..=SAFETY_BIAS_MAX).contains(&self.safety_bias) {
            return Err(ConfigError::InvariantViolation(format!(
                "safety_bias must be in [0, {SAFETY_BIAS_MAX}], got {}",
                self.safety_bias
            )));
        }
        // A bias reaching the low cut-point would flag every message
        if self.safety_bias >= self.thresholds.mild_crisis_to_low {
            return Err(ConfigError::InvariantViolation(format!(
                "safety_bias ({}) must be below mild_crisis_to_low ({})",
                self.safety_bias, self.thresholds.mild_crisis_to_low
            )));
        }

        if self.timeout_ms == 0 {
            return Err(ConfigError::InvariantViolation(
                "timeout_ms must be > 0".to_string(),
            ));
        }

        self.labels.validate()
    }

    /// Weights are checked regardless of mode so that a per-request
    /// override to weighted voting can never see an unnormalized set.
    fn validate_weights(&self) -> ConfigResult<()> {
        let w = &self.weights;
        for (name, value) in [
            ("depression", w.depression),
            ("sentiment", w.sentiment),
            ("emotional_distress", w.emotional_distress),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvariantViolation(format!(
                    "weights.{name} must be in [0, 1], got {value}"
                )));
            }
        }
        let sum = w.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::InvariantViolation(format!(
                "model weights must sum to 1.0 ± {WEIGHT_SUM_TOLERANCE}, got {} + {} + {} = {sum:.3}",
                w.depression, w.sentiment, w.emotional_distress
            )));
        }
        Ok(())
    }

    /// Consensus mode derived from `mode`, `strictness`, and `weights`
    pub fn consensus_mode(&self) -> ConsensusMode {
        self.consensus_mode_for(self.mode)
    }

    /// Consensus mode for an explicit mode name, sharing this config's parameters
    pub fn consensus_mode_for(&self, mode: EnsembleMode) -> ConsensusMode {
        match mode {
            EnsembleMode::Majority => ConsensusMode::Majority,
            EnsembleMode::Weighted => ConsensusMode::Weighted(self.weights),
            EnsembleMode::Consensus => ConsensusMode::Consensus(self.strictness),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
