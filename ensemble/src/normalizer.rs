//! Label normalization - maps model-specific labels into canonical severity classes
//!
//! Each model has its own vocabulary ("severe", "Very Negative",
//! "High Distress", ...). Rules are data, not code: an ordered list of
//! `(class, patterns)` per model plus a default class for labels no rule
//! matches. Matching is case-insensitive substring containment, evaluated
//! most severe class first so an ambiguous label never under-classifies.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ConfigError, ConfigResult};
use crate::types::{ModelId, SeverityClass};

/// One normalization rule: any pattern contained in the label selects `class`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelRule {
    pub class: SeverityClass,
    pub patterns: Vec<String>,
}

impl LabelRule {
    pub fn new(class: SeverityClass, patterns: &[&str]) -> Self {
        Self {
            class,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Rule set for a single model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelRules {
    /// Class used when no rule matches
    pub default: SeverityClass,
    pub rules: Vec<LabelRule>,
}

/// Label rules for every model in the ensemble
///
/// Every known model must have exactly one rule set; unknown keys are
/// rejected at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelRules {
    pub depression: ModelRules,
    pub sentiment: ModelRules,
    pub emotional_distress: ModelRules,
}

impl Default for LabelRules {
    fn default() -> Self {
        Self {
            depression: ModelRules {
                default: SeverityClass::None,
                rules: vec![
                    LabelRule::new(SeverityClass::Severe, &["severe"]),
                    LabelRule::new(SeverityClass::Moderate, &["moderate"]),
                    LabelRule::new(SeverityClass::Mild, &["mild"]),
                    LabelRule::new(
                        SeverityClass::None,
                        &["not depression", "not_depression", "no depression", "minimum"],
                    ),
                ],
            },
            sentiment: ModelRules {
                default: SeverityClass::None,
                rules: vec![
                    LabelRule::new(SeverityClass::Severe, &["very negative"]),
                    LabelRule::new(SeverityClass::Moderate, &["negative"]),
                    LabelRule::new(SeverityClass::None, &["neutral", "positive"]),
                ],
            },
            emotional_distress: ModelRules {
                // Unmapped distress labels read as low distress
                default: SeverityClass::Mild,
                rules: vec![
                    LabelRule::new(SeverityClass::Severe, &["high distress", "severe distress"]),
                    LabelRule::new(
                        SeverityClass::Moderate,
                        &["moderate distress", "medium distress"],
                    ),
                    LabelRule::new(SeverityClass::Mild, &["low distress", "mild distress"]),
                    LabelRule::new(SeverityClass::None, &["no distress"]),
                ],
            },
        }
    }
}

impl LabelRules {
    /// Rule set for a model
    pub fn for_model(&self, model: ModelId) -> &ModelRules {
        match model {
            ModelId::Depression => &self.depression,
            ModelId::Sentiment => &self.sentiment,
            ModelId::EmotionalDistress => &self.emotional_distress,
        }
    }

    /// Parse a rule set from JSON (the format used by `label_rules_file`)
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let rules: LabelRules = serde_json::from_str(json)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Check structural invariants of every model's rule set
    pub fn validate(&self) -> ConfigResult<()> {
        for &model in ModelId::all() {
            let set = self.for_model(model);

            if set.default == SeverityClass::Severe {
                return Err(ConfigError::InvariantViolation(format!(
                    "labels.{model}: default class must not be the most severe class"
                )));
            }

            let mut seen: Vec<SeverityClass> = Vec::with_capacity(set.rules.len());
            for rule in &set.rules {
                if seen.contains(&rule.class) {
                    return Err(ConfigError::InvariantViolation(format!(
                        "labels.{model}: class '{}' has more than one rule",
                        rule.class
                    )));
                }
                seen.push(rule.class);

                if rule.patterns.is_empty() {
                    return Err(ConfigError::InvariantViolation(format!(
                        "labels.{model}: rule for '{}' has no patterns",
                        rule.class
                    )));
                }
                if rule.patterns.iter().any(|p| p.trim().is_empty()) {
                    return Err(ConfigError::InvariantViolation(format!(
                        "labels.{model}: rule for '{}' has a blank pattern",
                        rule.class
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Outcome of normalizing one label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelMatch {
    pub class: SeverityClass,
    /// True when the default class was used
    pub fallback: bool,
}

/// Rules for one model, lowercased and sorted most severe first
#[derive(Debug, Clone)]
struct CompiledRules {
    default: SeverityClass,
    rules: Vec<(SeverityClass, Vec<String>)>,
}

impl CompiledRules {
    fn compile(set: &ModelRules) -> Self {
        let rules = SeverityClass::by_severity_desc()
            .iter()
            .flat_map(|&class| set.rules.iter().filter(move |r| r.class == class))
            .map(|r| {
                let patterns = r
                    .patterns
                    .iter()
                    .map(|p| p.trim().to_lowercase())
                    .collect();
                (r.class, patterns)
            })
            .collect();
        Self {
            default: set.default,
            rules,
        }
    }
}

/// Maps raw classifier labels into canonical severity classes
#[derive(Debug, Clone)]
pub struct LabelNormalizer {
    depression: CompiledRules,
    sentiment: CompiledRules,
    emotional_distress: CompiledRules,
}

impl LabelNormalizer {
    /// Build a normalizer from a rule set
    ///
    /// The rule set is expected to have passed [`LabelRules::validate`];
    /// the config loader guarantees this.
    pub fn new(rules: &LabelRules) -> Self {
        Self {
            depression: CompiledRules::compile(&rules.depression),
            sentiment: CompiledRules::compile(&rules.sentiment),
            emotional_distress: CompiledRules::compile(&rules.emotional_distress),
        }
    }

    fn rules_for(&self, model: ModelId) -> &CompiledRules {
        match model {
            ModelId::Depression => &self.depression,
            ModelId::Sentiment => &self.sentiment,
            ModelId::EmotionalDistress => &self.emotional_distress,
        }
    }

    /// Canonical class for a raw label
    pub fn normalize(&self, model: ModelId, raw_label: &str) -> SeverityClass {
        self.classify_label(model, raw_label).class
    }

    /// Canonical class for a raw label, reporting whether the default was used
    pub fn classify_label(&self, model: ModelId, raw_label: &str) -> LabelMatch {
        let compiled = self.rules_for(model);
        let label = raw_label.trim().to_lowercase();

        for (class, patterns) in &compiled.rules {
            if patterns.iter().any(|p| label.contains(p.as_str())) {
                return LabelMatch {
                    class: *class,
                    fallback: false,
                };
            }
        }

        debug!(model = %model, raw_label, default = %compiled.default, "No label rule matched");
        LabelMatch {
            class: compiled.default,
            fallback: true,
        }
    }
}

impl Default for LabelNormalizer {
    fn default() -> Self {
        Self::new(&LabelRules::default())
    }
}
