//! Recorded classifier outputs accepted by `crisis-replay analyze`

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use crisis_ensemble::{Classifier, ClassifierError, LabelScore, ModelId, StaticClassifier};

/// One recorded message with each model's raw output
///
/// A model that is missing or `null` is treated as unavailable.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayCase {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub outputs: BTreeMap<ModelId, Option<Vec<LabelScore>>>,
}

impl ReplayCase {
    /// Stub classifiers that replay the recorded outputs, one per model
    pub fn classifiers(&self) -> Vec<Arc<dyn Classifier>> {
        ModelId::all()
            .iter()
            .map(|&model| -> Arc<dyn Classifier> {
                match self.outputs.get(&model) {
                    Some(Some(scores)) => Arc::new(StaticClassifier::new(model, scores.clone())),
                    _ => Arc::new(StaticClassifier::failing(
                        model,
                        ClassifierError::Unavailable("no recorded output".to_string()),
                    )),
                }
            })
            .collect()
    }
}

/// A single case or a batch of cases
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReplayInput {
    Batch(Vec<ReplayCase>),
    Single(ReplayCase),
}

impl ReplayInput {
    pub fn into_cases(self) -> Vec<ReplayCase> {
        match self {
            ReplayInput::Batch(cases) => cases,
            ReplayInput::Single(case) => vec![case],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_case_with_null_model() {
        let json = r#"{
            "message": "hello",
            "outputs": {
                "depression": [{"label": "severe", "score": 0.9}],
                "sentiment": null
            }
        }"#;
        let cases = serde_json::from_str::<ReplayInput>(json)
            .unwrap()
            .into_cases();
        assert_eq!(cases.len(), 1);

        let classifiers = cases[0].classifiers();
        assert_eq!(classifiers.len(), 3);
        assert_eq!(classifiers[1].model(), ModelId::Sentiment);
    }

    #[test]
    fn test_batch_input() {
        let json = r#"[
            {"id": "a", "outputs": {"depression": [{"label": "mild", "score": 0.4}]}},
            {"id": "b", "outputs": {}}
        ]"#;
        let cases = serde_json::from_str::<ReplayInput>(json)
            .unwrap()
            .into_cases();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].id.as_deref(), Some("a"));
    }

    #[test]
    fn test_unknown_model_rejected() {
        let json = r#"{"outputs": {"toxicity": []}}"#;
        assert!(serde_json::from_str::<ReplayCase>(json).is_err());
    }
}
