//! Integration tests for the ensemble coordinator
//!
//! Drives the full classify → normalize → gap → consensus → threshold flow
//! through the public API with stub classifiers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crisis_ensemble::{
    BlockingClassifier, Classifier, ClassifierError, ConfigError, ConsensusMethod,
    CoordinatorError, CrisisLevel, EnsembleConfig, EnsembleCoordinator, EnsembleMode, LabelScore,
    ModelId, ModelWeights, ReviewReason, SeverityClass, StaticClassifier,
};

/// Classifier that never answers within the timeout
struct SlowClassifier {
    model: ModelId,
    delay: Duration,
}

#[async_trait]
impl Classifier for SlowClassifier {
    fn model(&self) -> ModelId {
        self.model
    }

    async fn classify(&self, _text: &str) -> Result<Vec<LabelScore>, ClassifierError> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![LabelScore::new("severe", 0.9)])
    }
}

/// Blocking classifier that holds the calling thread past the timeout
struct SlowBlockingClassifier {
    model: ModelId,
    delay: Duration,
}

impl BlockingClassifier for SlowBlockingClassifier {
    fn model(&self) -> ModelId {
        self.model
    }

    fn classify(&self, _text: &str) -> Result<Vec<LabelScore>, ClassifierError> {
        std::thread::sleep(self.delay);
        Ok(vec![LabelScore::new("severe", 0.9)])
    }
}

fn classifier(model: ModelId, labels: &[(&str, f64)]) -> Arc<dyn Classifier> {
    Arc::new(StaticClassifier::new(
        model,
        labels.iter().map(|(l, s)| LabelScore::new(*l, *s)).collect(),
    ))
}

fn severe_trio() -> Vec<Arc<dyn Classifier>> {
    vec![
        classifier(ModelId::Depression, &[("severe", 0.9), ("moderate", 0.05)]),
        classifier(ModelId::Sentiment, &[("Very Negative", 0.85), ("Negative", 0.1)]),
        classifier(
            ModelId::EmotionalDistress,
            &[("High Distress", 0.8), ("Low Distress", 0.2)],
        ),
    ]
}

fn disagreeing_trio() -> Vec<Arc<dyn Classifier>> {
    vec![
        classifier(ModelId::Depression, &[("not depression", 0.95)]),
        classifier(ModelId::Sentiment, &[("Very Negative", 0.9)]),
        classifier(ModelId::EmotionalDistress, &[("High Distress", 0.85)]),
    ]
}

#[tokio::test]
async fn test_all_severe_weighted_is_high_and_reviewed() {
    let coordinator = EnsembleCoordinator::new(EnsembleConfig::default()).unwrap();

    let result = coordinator
        .analyze("I can't do this anymore", &severe_trio())
        .await
        .unwrap();

    assert_eq!(result.crisis_level(), CrisisLevel::High);
    assert!(result.requires_staff_review());
    assert!(result.review_reasons().contains(&ReviewReason::HighCrisis));
    assert_eq!(result.models_used(), 3);
    assert_eq!(result.mode(), "weighted");
}

#[tokio::test]
async fn test_unanimous_class_agrees_across_modes() {
    let base = EnsembleCoordinator::new(EnsembleConfig::default()).unwrap();

    for mode in [
        EnsembleMode::Majority,
        EnsembleMode::Weighted,
        EnsembleMode::Consensus,
    ] {
        let result = base
            .with_mode(mode)
            .analyze("message", &severe_trio())
            .await
            .unwrap();
        assert_eq!(
            result.consensus().prediction,
            SeverityClass::Severe,
            "{mode}"
        );
        assert!(result.confidence_score() > 0.0, "{mode}");
    }
}

#[tokio::test]
async fn test_disagreement_requires_review_in_every_mode() {
    let mut config = EnsembleConfig::default();
    config.gap.disagreement_threshold = 0.35;
    let base = EnsembleCoordinator::new(config).unwrap();

    for mode in [
        EnsembleMode::Majority,
        EnsembleMode::Weighted,
        EnsembleMode::Consensus,
    ] {
        let result = base
            .with_mode(mode)
            .analyze("message", &disagreeing_trio())
            .await
            .unwrap();
        assert!(result.gap().requires_review, "{mode}");
        assert!(result.requires_staff_review(), "{mode}");
        assert!(
            result
                .review_reasons()
                .contains(&ReviewReason::ModelDisagreement),
            "{mode}"
        );
    }
}

#[tokio::test]
async fn test_failing_model_excluded_from_consensus() {
    let coordinator = EnsembleCoordinator::new(EnsembleConfig::default()).unwrap();

    let classifiers: Vec<Arc<dyn Classifier>> = vec![
        classifier(ModelId::Depression, &[("severe", 0.9)]),
        Arc::new(StaticClassifier::failing(
            ModelId::Sentiment,
            ClassifierError::Inference("CUDA out of memory".into()),
        )),
        classifier(ModelId::EmotionalDistress, &[("High Distress", 0.8)]),
    ];

    let result = coordinator.analyze("message", &classifiers).await.unwrap();

    assert_eq!(result.models_used(), 2);
    assert_eq!(
        result.participating_models(),
        vec![ModelId::Depression, ModelId::EmotionalDistress]
    );
    assert_eq!(result.unavailable_models()[0].model, ModelId::Sentiment);
    assert_eq!(result.consensus().prediction, SeverityClass::Severe);
}

#[tokio::test]
async fn test_empty_model_output_excluded() {
    let coordinator = EnsembleCoordinator::new(EnsembleConfig::default())
        .unwrap()
        .with_mode(EnsembleMode::Consensus);

    let classifiers: Vec<Arc<dyn Classifier>> = vec![
        classifier(ModelId::Depression, &[("moderate", 0.7)]),
        classifier(ModelId::Sentiment, &[]),
        classifier(ModelId::EmotionalDistress, &[("Moderate Distress", 0.6)]),
    ];

    let result = coordinator.analyze("message", &classifiers).await.unwrap();

    assert_eq!(result.models_used(), 2);
    assert_eq!(result.method(), ConsensusMethod::Consensus);
    assert_eq!(result.consensus().prediction, SeverityClass::Moderate);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_failure_not_partial_result() {
    let coordinator = EnsembleCoordinator::new(EnsembleConfig::default()).unwrap();

    let classifiers: Vec<Arc<dyn Classifier>> = vec![
        classifier(ModelId::Depression, &[("severe", 0.9)]),
        Arc::new(SlowClassifier {
            model: ModelId::Sentiment,
            delay: Duration::from_secs(30),
        }),
    ];

    let err = coordinator
        .analyze("message", &classifiers)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::Timeout { timeout_ms: 1000 }));
}

#[tokio::test]
async fn test_concurrent_requests_share_coordinator() {
    let coordinator = EnsembleCoordinator::new(EnsembleConfig::default())
        .unwrap()
        .shared();

    let mut handles = Vec::new();
    for i in 0..8 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            let classifiers = if i % 2 == 0 {
                severe_trio()
            } else {
                disagreeing_trio()
            };
            coordinator
                .analyze(&format!("message {i}"), &classifiers)
                .await
                .map(|r| r.requires_staff_review())
        }));
    }

    for handle in handles {
        let reviewed = handle.await.unwrap().unwrap();
        assert!(reviewed);
    }
}

#[test]
fn test_blocking_path_matches_async_logic() {
    let coordinator = EnsembleCoordinator::new(EnsembleConfig::default()).unwrap();

    let classifiers: Vec<Arc<dyn BlockingClassifier>> = vec![
        Arc::new(StaticClassifier::new(
            ModelId::Depression,
            vec![LabelScore::new("severe", 0.9)],
        )),
        Arc::new(StaticClassifier::new(
            ModelId::Sentiment,
            vec![LabelScore::new("Very Negative", 0.85)],
        )),
        Arc::new(StaticClassifier::new(
            ModelId::EmotionalDistress,
            vec![LabelScore::new("High Distress", 0.8)],
        )),
    ];

    let result = coordinator.analyze_blocking("message", &classifiers).unwrap();
    assert_eq!(result.crisis_level(), CrisisLevel::High);
    assert_eq!(result.models_used(), 3);
}

#[test]
fn test_blocking_timeout_is_failure_not_partial_result() {
    let config = EnsembleConfig {
        timeout_ms: 20,
        ..Default::default()
    };
    let coordinator = EnsembleCoordinator::new(config).unwrap();

    let classifiers: Vec<Arc<dyn BlockingClassifier>> = vec![
        Arc::new(StaticClassifier::new(
            ModelId::Depression,
            vec![LabelScore::new("severe", 0.9)],
        )),
        Arc::new(SlowBlockingClassifier {
            model: ModelId::Sentiment,
            delay: Duration::from_millis(100),
        }),
        Arc::new(StaticClassifier::new(
            ModelId::EmotionalDistress,
            vec![LabelScore::new("High Distress", 0.8)],
        )),
    ];

    let err = coordinator
        .analyze_blocking("message", &classifiers)
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::Timeout { timeout_ms: 20 }));
}

#[test]
fn test_bad_weights_fail_config_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ensemble.toml");
    std::fs::write(
        &path,
        r#"
mode = "weighted"

[weights]
depression = 0.5
sentiment = 0.3
emotional_distress = 0.3
"#,
    )
    .unwrap();

    let err = EnsembleConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::InvariantViolation(_)));

    let config = EnsembleConfig {
        weights: ModelWeights::new(0.5, 0.3, 0.3),
        ..Default::default()
    };
    assert!(matches!(
        EnsembleCoordinator::new(config),
        Err(CoordinatorError::Config(ConfigError::InvariantViolation(_)))
    ));
}

#[test]
fn test_threshold_boundary_inclusive_end_to_end() {
    let mut config = EnsembleConfig::default();
    config.mode = EnsembleMode::Majority;
    config.safety_bias = 0.0;
    config.thresholds.crisis_to_high = 0.8;
    let coordinator = EnsembleCoordinator::new(config).unwrap();

    // Single severe model: crisis score = 1.0 * confidence
    let at = coordinator
        .decide(vec![(
            ModelId::Depression,
            Ok(vec![LabelScore::new("severe", 0.8)]),
        )])
        .unwrap();
    assert_eq!(at.crisis_level(), CrisisLevel::High);

    let below = coordinator
        .decide(vec![(
            ModelId::Depression,
            Ok(vec![LabelScore::new("severe", 0.8 - 1e-9)]),
        )])
        .unwrap();
    assert_eq!(below.crisis_level(), CrisisLevel::Medium);
}

#[test]
fn test_result_serializes_for_caller() {
    let coordinator = EnsembleCoordinator::new(EnsembleConfig::default()).unwrap();
    let result = coordinator
        .decide(vec![
            (ModelId::Depression, Ok(vec![LabelScore::new("mild", 0.9)])),
            (
                ModelId::Sentiment,
                Err(ClassifierError::Unavailable("offline".into())),
            ),
        ])
        .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["crisis_level"], "low");
    assert_eq!(json["needs_response"], true);
    assert_eq!(json["models_used"], 1);
    assert_eq!(json["consensus"]["method"], "weighted");
    assert_eq!(json["unavailable_models"][0]["model"], "sentiment");
    assert_eq!(json["predictions"]["depression"]["class"], "mild");
}
