//! Classifier collaborator seams
//!
//! Model loading and inference live outside this crate. A model wrapper
//! implements [`Classifier`] (async) or [`BlockingClassifier`] (sync) and
//! returns raw `(label, score)` pairs; the coordinator does the rest.

use async_trait::async_trait;

use crate::types::{LabelScore, ModelId};

/// Failure reported by a classifier wrapper
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifierError {
    /// Model is not loaded or its backend is down
    #[error("Model unavailable: {0}")]
    Unavailable(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Async classifier wrapper for one model
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Which ensemble slot this classifier fills
    fn model(&self) -> ModelId;

    /// Classify a message. An empty vector means "model unavailable",
    /// never "nothing wrong".
    async fn classify(&self, text: &str) -> Result<Vec<LabelScore>, ClassifierError>;
}

/// Synchronous classifier wrapper for one model
pub trait BlockingClassifier: Send + Sync {
    fn model(&self) -> ModelId;

    fn classify(&self, text: &str) -> Result<Vec<LabelScore>, ClassifierError>;
}

/// Classifier that returns a fixed output, used for replaying recorded
/// predictions and in tests
#[derive(Debug, Clone)]
pub struct StaticClassifier {
    model: ModelId,
    output: Result<Vec<LabelScore>, ClassifierError>,
}

impl StaticClassifier {
    pub fn new(model: ModelId, output: Vec<LabelScore>) -> Self {
        Self {
            model,
            output: Ok(output),
        }
    }

    pub fn failing(model: ModelId, error: ClassifierError) -> Self {
        Self {
            model,
            output: Err(error),
        }
    }
}

#[async_trait]
impl Classifier for StaticClassifier {
    fn model(&self) -> ModelId {
        self.model
    }

    async fn classify(&self, _text: &str) -> Result<Vec<LabelScore>, ClassifierError> {
        self.output.clone()
    }
}

impl BlockingClassifier for StaticClassifier {
    fn model(&self) -> ModelId {
        self.model
    }

    fn classify(&self, _text: &str) -> Result<Vec<LabelScore>, ClassifierError> {
        self.output.clone()
    }
}
