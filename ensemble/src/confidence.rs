//! Top-prediction extraction from a classifier's (label, score) list

use crate::normalizer::LabelNormalizer;
use crate::types::{LabelScore, ModelPrediction, NormalizedPrediction};

/// A model produced no usable prediction
///
/// Recovered by the coordinator: the model is excluded from consensus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MissingPredictionError {
    #[error("classifier returned no predictions")]
    Empty,

    #[error("classifier returned no finite scores")]
    NoUsableScores,
}

/// Select the top (label, score) entry
///
/// Classifiers normally return entries sorted by descending score, in which
/// case the first usable entry is taken. Unsorted input falls back to a
/// max-score scan; on equal scores the earlier entry wins.
pub fn top(predictions: &[LabelScore]) -> Result<&LabelScore, MissingPredictionError> {
    if predictions.is_empty() {
        return Err(MissingPredictionError::Empty);
    }

    let mut usable = predictions.iter().filter(|p| p.score.is_finite());
    let first = usable.next().ok_or(MissingPredictionError::NoUsableScores)?;

    let sorted = predictions
        .iter()
        .filter(|p| p.score.is_finite())
        .zip(usable)
        .all(|(a, b)| a.score >= b.score);
    if sorted {
        return Ok(first);
    }

    let best = predictions
        .iter()
        .filter(|p| p.score.is_finite())
        .fold(first, |best, p| if p.score > best.score { p } else { best });
    Ok(best)
}

/// Extract and normalize a model's top prediction
pub fn extract(
    prediction: &ModelPrediction,
    normalizer: &LabelNormalizer,
) -> Result<NormalizedPrediction, MissingPredictionError> {
    let best = top(&prediction.scores)?;
    let matched = normalizer.classify_label(prediction.model, &best.label);

    Ok(NormalizedPrediction {
        model: prediction.model,
        raw_label: best.label.clone(),
        class: matched.class,
        score: best.score.clamp(0.0, 1.0),
        fallback: matched.fallback,
    })
}
