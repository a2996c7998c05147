use crate::labels::LabelSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

const PROBABILITY_SUM_TOLERANCE: f32 = 1e-2;

#[derive(Error, Debug, PartialEq)]
pub enum ScoreError {
    #[error("Model returned {got} scores for {expected} labels")]
    LengthMismatch { expected: usize, got: usize },
    #[error("Model returned no scores")]
    Empty,
    #[error("Model returned a non-finite score")]
    NonFinite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_probabilities: Option<BTreeMap<String, f32>>,
}

impl Prediction {
    /// Picks the arg-max class. The full per-class map is attached when the
    /// winning confidence is below `confidence_threshold`.
    pub fn from_scores(
        scores: &[f32],
        labels: &LabelSet,
        confidence_threshold: f32,
        apply_softmax: bool,
    ) -> Result<Self, ScoreError> {
        if scores.len() != labels.len() {
            return Err(ScoreError::LengthMismatch {
                expected: labels.len(),
                got: scores.len(),
            });
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(ScoreError::NonFinite);
        }

        let scores: Vec<f32> = if apply_softmax && !is_probability_vector(scores) {
            softmax(scores)
        } else {
            scores.to_vec()
        };

        // Ranking uses the raw outputs, only the reported values are clamped.
        let (class_id, _) = arg_max(&scores).ok_or(ScoreError::Empty)?;
        let label = labels.get(class_id).ok_or(ScoreError::Empty)?.to_string();
        let probabilities: Vec<f32> = scores.iter().map(|s| s.clamp(0.0, 1.0)).collect();
        let confidence = probabilities[class_id];

        let all_probabilities = (confidence < confidence_threshold).then(|| {
            labels
                .iter()
                .zip(&probabilities)
                .map(|(label, &p)| (label.to_string(), p))
                .collect()
        });

        Ok(Self {
            label,
            confidence,
            all_probabilities,
        })
    }
}

/// First index of the largest value, like numpy's argmax.
fn arg_max(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })
}

fn is_probability_vector(scores: &[f32]) -> bool {
    let sum: f32 = scores.iter().sum();
    scores.iter().all(|s| (0.0..=1.0).contains(s)) && (sum - 1.0).abs() <= PROBABILITY_SUM_TOLERANCE
}

pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waste_labels() -> LabelSet {
        LabelSet::new([
            "EWaste",
            "NonRecyclable",
            "Organic",
            "Recyclable",
            "StoreDropOff",
        ])
        .unwrap()
    }

    #[test]
    fn test_confident_prediction_has_no_probability_map() {
        let scores = [0.01, 0.02, 0.93, 0.03, 0.01];

        let prediction = Prediction::from_scores(&scores, &waste_labels(), 0.8, false).unwrap();

        assert_eq!(prediction.label, "Organic");
        assert_eq!(prediction.confidence, 0.93);
        assert!(prediction.all_probabilities.is_none());
    }

    #[test]
    fn test_low_confidence_includes_every_label() {
        let scores = [0.1, 0.2, 0.42, 0.18, 0.1];

        let prediction = Prediction::from_scores(&scores, &waste_labels(), 0.8, false).unwrap();

        assert_eq!(prediction.label, "Organic");
        let probabilities = prediction.all_probabilities.unwrap();
        assert_eq!(probabilities.len(), 5);
        assert_eq!(probabilities["StoreDropOff"], 0.1);
        let sum: f32 = probabilities.values().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let scores = [0.8, 0.05, 0.05, 0.05, 0.05];
        let prediction = Prediction::from_scores(&scores, &waste_labels(), 0.8, false).unwrap();
        assert!(prediction.all_probabilities.is_none());
    }

    #[test]
    fn test_ties_pick_first_index() {
        let scores = [0.4, 0.4, 0.1, 0.05, 0.05];
        let prediction = Prediction::from_scores(&scores, &waste_labels(), 0.8, false).unwrap();
        assert_eq!(prediction.label, "EWaste");
    }

    #[test]
    fn test_logits_are_softmaxed_when_enabled() {
        let logits = [1.0, 2.0, 6.0, 0.5, -3.0];

        let prediction = Prediction::from_scores(&logits, &waste_labels(), 0.8, true).unwrap();

        assert_eq!(prediction.label, "Organic");
        assert!(prediction.confidence > 0.0 && prediction.confidence <= 1.0);
    }

    #[test]
    fn test_confidence_is_clamped_without_softmax() {
        let logits = [1.0, 2.0, 6.0, 0.5, -3.0];

        let prediction = Prediction::from_scores(&logits, &waste_labels(), 0.8, false).unwrap();

        assert_eq!(prediction.label, "Organic");
        assert_eq!(prediction.confidence, 1.0);
    }

    #[test]
    fn test_negative_outputs_still_rank_by_value() {
        let scores = [-0.9, -0.5, -0.1, -0.7, -0.8];

        let prediction = Prediction::from_scores(&scores, &waste_labels(), 0.8, false).unwrap();

        assert_eq!(prediction.label, "Organic");
        assert_eq!(prediction.confidence, 0.0);
        let probabilities = prediction.all_probabilities.unwrap();
        assert!(probabilities.values().all(|&p| p == 0.0));
    }

    #[test]
    fn test_wrong_number_of_scores() {
        let result = Prediction::from_scores(&[0.5, 0.5], &waste_labels(), 0.8, false);
        assert_eq!(
            result,
            Err(ScoreError::LengthMismatch {
                expected: 5,
                got: 2
            })
        );
    }

    #[test]
    fn test_nan_scores_are_rejected() {
        let result =
            Prediction::from_scores(&[0.5, f32::NAN, 0.1, 0.1, 0.1], &waste_labels(), 0.8, false);
        assert_eq!(result, Err(ScoreError::NonFinite));
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probabilities = softmax(&[3.0, 1.0, 0.2]);
        let sum: f32 = probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probabilities[0] > probabilities[1]);
    }

    #[test]
    fn test_serialization_omits_missing_map() {
        let prediction = Prediction {
            label: "Recyclable".to_string(),
            confidence: 0.9,
            all_probabilities: None,
        };
        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 2);
        assert_eq!(json["label"], "Recyclable");
    }
}
