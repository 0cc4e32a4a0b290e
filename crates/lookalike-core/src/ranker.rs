//! Top-K ranking of a probability vector into the response shape.

use crate::error::LabelMapMismatchError;
use crate::labels::LabelMap;
use crate::types::{Prediction, PredictionResult, ProbabilityVector};

pub const DEFAULT_TOP_K: usize = 5;

/// Rank classes by descending probability; bit-equal probabilities keep
/// ascending class order. `k` is clamped to `1..=num_classes`.
///
/// `face_detected` is left `false`; the caller owns that fact.
pub fn rank(
    probabilities: &ProbabilityVector,
    labels: &LabelMap,
    k: usize,
) -> Result<PredictionResult, LabelMapMismatchError> {
    if probabilities.len() != labels.len() || probabilities.is_empty() {
        return Err(LabelMapMismatchError {
            labels: labels.len(),
            classes: probabilities.len(),
        });
    }

    let probs = probabilities.as_slice();
    let mut order: Vec<usize> = (0..probs.len()).collect();
    // Stable sort: equal keys stay in ascending index order.
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));

    let k = k.clamp(1, probs.len());
    let top_predictions: Vec<Prediction> = order[..k]
        .iter()
        .map(|&idx| Prediction {
            celebrity: labels.name_or_unknown(idx),
            confidence: probs[idx],
        })
        .collect();

    let best = order[0];
    Ok(PredictionResult {
        predicted_celebrity: top_predictions[0].celebrity.clone(),
        confidence: probs[best],
        class_index: best,
        face_detected: false,
        top_predictions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize) -> LabelMap {
        LabelMap::from_names((0..n).map(|i| format!("person-{i}"))).unwrap()
    }

    #[test]
    fn test_will_smith_scenario() {
        let mut names: Vec<String> = (0..16).map(|i| format!("person-{i}")).collect();
        names.push("Will Smith".into());
        let map = LabelMap::from_names(names).unwrap();
        let mut p = vec![0.05f32; 16];
        p.push(0.8);

        let result = rank(&ProbabilityVector::from_probabilities(p), &map, DEFAULT_TOP_K).unwrap();
        assert_eq!(result.predicted_celebrity, "Will Smith");
        assert!((result.confidence - 0.8).abs() < 1e-6);
        assert_eq!(result.class_index, 16);
        assert_eq!(result.top_predictions.len(), 5);
        assert_eq!(result.top_predictions[0].celebrity, "Will Smith");
        // The 0.05 ties follow in ascending index order.
        assert_eq!(result.top_predictions[1].celebrity, "person-0");
        assert_eq!(result.top_predictions[4].celebrity, "person-3");
    }

    #[test]
    fn test_sorted_non_increasing() {
        let p = ProbabilityVector::from_logits(&[0.3, -1.0, 2.0, 0.0, 1.5, 0.3, 4.0, -2.0]);
        let result = rank(&p, &labels(8), 8).unwrap();
        for pair in result.top_predictions.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
        assert_eq!(result.class_index, 6);
    }

    #[test]
    fn test_exact_ties_lower_index_first() {
        let p = ProbabilityVector::from_probabilities(vec![0.1, 0.4, 0.1, 0.4]);
        let result = rank(&p, &labels(4), 4).unwrap();
        let order: Vec<&str> = result.top_predictions.iter().map(|p| p.celebrity.as_str()).collect();
        assert_eq!(order, ["person-1", "person-3", "person-0", "person-2"]);
        assert_eq!(result.class_index, 1);
    }

    #[test]
    fn test_k_clamped_to_class_count() {
        let p = ProbabilityVector::from_probabilities(vec![0.5, 0.3, 0.2]);
        assert_eq!(rank(&p, &labels(3), 10).unwrap().top_predictions.len(), 3);
        assert_eq!(rank(&p, &labels(3), 0).unwrap().top_predictions.len(), 1);
    }

    #[test]
    fn test_rank_idempotent() {
        let p = ProbabilityVector::from_logits(&[1.0, 1.0, 0.5, 3.0, 3.0, -1.0]);
        let map = labels(6);
        assert_eq!(rank(&p, &map, 5).unwrap(), rank(&p, &map, 5).unwrap());
    }

    #[test]
    fn test_length_mismatch() {
        let p = ProbabilityVector::from_probabilities(vec![1.0 / 17.0; 17]);
        let err = rank(&p, &labels(16), 5).unwrap_err();
        assert_eq!(err, LabelMapMismatchError { labels: 16, classes: 17 });
    }

    #[test]
    fn test_nan_does_not_panic() {
        let p = ProbabilityVector::from_probabilities(vec![0.2, f32::NAN, 0.8]);
        let result = rank(&p, &labels(3), 3).unwrap();
        assert_eq!(result.top_predictions.len(), 3);
    }
}
