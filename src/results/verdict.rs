use super::repo_types::Verdict;
use crate::classifier::Prediction;

/// Record-level verdict derived from every image's prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub label: Verdict,
    /// Mean confidence as a percentage, two decimals.
    pub confidence: f64,
}

/// Majority vote with ties going to `NonCancer`; `None` for no predictions.
pub fn aggregate(predictions: &[Prediction]) -> Option<Aggregate> {
    if predictions.is_empty() {
        return None;
    }
    let total = predictions.len();
    let cancer = predictions
        .iter()
        .filter(|p| p.label == Verdict::Cancer)
        .count();
    let label = if cancer > total - cancer {
        Verdict::Cancer
    } else {
        Verdict::NonCancer
    };
    let mean = predictions.iter().map(|p| p.confidence).sum::<f64>() / total as f64;
    Some(Aggregate {
        label,
        confidence: round2(mean * 100.0),
    })
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
