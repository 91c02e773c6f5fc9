//! Prediction shapes and diagnostic result types.
//!
//! - [`RawPrediction`]: what the backend produces for one record
//! - [`Prediction`]: structured output `{score, predicted_label, probability}`
//! - [`ScoreOutput`]: bare score output
//! - [`Label`]: conversion from a raw prediction into the caller's label type
//! - [`CrossValidationReport`]: per-fold diagnostic scores

use serde::{Deserialize, Serialize};

/// Backend output for a single scored record.
///
/// For the binary text variant `score` is the raw margin, `probability` the
/// calibrated sigmoid of it and `predicted_label` is `score > 0`. For the
/// regression variant `score` is the regressed value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    pub score: f32,
    pub predicted_label: bool,
    pub probability: f32,
}

/// Structured prediction returned by
/// [`Learner::predict_with_output()`](crate::Learner::predict_with_output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction<L> {
    pub score: f32,
    pub predicted_label: L,
    pub probability: f32,
}

/// Score-only prediction returned by
/// [`Learner::predict_score()`](crate::Learner::predict_score).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutput {
    pub score: f32,
}

/// A type a prediction can be expressed as.
///
/// Implemented for `bool` (the predicted class) and for `f32`/`f64`
/// (the score).
pub trait Label: Sized {
    fn from_prediction(raw: &RawPrediction) -> Self;
}

impl Label for bool {
    fn from_prediction(raw: &RawPrediction) -> Self {
        raw.predicted_label
    }
}

impl Label for f32 {
    fn from_prediction(raw: &RawPrediction) -> Self {
        raw.score
    }
}

impl Label for f64 {
    fn from_prediction(raw: &RawPrediction) -> Self {
        f64::from(raw.score)
    }
}

impl<L: Label> From<RawPrediction> for Prediction<L> {
    fn from(raw: RawPrediction) -> Self {
        Self {
            score: raw.score,
            predicted_label: L::from_prediction(&raw),
            probability: raw.probability,
        }
    }
}

/// Metric a cross-validation fold is scored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoldMetric {
    /// Fraction of correctly classified rows (higher is better).
    Accuracy,
    /// Root mean squared error (lower is better).
    Rmse,
}

/// Diagnostic result of a k-fold cross-validation pass.
///
/// Observational only: it never influences the trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationReport {
    pub metric: FoldMetric,
    pub fold_scores: Vec<f64>,
}

impl CrossValidationReport {
    /// Mean over folds, `None` if no fold was scored.
    pub fn mean(&self) -> Option<f64> {
        if self.fold_scores.is_empty() {
            return None;
        }
        Some(self.fold_scores.iter().sum::<f64>() / self.fold_scores.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawPrediction {
        RawPrediction {
            score: 2.5,
            predicted_label: true,
            probability: 0.92,
        }
    }

    #[test]
    fn test_label_conversions() {
        assert!(bool::from_prediction(&raw()));
        assert_eq!(f32::from_prediction(&raw()), 2.5);
        assert_eq!(f64::from_prediction(&raw()), 2.5);
    }

    #[test]
    fn test_structured_from_raw() {
        let p: Prediction<bool> = raw().into();
        assert_eq!(p.score, 2.5);
        assert!(p.predicted_label);
        assert_eq!(p.probability, 0.92);
    }

    #[test]
    fn test_report_mean() {
        let report = CrossValidationReport {
            metric: FoldMetric::Rmse,
            fold_scores: vec![1.0, 3.0],
        };
        assert_eq!(report.mean(), Some(2.0));

        let empty = CrossValidationReport {
            metric: FoldMetric::Accuracy,
            fold_scores: Vec::new(),
        };
        assert_eq!(empty.mean(), None);
    }
}
