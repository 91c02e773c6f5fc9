//! Binary logistic regression trained with seeded SGD.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::text::SparseRow;
use crate::error::{IntentError, Result};

const EPOCHS: usize = 200;
const LEARNING_RATE: f32 = 0.5;
const L2_PENALTY: f32 = 1e-4;

/// Linear model over sparse features; `score = w·x + b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    weights: Vec<f32>,
    bias: f32,
}

impl LogisticModel {
    /// Fit on `rows` against boolean `labels`.
    ///
    /// Rows are visited in a fresh shuffled order each epoch, drawn from a
    /// generator seeded with `seed`, so a fixed seed gives a fixed model.
    pub fn fit(rows: &[SparseRow], labels: &[bool], width: usize, seed: u64) -> Result<Self> {
        if rows.is_empty() {
            return Err(IntentError::TrainingFailed(
                "logistic regression needs at least one row".to_string(),
            ));
        }
        if rows.len() != labels.len() {
            return Err(IntentError::TrainingFailed(format!(
                "{} feature rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }

        let mut weights = vec![0.0f32; width];
        let mut bias = 0.0f32;
        let mut order: Vec<usize> = (0..rows.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);

        for epoch in 0..EPOCHS {
            order.shuffle(&mut rng);
            let rate = LEARNING_RATE / (1.0 + epoch as f32 * 0.01);

            for &i in &order {
                let row = &rows[i];
                let target = if labels[i] { 1.0 } else { 0.0 };
                let residual = sigmoid(margin(&weights, bias, row)) - target;

                for &(j, x) in row {
                    if let Some(w) = weights.get_mut(j) {
                        *w -= rate * (residual * x + L2_PENALTY * *w);
                    }
                }
                bias -= rate * residual;
            }
        }

        let positives = labels.iter().filter(|&&l| l).count();
        debug!(
            "Fitted logistic regression on {} rows ({} positive) over {} features",
            rows.len(),
            positives,
            width
        );

        Ok(Self { weights, bias })
    }

    /// Raw margin of one row.
    pub fn score(&self, row: &SparseRow) -> f32 {
        margin(&self.weights, self.bias, row)
    }

    pub fn width(&self) -> usize {
        self.weights.len()
    }
}

fn margin(weights: &[f32], bias: f32, row: &SparseRow) -> f32 {
    row.iter()
        .filter_map(|&(j, x)| weights.get(j).map(|w| w * x))
        .sum::<f32>()
        + bias
}

/// Logistic link, used as the calibrated probability.
pub(crate) fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (Vec<SparseRow>, Vec<bool>) {
        let rows = vec![
            vec![(0, 1.0)],
            vec![(0, 0.9), (2, 0.1)],
            vec![(1, 1.0)],
            vec![(1, 0.8), (2, 0.2)],
        ];
        (rows, vec![true, true, false, false])
    }

    #[test]
    fn test_separates_training_rows() {
        let (rows, labels) = separable();
        let model = LogisticModel::fit(&rows, &labels, 3, 42).unwrap();
        for (row, label) in rows.iter().zip(&labels) {
            assert_eq!(model.score(row) > 0.0, *label);
        }
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let (rows, labels) = separable();
        let a = LogisticModel::fit(&rows, &labels, 3, 7).unwrap();
        let b = LogisticModel::fit(&rows, &labels, 3, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_empty_and_mismatched() {
        assert!(LogisticModel::fit(&[], &[], 0, 1).is_err());
        let (rows, _) = separable();
        assert!(LogisticModel::fit(&rows, &[true], 3, 1).is_err());
    }

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(6.0) > 0.99);
        assert!(sigmoid(-6.0) < 0.01);
    }
}
