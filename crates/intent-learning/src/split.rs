//! Dataset splitting.
//!
//! The held-out subset is chosen by systematic sampling: with `k = ⌊n·f⌋`
//! held-out rows, row `⌊(j+1)·n/k⌋ - 1` is held out for each `j < k`. The
//! result is deterministic, spread across the whole input, and always keeps
//! the first row in training. Inputs too small to hold out a single row (for
//! the fixed 0.2 fraction, fewer than five rows) go entirely to training.

use polars::prelude::DataFrame;
use tracing::debug;

use crate::backend::MlBackend;
use crate::error::{IntentError, Result};

/// Fraction of rows held out for evaluation.
pub const HOLDOUT_FRACTION: f64 = 0.2;

/// A training/held-out partition of one table.
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub training: DataFrame,
    pub held_out: DataFrame,
}

/// Positions of the held-out rows among `n` rows, ascending.
///
/// # Errors
///
/// Returns [`IntentError::InvalidConfig`] if `fraction` is outside `[0, 1)`.
pub fn holdout_indices(n: usize, fraction: f64) -> Result<Vec<usize>> {
    if !(0.0..1.0).contains(&fraction) {
        return Err(IntentError::InvalidConfig(format!(
            "held-out fraction must be in [0, 1), got {fraction}"
        )));
    }

    let k = (n as f64 * fraction).floor() as usize;
    Ok((0..k).map(|j| (j + 1) * n / k - 1).collect())
}

/// Split `table` into training and held-out subsets through `backend`.
///
/// # Errors
///
/// Returns [`IntentError::InsufficientData`] if `table` has no rows.
pub fn split_dataset(
    backend: &dyn MlBackend,
    table: &DataFrame,
    fraction: f64,
) -> Result<DatasetSplit> {
    if table.height() == 0 {
        return Err(IntentError::InsufficientData(
            "cannot split an empty dataset".to_string(),
        ));
    }

    let (training, held_out) = backend.split(table, fraction)?;

    if training.height() + held_out.height() != table.height() {
        return Err(IntentError::TrainingFailed(format!(
            "{} split {} rows into {} + {}",
            backend.name(),
            table.height(),
            training.height(),
            held_out.height()
        )));
    }

    debug!(
        "Split {} rows into {} training / {} held out",
        table.height(),
        training.height(),
        held_out.height()
    );

    Ok(DatasetSplit { training, held_out })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeBackend;
    use polars::prelude::*;

    #[test]
    fn test_twenty_rows_hold_out_four() {
        let held = holdout_indices(20, HOLDOUT_FRACTION).unwrap();
        assert_eq!(held, vec![4, 9, 14, 19]);
    }

    #[test]
    fn test_small_inputs_stay_in_training() {
        for n in 0..5 {
            assert!(holdout_indices(n, HOLDOUT_FRACTION).unwrap().is_empty());
        }
        assert_eq!(holdout_indices(5, HOLDOUT_FRACTION).unwrap(), vec![4]);
    }

    #[test]
    fn test_indices_are_unique_and_in_range() {
        for n in 5..200 {
            let held = holdout_indices(n, HOLDOUT_FRACTION).unwrap();
            assert_eq!(held.len(), n / 5);
            assert!(held.windows(2).all(|w| w[0] < w[1]));
            assert!(held.iter().all(|&i| i < n));
        }
    }

    #[test]
    fn test_bad_fraction() {
        assert!(holdout_indices(10, 1.0).is_err());
        assert!(holdout_indices(10, -0.1).is_err());
    }

    #[test]
    fn test_single_record_goes_to_training() {
        let df = df!["Label" => [1.0f32], "Text" => ["only"]].unwrap();
        let split = split_dataset(&NativeBackend::default(), &df, HOLDOUT_FRACTION).unwrap();
        assert_eq!(split.training.height(), 1);
        assert_eq!(split.held_out.height(), 0);
    }

    #[test]
    fn test_empty_table_is_insufficient() {
        let df = df!["Label" => Vec::<f32>::new()].unwrap();
        let err = split_dataset(&NativeBackend::default(), &df, HOLDOUT_FRACTION).unwrap_err();
        assert!(matches!(err, IntentError::InsufficientData(_)));
    }
}
