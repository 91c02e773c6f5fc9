//! Progress reporting for training runs.
//!
//! A training run walks through the [`TrainingStage`]s in order and reports
//! each one through an optional [`ProgressCallback`] registered on the
//! learner builder.
//!
//! # Example
//!
//! ```
//! use intent_learning::{ProgressUpdate, TrainingStage};
//!
//! let on_progress = |update: ProgressUpdate| {
//!     println!("[{}] {:.0}% - {}", update.stage, update.progress * 100.0, update.message);
//! };
//!
//! on_progress(ProgressUpdate::new(TrainingStage::Fitting, "Fitting logistic regression"));
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The current stage of a training run.
///
/// 1. [`Splitting`](Self::Splitting) - Holding out the evaluation subset
/// 2. [`Assembling`](Self::Assembling) - Selecting the pipeline stages
/// 3. [`Fitting`](Self::Fitting) - Fitting the pipeline on the training subset
/// 4. [`Persisting`](Self::Persisting) - Writing the model artifact
/// 5. [`CrossValidating`](Self::CrossValidating) - Diagnostic k-fold pass
/// 6. [`Complete`](Self::Complete) - The trained model is bound
///
/// Terminal states: [`Complete`](Self::Complete), [`Failed`](Self::Failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TrainingStage {
    #[default]
    Splitting,
    Assembling,
    Fitting,
    Persisting,
    /// Runs after the artifact is written; its failures never fail the run.
    CrossValidating,
    Complete,
    Failed,
}

impl TrainingStage {
    /// Overall progress reported on entering this stage.
    #[must_use]
    pub fn progress(&self) -> f64 {
        match self {
            TrainingStage::Splitting => 0.0,
            TrainingStage::Assembling => 0.1,
            TrainingStage::Fitting => 0.2,
            TrainingStage::Persisting => 0.6,
            TrainingStage::CrossValidating => 0.7,
            TrainingStage::Complete | TrainingStage::Failed => 1.0,
        }
    }

    /// ```
    /// use intent_learning::TrainingStage;
    ///
    /// assert_eq!(TrainingStage::CrossValidating.as_str(), "cross_validating");
    /// ```
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingStage::Splitting => "splitting",
            TrainingStage::Assembling => "assembling",
            TrainingStage::Fitting => "fitting",
            TrainingStage::Persisting => "persisting",
            TrainingStage::CrossValidating => "cross_validating",
            TrainingStage::Complete => "complete",
            TrainingStage::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrainingStage::Complete | TrainingStage::Failed)
    }
}

impl fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for parsing a [`TrainingStage`] from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTrainingStageError {
    invalid_value: String,
}

impl ParseTrainingStageError {
    #[must_use]
    pub fn invalid_value(&self) -> &str {
        &self.invalid_value
    }
}

impl fmt::Display for ParseTrainingStageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid training stage: '{}'. Valid values are: splitting, assembling, fitting, \
             persisting, cross_validating, complete, failed",
            self.invalid_value
        )
    }
}

impl std::error::Error for ParseTrainingStageError {}

impl FromStr for TrainingStage {
    type Err = ParseTrainingStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "splitting" => Ok(TrainingStage::Splitting),
            "assembling" => Ok(TrainingStage::Assembling),
            "fitting" => Ok(TrainingStage::Fitting),
            "persisting" => Ok(TrainingStage::Persisting),
            "cross_validating" => Ok(TrainingStage::CrossValidating),
            "complete" => Ok(TrainingStage::Complete),
            "failed" => Ok(TrainingStage::Failed),
            _ => Err(ParseTrainingStageError {
                invalid_value: s.to_string(),
            }),
        }
    }
}

/// A progress update from a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub stage: TrainingStage,

    /// Overall progress from 0.0 to 1.0, non-decreasing within a run.
    pub progress: f64,

    /// Human-readable status message.
    pub message: String,
}

impl ProgressUpdate {
    /// An update at the stage's nominal progress.
    pub fn new(stage: TrainingStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress: stage.progress(),
            message: message.into(),
        }
    }
}

impl Default for ProgressUpdate {
    fn default() -> Self {
        Self::new(TrainingStage::default(), String::new())
    }
}

/// Callback receiving [`ProgressUpdate`]s.
///
/// Callbacks must be `Send + Sync`; a [`SharedLearner`](crate::SharedLearner)
/// may train from any thread.
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER: [TrainingStage; 6] = [
        TrainingStage::Splitting,
        TrainingStage::Assembling,
        TrainingStage::Fitting,
        TrainingStage::Persisting,
        TrainingStage::CrossValidating,
        TrainingStage::Complete,
    ];

    #[test]
    fn test_progress_is_monotonic() {
        for pair in ORDER.windows(2) {
            assert!(pair[0].progress() < pair[1].progress());
        }
        assert_eq!(TrainingStage::Complete.progress(), 1.0);
    }

    #[test]
    fn test_training_stage_roundtrip() {
        for stage in ORDER.into_iter().chain([TrainingStage::Failed]) {
            assert_eq!(stage.as_str().parse::<TrainingStage>().unwrap(), stage);
        }
    }

    #[test]
    fn test_training_stage_from_str_invalid() {
        let err = "training".parse::<TrainingStage>().unwrap_err();
        assert_eq!(err.invalid_value(), "training");
        assert!(err.to_string().contains("Valid values"));
    }

    #[test]
    fn test_is_terminal() {
        assert!(TrainingStage::Complete.is_terminal());
        assert!(TrainingStage::Failed.is_terminal());
        assert!(!TrainingStage::CrossValidating.is_terminal());
    }

    #[test]
    fn test_progress_update_default() {
        let update = ProgressUpdate::default();
        assert_eq!(update.stage, TrainingStage::Splitting);
        assert_eq!(update.progress, 0.0);
        assert!(update.message.is_empty());
    }
}
