//! Single-record inference.
//!
//! [`InferenceEngine`] binds a backend to one fitted model and scores records
//! one at a time. It is stateless across calls and performs no lifecycle
//! checks: making sure a model exists is the [`Learner`](crate::Learner)'s job.

use tracing::debug;

use crate::backend::{FittedModel, MlBackend, load_table};
use crate::error::{IntentError, Result};
use crate::schema::{LabelSetter, Record};
use crate::types::{Label, Prediction, RawPrediction, ScoreOutput};

/// Scores records against one fitted model.
pub struct InferenceEngine<'a> {
    backend: &'a dyn MlBackend,
    model: &'a FittedModel,
}

impl<'a> InferenceEngine<'a> {
    pub fn new(backend: &'a dyn MlBackend, model: &'a FittedModel) -> Self {
        Self { backend, model }
    }

    /// The backend's raw output for `record`.
    pub fn predict_raw<R: Record>(&self, record: &R) -> Result<RawPrediction> {
        let row = load_table(std::slice::from_ref(record))
            .map_err(|err| IntentError::InferenceFailed(err.to_string()))?;
        let raw = self.backend.predict_one(self.model, &row)?;
        debug!(
            "Scored {}: score={:.4} probability={:.4} label={}",
            R::schema().record_name(),
            raw.score,
            raw.probability,
            raw.predicted_label
        );
        Ok(raw)
    }

    /// `{score, predicted_label, probability}` for `record`.
    pub fn predict_structured<R: Record, L: Label>(&self, record: &R) -> Result<Prediction<L>> {
        self.predict_raw(record).map(Prediction::from)
    }

    /// Only the score.
    pub fn predict_score<R: Record>(&self, record: &R) -> Result<ScoreOutput> {
        self.predict_raw(record)
            .map(|raw| ScoreOutput { score: raw.score })
    }

    /// Only the predicted label.
    pub fn predict_label<R: Record, L: Label>(&self, record: &R) -> Result<L> {
        self.predict_raw(record).map(|raw| L::from_prediction(&raw))
    }

    /// `record` with its `label_column` field overwritten by the prediction.
    ///
    /// # Errors
    ///
    /// Returns [`IntentError::LabelFieldNotFound`] if `label_column` is not a
    /// writable field of `R`.
    pub fn predict_and_mutate<R: Record>(&self, mut record: R, label_column: &str) -> Result<R> {
        let set = label_setter::<R>(label_column)?;
        let raw = self.predict_raw(&record)?;
        set(&mut record, &raw);
        Ok(record)
    }
}

/// The setter of the writable field called `label_column`.
///
/// # Errors
///
/// Returns [`IntentError::LabelFieldNotFound`] if `R` has no such field or the
/// field is read-only.
pub fn label_setter<R: Record>(label_column: &str) -> Result<LabelSetter<R>> {
    R::schema()
        .find(label_column)
        .and_then(|field| field.setter())
        .ok_or_else(|| IntentError::LabelFieldNotFound(label_column.to_string()))
}
