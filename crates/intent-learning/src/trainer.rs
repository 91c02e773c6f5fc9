//! Training orchestration.
//!
//! One call to [`TrainingOrchestrator::train`] runs the whole sequence:
//!
//! 1. materialize the records and hold out [`HOLDOUT_FRACTION`] of them
//! 2. assemble the pipeline for the configured variant
//! 3. fit it on the training subset
//! 4. persist the fitted model under the configured artifact name
//! 5. score the held-out subset
//! 6. for regression pipelines, run a [`CV_FOLDS`]-fold cross-validation
//!
//! Steps 1-4 are fatal on failure. Steps 5 and 6 are diagnostics: they are
//! logged, reported in the [`TrainingOutcome`], and their failures only ever
//! produce a warning.

use std::path::PathBuf;
use std::sync::Arc;

use polars::prelude::DataFrame;
use tracing::{debug, info, warn};

use crate::backend::native::PREDICTED_LABEL_COLUMN;
use crate::backend::table::f32_column;
use crate::backend::{FittedModel, MlBackend, ModelSchema, load_table};
use crate::config::LearnerConfig;
use crate::error::{IntentError, Result};
use crate::persistence::ModelStore;
use crate::pipeline::{PipelineDescription, select_pipeline};
use crate::progress::{ProgressCallback, ProgressUpdate, TrainingStage};
use crate::schema::Record;
use crate::split::{HOLDOUT_FRACTION, split_dataset};
use crate::types::{CrossValidationReport, FoldMetric};

/// Number of folds in the diagnostic cross-validation pass.
pub const CV_FOLDS: usize = 5;

/// A metric computed on the held-out subset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeldOutScore {
    pub metric: FoldMetric,
    pub value: f64,
    pub rows: usize,
}

/// Everything a successful training run produced.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: FittedModel,
    pub schema: ModelSchema,
    pub pipeline: PipelineDescription,
    pub artifact_path: PathBuf,
    pub training_rows: usize,
    /// `None` when nothing was held out or scoring it failed.
    pub held_out: Option<HeldOutScore>,
    /// `None` when cross-validation did not run or failed.
    pub cross_validation: Option<CrossValidationReport>,
}

/// Drives split, assemble, fit, persist and the diagnostic passes.
#[derive(Clone)]
pub struct TrainingOrchestrator {
    backend: Arc<dyn MlBackend>,
    store: ModelStore,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for TrainingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingOrchestrator")
            .field("backend", &self.backend.name())
            .field("store", &self.store)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl TrainingOrchestrator {
    pub fn new(backend: Arc<dyn MlBackend>, store: ModelStore) -> Self {
        Self {
            backend,
            store,
            progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, callback: Option<ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    fn report(&self, stage: TrainingStage, message: impl Into<String>) {
        if let Some(callback) = &self.progress {
            callback(ProgressUpdate::new(stage, message));
        }
    }

    /// Train on `records` with `config`, persisting the result.
    ///
    /// # Errors
    ///
    /// - [`IntentError::InsufficientData`] if `records` is empty.
    /// - [`IntentError::SchemaEmpty`] if the pipeline needs fields `R` lacks.
    /// - [`IntentError::TrainingFailed`] if the fit step fails.
    /// - I/O errors from writing the artifact.
    pub fn train<R: Record>(&self, config: &LearnerConfig, records: &[R]) -> Result<TrainingOutcome> {
        match self.run::<R>(config, records) {
            Ok(outcome) => {
                self.report(TrainingStage::Complete, "Training complete");
                Ok(outcome)
            }
            Err(err) => {
                self.report(TrainingStage::Failed, err.to_string());
                Err(err)
            }
        }
    }

    fn run<R: Record>(&self, config: &LearnerConfig, records: &[R]) -> Result<TrainingOutcome> {
        info!(
            "Training {} on {} record(s) with the {} backend",
            config.variant,
            records.len(),
            self.backend.name()
        );

        self.report(TrainingStage::Splitting, "Holding out evaluation rows");
        let table = load_table(records)?;
        let split = split_dataset(self.backend.as_ref(), &table, HOLDOUT_FRACTION)?;

        self.report(TrainingStage::Assembling, "Assembling pipeline");
        let pipeline = select_pipeline::<R>(config)?;

        self.report(
            TrainingStage::Fitting,
            format!("Fitting {} stage(s)", pipeline.stages().len()),
        );
        let model = self.backend.fit(&split.training, &pipeline)?;

        self.report(TrainingStage::Persisting, "Saving model artifact");
        let schema = ModelSchema::for_pipeline(R::schema().record_name(), &pipeline)
            .ok_or_else(|| IntentError::TrainingFailed("pipeline has no train stage".to_string()))?;
        let artifact_path = self.store.save(&model, &schema, &config.artifact_name)?;

        let held_out = self.score_held_out(&model, &split.held_out, config, &pipeline);

        let cross_validation = match pipeline.trainer() {
            Some(trainer) if !trainer.is_binary_classifier() => {
                self.report(
                    TrainingStage::CrossValidating,
                    format!("Cross-validating over {CV_FOLDS} folds"),
                );
                self.cross_validate(&table, &pipeline)
            }
            _ => None,
        };

        Ok(TrainingOutcome {
            model,
            schema,
            pipeline,
            artifact_path,
            training_rows: split.training.height(),
            held_out,
            cross_validation,
        })
    }

    fn score_held_out(
        &self,
        model: &FittedModel,
        held_out: &DataFrame,
        config: &LearnerConfig,
        pipeline: &PipelineDescription,
    ) -> Option<HeldOutScore> {
        if held_out.height() == 0 {
            debug!("No rows held out; skipping held-out evaluation");
            return None;
        }

        let binary = pipeline.trainer().is_some_and(|t| t.is_binary_classifier());
        let scored = self
            .backend
            .transform(model, held_out, &config.score_column)
            .and_then(|scored| {
                held_out_metric(&scored, &config.label_column, &config.score_column, binary)
            });

        match scored {
            Ok(score) => {
                info!(
                    "Held-out {:?} on {} row(s): {:.4}",
                    score.metric, score.rows, score.value
                );
                Some(score)
            }
            Err(err) => {
                warn!("Held-out evaluation failed: {}", err);
                None
            }
        }
    }

    fn cross_validate(
        &self,
        table: &DataFrame,
        pipeline: &PipelineDescription,
    ) -> Option<CrossValidationReport> {
        match self.backend.cross_validate(table, pipeline, CV_FOLDS) {
            Ok(report) => {
                if let Some(mean) = report.mean() {
                    info!("Cross-validation mean {:?}: {:.4}", report.metric, mean);
                }
                Some(report)
            }
            Err(err) => {
                warn!("Cross-validation failed, continuing without it: {}", err);
                None
            }
        }
    }
}

fn held_out_metric(
    scored: &DataFrame,
    label_column: &str,
    score_column: &str,
    binary: bool,
) -> Result<HeldOutScore> {
    let labels = f32_column(scored, label_column)?;
    let rows = labels.len();
    let n = rows.max(1) as f64;

    let (metric, value) = if binary {
        let predicted = f32_column(scored, PREDICTED_LABEL_COLUMN)?;
        let correct = predicted
            .iter()
            .zip(&labels)
            .filter(|(p, l)| (**p > 0.5) == (**l > 0.5))
            .count();
        (FoldMetric::Accuracy, correct as f64 / n)
    } else {
        let scores = f32_column(scored, score_column)?;
        let squared: f64 = scores
            .iter()
            .zip(&labels)
            .map(|(s, l)| f64::from(s - l).powi(2))
            .sum();
        (FoldMetric::Rmse, (squared / n).sqrt())
    };

    Ok(HeldOutScore {
        metric,
        value,
        rows,
    })
}
